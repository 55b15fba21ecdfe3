use std::collections::HashSet;
use tracing::debug;

use crate::certs;
use crate::error::ConfigurationError;
use crate::genesis;
use crate::translate;
use crate::types::{
    BackendKind, DeploymentDescriptor, DeploymentSpec, NetworkConfig, NodeBackendConfig,
    NodeConfig, ObjectMeta,
};

pub const LOCAL_API_VERSION: &str = "local/v1";
pub const LOCAL_KIND: &str = "Process";
pub const LOCAL_NAMESPACE: &str = "local";

/// Descriptors of a network, partitioned by role in input order.
#[derive(Debug, Clone)]
pub struct Deployments {
    pub beacons: Vec<DeploymentDescriptor>,
    pub non_beacons: Vec<DeploymentDescriptor>,
}

impl Deployments {
    pub fn len(&self) -> usize {
        self.beacons.len() + self.non_beacons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeploymentDescriptor> {
        self.beacons.iter().chain(self.non_beacons.iter())
    }
}

/// Build one descriptor per node for the given backend.
///
/// All or nothing: any defect in any node fails the whole build, so a caller
/// never ends up launching a half-configured network.
pub fn build_deployments(
    network: &NetworkConfig,
    backend: BackendKind,
) -> Result<Deployments, ConfigurationError> {
    validate(network, backend)?;
    let network_id = genesis::network_id(&network.genesis)?;

    let mut beacons = Vec::new();
    let mut non_beacons = Vec::new();
    let mut deployment_names = HashSet::new();

    for node in &network.node_configs {
        let descriptor = build_descriptor(node, &network.genesis, network_id)?;

        let qualified = format!("{}/{}", descriptor.namespace(), descriptor.name());
        if !deployment_names.insert(qualified) {
            return Err(ConfigurationError::DuplicateDeployment(
                descriptor.name().to_string(),
            ));
        }

        debug!(
            "Built descriptor {} for node {} (beacon={})",
            descriptor.name(),
            node.name,
            node.is_beacon
        );

        if node.is_beacon {
            beacons.push(descriptor);
        } else {
            non_beacons.push(descriptor);
        }
    }

    Ok(Deployments {
        beacons,
        non_beacons,
    })
}

fn validate(network: &NetworkConfig, backend: BackendKind) -> Result<(), ConfigurationError> {
    if network.node_configs.is_empty() {
        return Err(ConfigurationError::NoNodes);
    }

    if !network.node_configs.iter().any(|n| n.is_beacon) {
        return Err(ConfigurationError::NoBeacons);
    }

    let mut names = HashSet::new();
    for node in &network.node_configs {
        if !names.insert(node.name.as_str()) {
            return Err(ConfigurationError::DuplicateNode(node.name.clone()));
        }

        let found = node.backend.kind();
        if found != backend {
            return Err(ConfigurationError::BackendMismatch {
                node: node.name.clone(),
                found,
                expected: backend,
            });
        }
    }

    Ok(())
}

fn build_descriptor(
    node: &NodeConfig,
    genesis: &str,
    network_id: u32,
) -> Result<DeploymentDescriptor, ConfigurationError> {
    let env = translate::translate(&node.config_file, network_id).map_err(|source| {
        ConfigurationError::Translation {
            node: node.name.clone(),
            source,
        }
    })?;

    let certificates = vec![certs::encode_pair(
        node.staking_key.as_bytes(),
        node.staking_cert.as_bytes(),
    )];

    let (api_version, kind, namespace, deployment_name, image, tag) = match &node.backend {
        NodeBackendConfig::K8s(k8s) => (
            k8s.api_version.clone(),
            k8s.kind.clone(),
            k8s.namespace.clone(),
            k8s.identifier.clone(),
            k8s.image.clone(),
            k8s.tag.clone(),
        ),
        NodeBackendConfig::Local(local) => (
            LOCAL_API_VERSION.to_string(),
            LOCAL_KIND.to_string(),
            LOCAL_NAMESPACE.to_string(),
            node.name.clone(),
            local.binary_path.display().to_string(),
            String::new(),
        ),
    };

    Ok(DeploymentDescriptor {
        api_version,
        kind,
        metadata: ObjectMeta {
            name: deployment_name.clone(),
            namespace,
        },
        spec: DeploymentSpec {
            deployment_name,
            image,
            tag,
            bootstrapper_url: String::new(),
            env,
            node_count: 1,
            certificates,
            genesis: genesis.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{K8sNodeConfig, LocalNodeConfig};
    use std::path::PathBuf;

    const TEST_GENESIS: &str = r#"{"networkID": 9999, "allocations": [], "startTime": 1630987200}"#;

    fn k8s_node(name: &str, is_beacon: bool, identifier: &str) -> NodeConfig {
        NodeConfig {
            name: name.to_string(),
            is_beacon,
            config_file: "{}".to_string(),
            staking_key: format!("{}Key", name),
            staking_cert: format!("{}Cert", name),
            backend: NodeBackendConfig::K8s(K8sNodeConfig {
                api_version: "v1".to_string(),
                identifier: identifier.to_string(),
                image: "avaplatform/avalanchego".to_string(),
                kind: "Avalanchego".to_string(),
                namespace: "test".to_string(),
                tag: "v1.10.0".to_string(),
            }),
        }
    }

    fn network(nodes: Vec<NodeConfig>) -> NetworkConfig {
        NetworkConfig {
            genesis: TEST_GENESIS.to_string(),
            node_configs: nodes,
        }
    }

    #[test]
    fn test_create_deployment_config() {
        let config = r#"{"network-peer-list-gossip-frequency": "250ms"}"#;
        let nodes = vec![
            NodeConfig {
                name: "test1".to_string(),
                is_beacon: true,
                config_file: config.to_string(),
                staking_key: "fooKey".to_string(),
                staking_cert: "fooCert".to_string(),
                backend: NodeBackendConfig::K8s(K8sNodeConfig {
                    api_version: "v1".to_string(),
                    identifier: "test11".to_string(),
                    image: "img1".to_string(),
                    kind: "Avalanchego".to_string(),
                    namespace: "test01".to_string(),
                    tag: "t1".to_string(),
                }),
            },
            NodeConfig {
                name: "test2".to_string(),
                is_beacon: false,
                config_file: config.to_string(),
                staking_key: "barKey".to_string(),
                staking_cert: "barCert".to_string(),
                backend: NodeBackendConfig::K8s(K8sNodeConfig {
                    api_version: "v2".to_string(),
                    identifier: "test22".to_string(),
                    image: "img2".to_string(),
                    kind: "Avalanchego".to_string(),
                    namespace: "test02".to_string(),
                    tag: "t2".to_string(),
                }),
            },
        ];

        let deployments = build_deployments(&network(nodes), BackendKind::K8s).unwrap();
        assert_eq!(deployments.beacons.len(), 1);
        assert_eq!(deployments.non_beacons.len(), 1);

        let b = &deployments.beacons[0];
        let n = &deployments.non_beacons[0];

        assert_eq!(b.name(), "test11");
        assert_eq!(n.name(), "test22");
        assert_eq!(b.kind, "Avalanchego");
        assert_eq!(b.api_version, "v1");
        assert_eq!(n.api_version, "v2");
        assert_eq!(b.namespace(), "test01");
        assert_eq!(n.namespace(), "test02");
        assert_eq!(b.spec.deployment_name, "test11");
        assert_eq!(n.spec.deployment_name, "test22");
        assert_eq!(b.spec.image, "img1");
        assert_eq!(n.spec.image, "img2");
        assert_eq!(b.spec.tag, "t1");
        assert_eq!(n.spec.tag, "t2");
        assert_eq!(b.spec.bootstrapper_url, "");
        assert_eq!(n.spec.bootstrapper_url, "");
        assert_eq!(b.spec.node_count, 1);
        assert_eq!(n.spec.node_count, 1);
        assert_eq!(b.spec.genesis, TEST_GENESIS);

        for d in [b, n] {
            assert_eq!(d.spec.env[0].name, "AVAGO_NETWORK_ID");
            assert_eq!(d.spec.env[0].value, "9999");
            assert_eq!(
                d.spec.env[1].name,
                "AVAGO_NETWORK_PEER_LIST_GOSSIP_FREQUENCY"
            );
            assert_eq!(d.spec.env[1].value, "250ms");
        }

        assert_eq!(b.spec.certificates[0].key, certs::encode(b"fooKey"));
        assert_eq!(b.spec.certificates[0].cert, certs::encode(b"fooCert"));
        assert_eq!(n.spec.certificates[0].key, certs::encode(b"barKey"));
        assert_eq!(n.spec.certificates[0].cert, certs::encode(b"barCert"));
    }

    #[test]
    fn test_partition_preserves_input_order() {
        let nodes = vec![
            k8s_node("a", false, "a"),
            k8s_node("b", true, "b"),
            k8s_node("c", false, "c"),
            k8s_node("d", true, "d"),
            k8s_node("e", false, "e"),
        ];

        let deployments = build_deployments(&network(nodes), BackendKind::K8s).unwrap();
        let beacons: Vec<_> = deployments.beacons.iter().map(|d| d.name()).collect();
        let others: Vec<_> = deployments.non_beacons.iter().map(|d| d.name()).collect();

        assert_eq!(beacons, vec!["b", "d"]);
        assert_eq!(others, vec!["a", "c", "e"]);
        assert_eq!(deployments.len(), 5);
    }

    #[test]
    fn test_rejects_network_without_beacons() {
        let nodes = vec![k8s_node("a", false, "a"), k8s_node("b", false, "b")];
        assert!(matches!(
            build_deployments(&network(nodes), BackendKind::K8s),
            Err(ConfigurationError::NoBeacons)
        ));
        assert!(matches!(
            build_deployments(&network(vec![]), BackendKind::K8s),
            Err(ConfigurationError::NoNodes)
        ));
    }

    #[test]
    fn test_one_bad_config_fails_whole_build() {
        let mut bad = k8s_node("b", false, "b");
        bad.config_file = "{oops".to_string();
        let nodes = vec![k8s_node("a", true, "a"), bad];

        match build_deployments(&network(nodes), BackendKind::K8s) {
            Err(ConfigurationError::Translation { node, .. }) => assert_eq!(node, "b"),
            other => panic!("expected translation error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_duplicates() {
        let nodes = vec![k8s_node("a", true, "x"), k8s_node("a", false, "y")];
        assert!(matches!(
            build_deployments(&network(nodes), BackendKind::K8s),
            Err(ConfigurationError::DuplicateNode(_))
        ));

        let nodes = vec![k8s_node("a", true, "x"), k8s_node("b", false, "x")];
        assert!(matches!(
            build_deployments(&network(nodes), BackendKind::K8s),
            Err(ConfigurationError::DuplicateDeployment(_))
        ));
    }

    #[test]
    fn test_rejects_backend_mismatch() {
        let nodes = vec![k8s_node("a", true, "a")];
        assert!(matches!(
            build_deployments(&network(nodes), BackendKind::Local),
            Err(ConfigurationError::BackendMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_genesis() {
        let cfg = NetworkConfig {
            genesis: "{}".to_string(),
            node_configs: vec![k8s_node("a", true, "a")],
        };
        assert!(matches!(
            build_deployments(&cfg, BackendKind::K8s),
            Err(ConfigurationError::Genesis(_))
        ));
    }

    #[test]
    fn test_local_descriptor() {
        let node = NodeConfig {
            name: "node-0".to_string(),
            is_beacon: true,
            config_file: r#"{"log-level": "debug"}"#.to_string(),
            staking_key: String::new(),
            staking_cert: String::new(),
            backend: NodeBackendConfig::Local(LocalNodeConfig {
                binary_path: PathBuf::from("/opt/avalanchego/avalanchego"),
            }),
        };

        let deployments = build_deployments(&network(vec![node]), BackendKind::Local).unwrap();
        let d = &deployments.beacons[0];
        assert_eq!(d.api_version, LOCAL_API_VERSION);
        assert_eq!(d.kind, LOCAL_KIND);
        assert_eq!(d.name(), "node-0");
        assert_eq!(d.spec.image, "/opt/avalanchego/avalanchego");
        assert_eq!(d.spec.certificates[0].key, "");
        assert_eq!(d.spec.env.len(), 2);
    }

    #[test]
    fn test_bootstrap_field_set_once() {
        let nodes = vec![k8s_node("a", true, "a"), k8s_node("b", false, "b")];
        let mut deployments = build_deployments(&network(nodes), BackendKind::K8s).unwrap();
        let endpoints = vec![crate::types::BootstrapEndpoint {
            node_id: "NodeID-a".to_string(),
            address: "a.test:9651".to_string(),
        }];

        let n = &mut deployments.non_beacons[0];
        assert!(n.set_bootstrap_endpoints(&endpoints));
        assert_eq!(n.spec.bootstrapper_url, "NodeID-a@a.test:9651");
        assert!(!n.set_bootstrap_endpoints(&[]));
        assert_eq!(n.bootstrap_endpoints(), endpoints);
    }
}
