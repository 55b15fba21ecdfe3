use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Network Input
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Genesis document shared by every node. Must carry a `networkID`.
    pub genesis: String,
    pub node_configs: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    #[serde(default)]
    pub is_beacon: bool,
    /// JSON object of node flags, e.g. `{"network-peer-list-gossip-frequency": "250ms"}`
    #[serde(default = "empty_config_file")]
    pub config_file: String,
    #[serde(default)]
    pub staking_key: String,
    #[serde(default)]
    pub staking_cert: String,
    pub backend: NodeBackendConfig,
}

fn empty_config_file() -> String {
    "{}".to_string()
}

/// Backend-specific block of a node, tagged by backend identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum NodeBackendConfig {
    K8s(K8sNodeConfig),
    Local(LocalNodeConfig),
}

impl NodeBackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::K8s(_) => BackendKind::K8s,
            Self::Local(_) => BackendKind::Local,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct K8sNodeConfig {
    pub api_version: String,
    /// Deployment name of the node's resource.
    pub identifier: String,
    pub image: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub namespace: String,
    pub tag: String,
}

fn default_kind() -> String {
    "Avalanchego".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNodeConfig {
    /// Node binary to execute.
    pub binary_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    K8s,
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::K8s => write!(f, "k8s"),
            Self::Local => write!(f, "local"),
        }
    }
}

// ============================================================================
// Deployment Descriptor
// ============================================================================

/// Submission payload for one node, shaped as a custom resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDescriptor {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub deployment_name: String,
    pub image: String,
    pub tag: String,
    /// Comma separated `NodeID@host:port` list, empty until the beacons are healthy.
    #[serde(rename = "bootstrapperURL", default)]
    pub bootstrapper_url: String,
    pub env: Vec<EnvVar>,
    pub node_count: u32,
    pub certificates: Vec<CertificatePair>,
    pub genesis: String,
}

impl DeploymentDescriptor {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn bootstrap_endpoints(&self) -> Vec<BootstrapEndpoint> {
        BootstrapEndpoint::parse_list(&self.spec.bootstrapper_url)
    }

    /// Set the bootstrap field. It can only be set once; returns false if it already was.
    pub fn set_bootstrap_endpoints(&mut self, endpoints: &[BootstrapEndpoint]) -> bool {
        if !self.spec.bootstrapper_url.is_empty() {
            return false;
        }
        self.spec.bootstrapper_url = BootstrapEndpoint::join(endpoints);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Base64 encoded staking key and certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePair {
    pub key: String,
    pub cert: String,
}

// ============================================================================
// Runtime
// ============================================================================

/// A beacon's advertised identity and staking address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapEndpoint {
    pub node_id: String,
    pub address: String,
}

impl BootstrapEndpoint {
    pub fn join(endpoints: &[BootstrapEndpoint]) -> String {
        endpoints
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse a comma separated `NodeID@host:port` list. Malformed entries are skipped.
    pub fn parse_list(list: &str) -> Vec<BootstrapEndpoint> {
        list.split(',')
            .map(str::trim)
            .filter_map(|entry| {
                let (node_id, address) = entry.split_once('@')?;
                if node_id.is_empty() || address.is_empty() {
                    return None;
                }
                Some(BootstrapEndpoint {
                    node_id: node_id.to_string(),
                    address: address.to_string(),
                })
            })
            .collect()
    }
}

impl fmt::Display for BootstrapEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.node_id, self.address)
    }
}

/// What a backend hands back for a submitted descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    /// Descriptor name the handle was created for
    pub name: String,
    /// Base URL of the node's HTTP API
    pub api_url: String,
    /// host:port the node accepts staking connections on
    pub staking_address: String,
    /// Backend specific reference used for teardown (resource path, data dir)
    pub backend_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkState {
    Initializing,
    BeaconsStarting,
    BeaconsHealthy,
    DependentsStarting,
    Healthy,
    Degraded,
    Failed,
    Stopped,
}

impl NetworkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Stopped)
    }

    /// Failed only moves on to Stopped; Stopped never moves.
    pub fn can_transition_to(&self, next: NetworkState) -> bool {
        match self {
            Self::Stopped => false,
            Self::Failed => next == Self::Stopped,
            _ => *self != next,
        }
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::BeaconsStarting => "beacons-starting",
            Self::BeaconsHealthy => "beacons-healthy",
            Self::DependentsStarting => "dependents-starting",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}
