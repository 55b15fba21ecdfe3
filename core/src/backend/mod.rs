pub mod k8s;
pub mod local;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::node_client::NodeClient;
use crate::types::{BackendKind, BootstrapEndpoint, DeploymentDescriptor, NodeHandle};

pub use k8s::{K8sBackend, K8sBackendConfig};
pub use local::{LocalBackend, LocalBackendConfig, NodePorts, PortAllocator};

/// An execution environment that turns descriptors into running nodes.
///
/// Implementations must be safe to call concurrently: the orchestrator runs
/// one task per node for submission and health polling.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Create the node described by `descriptor`.
    async fn submit(&self, descriptor: &DeploymentDescriptor) -> Result<NodeHandle>;

    /// One level-triggered health probe. `Ok(false)` means not ready yet.
    async fn check_health(&self, handle: &NodeHandle) -> Result<bool>;

    /// The identity and staking address dependents should bootstrap from.
    async fn bootstrap_endpoint(&self, handle: &NodeHandle) -> Result<BootstrapEndpoint>;

    async fn teardown(&self, handle: &NodeHandle) -> Result<()>;
}

/// Backend selection, keyed by backend identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendConfig {
    K8s(K8sBackendConfig),
    Local(LocalBackendConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::K8s(_) => BackendKind::K8s,
            Self::Local(_) => BackendKind::Local,
        }
    }

    pub fn into_backend(self) -> Result<Arc<dyn Backend>> {
        Ok(match self {
            Self::K8s(config) => Arc::new(K8sBackend::new(config)?),
            Self::Local(config) => Arc::new(LocalBackend::new(config)?),
        })
    }
}

/// Ask a node for its ID and pair it with the staking address the backend assigned.
async fn discover_endpoint(client: &NodeClient, handle: &NodeHandle) -> Result<BootstrapEndpoint> {
    let node_id = client.node_id().await?;
    Ok(BootstrapEndpoint {
        node_id,
        address: handle.staking_address.clone(),
    })
}

fn http_client(timeout_ms: u64) -> Result<reqwest::Client> {
    use anyhow::Context;

    reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(timeout_ms))
        .build()
        .context("Failed to create HTTP client")
}
