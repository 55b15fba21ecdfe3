//! netrunner-core: provision and supervise ephemeral multi-node test networks.
//!
//! A [`NetworkConfig`] (shared genesis plus one [`NodeConfig`] per node) is
//! translated into one [`DeploymentDescriptor`] per node, submitted to a
//! [`Backend`], and health-gated by the [`NetworkOrchestrator`]: beacons come
//! up first, their bootstrap endpoints are injected into the dependents, and
//! the dependents are started once every beacon reports healthy.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use netrunner_core::{BackendConfig, NetworkConfig, NetworkOrchestrator, OrchestratorConfig};
//!
//! # async fn run(network: NetworkConfig, backend: BackendConfig) -> anyhow::Result<()> {
//! let backend = backend.into_backend()?;
//! let mut orchestrator = NetworkOrchestrator::new(network, backend, OrchestratorConfig::default());
//! orchestrator.start().await?;
//! orchestrator.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod certs;
pub mod deployment;
pub mod error;
pub mod genesis;
pub mod node_client;
pub mod orchestrator;
pub mod translate;
pub mod types;

pub use backend::{Backend, BackendConfig, K8sBackend, K8sBackendConfig, LocalBackend, LocalBackendConfig};
pub use deployment::{build_deployments, Deployments};
pub use error::{ConfigurationError, NetworkError, Phase, TranslationError};
pub use orchestrator::{NetworkOrchestrator, OrchestratorConfig};
pub use types::{
    BackendKind, BootstrapEndpoint, CertificatePair, DeploymentDescriptor, DeploymentSpec, EnvVar,
    K8sNodeConfig, LocalNodeConfig, NetworkConfig, NetworkState, NodeBackendConfig, NodeConfig,
    NodeHandle, ObjectMeta,
};
