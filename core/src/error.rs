use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::{BackendKind, NetworkState};

/// A node configuration document could not be translated.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("config file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config file must be a JSON object")]
    NotAnObject,

    #[error("value of '{key}' must be a string, number or boolean")]
    NonScalar { key: String },

    #[error("key '{key}' collides with the reserved variable {reserved}")]
    Reserved { key: String, reserved: &'static str },
}

/// Defects in the network configuration, reported before anything is submitted.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("network has no nodes")]
    NoNodes,

    #[error("network has no beacon nodes")]
    NoBeacons,

    #[error("duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("duplicate deployment name: {0}")]
    DuplicateDeployment(String),

    #[error("node {node} targets the {found} backend but the active backend is {expected}")]
    BackendMismatch {
        node: String,
        found: BackendKind,
        expected: BackendKind,
    },

    #[error("invalid genesis: {0}")]
    Genesis(String),

    #[error("invalid config file for node {node}: {source}")]
    Translation {
        node: String,
        #[source]
        source: TranslationError,
    },

    #[error("orchestrator setting {field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("invalid base64 in {field}: {source}")]
    Encoding {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
}

/// Startup phase a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Beacons,
    Dependents,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Beacons => write!(f, "beacon"),
            Self::Dependents => write!(f, "dependent"),
        }
    }
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Nodes listed in `submitted` are left running for the caller to tear down.
    #[error("failed to submit {phase} node {node}: {source:#}")]
    Submission {
        phase: Phase,
        node: String,
        submitted: Vec<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to discover bootstrap endpoint of beacon {node}: {source:#}")]
    Bootstrap {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{} {phase} node(s) not healthy after {timeout:?}: {}", .pending.len(), .pending.join(", "))]
    HealthTimeout {
        phase: Phase,
        /// Failed when no node of the phase became healthy, Degraded otherwise
        state: NetworkState,
        timeout: Duration,
        healthy: Vec<String>,
        pending: Vec<String>,
    },

    #[error("failed to tear down {}", .failed.join(", "))]
    Teardown { failed: Vec<String> },

    #[error("cannot {action} a network that is {state}")]
    InvalidState {
        action: &'static str,
        state: NetworkState,
    },
}
