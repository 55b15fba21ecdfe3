use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigurationError;

/// Timing of the startup and monitoring protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Interval between health probes during startup
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Bound on a single health probe
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    /// Deadline for each startup phase (beacons, dependents)
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    /// Interval between background health probes once the network is up
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_attempt_timeout_ms() -> u64 {
    5_000
}

fn default_startup_timeout_ms() -> u64 {
    300_000
}

fn default_monitor_interval_ms() -> u64 {
    5_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            startup_timeout_ms: default_startup_timeout_ms(),
            monitor_interval_ms: default_monitor_interval_ms(),
        }
    }
}

impl OrchestratorConfig {
    /// Every interval and timeout must be non-zero; a zero period cannot drive a ticker.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let settings = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("attempt_timeout_ms", self.attempt_timeout_ms),
            ("startup_timeout_ms", self.startup_timeout_ms),
            ("monitor_interval_ms", self.monitor_interval_ms),
        ];

        match settings.into_iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(ConfigurationError::ZeroDuration { field }),
            None => Ok(()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}
