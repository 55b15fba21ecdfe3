use anyhow::{bail, Context, Result};
use netrunner_core::{BackendConfig, NetworkConfig, NodeConfig, OrchestratorConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Network description read by `netrunner render` and `netrunner start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Inline genesis, either as a JSON object or as the raw document text
    #[serde(default)]
    pub genesis: Option<Value>,
    #[serde(default)]
    pub genesis_file: Option<PathBuf>,
    pub nodes: Vec<NodeEntry>,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    pub backend: BackendConfig,
}

/// A node as written in the config file. Material may be given inline or by path;
/// a path wins over the inline value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    #[serde(flatten)]
    pub node: NodeConfig,
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    #[serde(default)]
    pub staking_key_path: Option<PathBuf>,
    #[serde(default)]
    pub staking_cert_path: Option<PathBuf>,
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read config {:?}", path))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(cfg)
    }

    /// Resolve file references (relative to `base_dir`) into a network.
    pub fn to_network(&self, base_dir: &Path) -> Result<NetworkConfig> {
        let genesis = match (&self.genesis, &self.genesis_file) {
            (Some(_), Some(_)) => bail!("Config sets both genesis and genesis_file"),
            (None, None) => bail!("Config sets neither genesis nor genesis_file"),
            (Some(Value::String(text)), None) => text.clone(),
            (Some(value), None) => {
                serde_json::to_string(value).context("Failed to serialize inline genesis")?
            }
            (None, Some(path)) => read_text(base_dir, path)?,
        };

        let node_configs = self
            .nodes
            .iter()
            .map(|entry| entry.resolve(base_dir))
            .collect::<Result<Vec<_>>>()?;

        Ok(NetworkConfig {
            genesis,
            node_configs,
        })
    }
}

impl NodeEntry {
    fn resolve(&self, base_dir: &Path) -> Result<NodeConfig> {
        let mut node = self.node.clone();
        if let Some(path) = &self.config_path {
            node.config_file = read_text(base_dir, path)?;
        }
        if let Some(path) = &self.staking_key_path {
            node.staking_key = read_text(base_dir, path)?;
        }
        if let Some(path) = &self.staking_cert_path {
            node.staking_cert = read_text(base_dir, path)?;
        }
        Ok(node)
    }
}

fn read_text(base_dir: &Path, path: &Path) -> Result<String> {
    let path = base_dir.join(path);
    fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))
}
