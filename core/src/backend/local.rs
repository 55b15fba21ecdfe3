use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::{discover_endpoint, http_client, Backend};
use crate::certs;
use crate::node_client::NodeClient;
use crate::translate::flag;
use crate::types::{BackendKind, BootstrapEndpoint, DeploymentDescriptor, NodeHandle};

pub const DEFAULT_HTTP_PORT: u16 = 9650;
pub const DEFAULT_STAKING_PORT: u16 = 9651;
pub const DEFAULT_PORT_OFFSET: u16 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalBackendConfig {
    /// Parent of the per-network run directories
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_http_port")]
    pub http_port_base: u16,
    #[serde(default = "default_staking_port")]
    pub staking_port_base: u16,
    /// Port distance between consecutive nodes
    #[serde(default = "default_port_offset")]
    pub port_offset: u16,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_staking_port() -> u16 {
    DEFAULT_STAKING_PORT
}

fn default_port_offset() -> u16 {
    DEFAULT_PORT_OFFSET
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            bind_address: default_bind_address(),
            http_port_base: default_http_port(),
            staking_port_base: default_staking_port(),
            port_offset: default_port_offset(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    let mut dir = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    dir.push("netrunner");
    dir
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePorts {
    pub http: u16,
    pub staking: u16,
}

/// Sequential port allocation: node N gets `base + N * offset`.
pub struct PortAllocator {
    http_base: u16,
    staking_base: u16,
    offset: u16,
    next_index: AtomicU16,
}

impl PortAllocator {
    pub fn new(http_base: u16, staking_base: u16, offset: u16) -> Self {
        Self {
            http_base,
            staking_base,
            offset,
            next_index: AtomicU16::new(0),
        }
    }

    pub fn allocate(&self) -> Result<NodePorts> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);

        let ports = index.checked_mul(self.offset).and_then(|shift| {
            Some(NodePorts {
                http: self.http_base.checked_add(shift)?,
                staking: self.staking_base.checked_add(shift)?,
            })
        });

        ports.with_context(|| format!("Exhausted port range at node index {}", index))
    }
}

/// Files a node is started with.
#[derive(Debug, Clone)]
struct NodeFiles {
    dir: PathBuf,
    genesis: PathBuf,
    staking_key: PathBuf,
    staking_cert: PathBuf,
    log: PathBuf,
}

/// Supervises node processes on this host.
pub struct LocalBackend {
    bind_address: IpAddr,
    run_dir: PathBuf,
    ports: PortAllocator,
    processes: Mutex<HashMap<String, Child>>,
    client: reqwest::Client,
}

impl LocalBackend {
    pub fn new(config: LocalBackendConfig) -> Result<Self> {
        let data_dir = config.data_dir.clone().unwrap_or_else(default_data_dir);
        let run_dir = data_dir.join(Uuid::new_v4().to_string());
        let client = http_client(config.request_timeout_ms)?;

        info!("Local backend run directory: {:?}", run_dir);

        Ok(Self {
            bind_address: config.bind_address,
            run_dir,
            ports: PortAllocator::new(
                config.http_port_base,
                config.staking_port_base,
                config.port_offset,
            ),
            processes: Mutex::new(HashMap::new()),
            client,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

/// Write genesis and decoded staking material into the node's directory.
async fn prepare_node_dir(run_dir: &Path, descriptor: &DeploymentDescriptor) -> Result<NodeFiles> {
    let dir = run_dir.join(descriptor.name());
    let staking_dir = dir.join("staking");
    tokio::fs::create_dir_all(&staking_dir)
        .await
        .with_context(|| format!("Failed to create dir {:?}", staking_dir))?;

    let files = NodeFiles {
        genesis: dir.join("genesis.json"),
        staking_key: staking_dir.join("staker.key"),
        staking_cert: staking_dir.join("staker.crt"),
        log: dir.join("node.log"),
        dir,
    };

    tokio::fs::write(&files.genesis, &descriptor.spec.genesis)
        .await
        .with_context(|| format!("Failed to write {:?}", files.genesis))?;

    if let Some(pair) = descriptor.spec.certificates.first() {
        let (key, cert) = certs::decode_pair(pair)?;
        tokio::fs::write(&files.staking_key, key)
            .await
            .with_context(|| format!("Failed to write {:?}", files.staking_key))?;
        tokio::fs::write(&files.staking_cert, cert)
            .await
            .with_context(|| format!("Failed to write {:?}", files.staking_cert))?;
    }

    Ok(files)
}

fn node_args(
    files: &NodeFiles,
    ports: NodePorts,
    bind_address: IpAddr,
    bootstrap: &[BootstrapEndpoint],
) -> Vec<String> {
    let ips: Vec<&str> = bootstrap.iter().map(|e| e.address.as_str()).collect();
    let ids: Vec<&str> = bootstrap.iter().map(|e| e.node_id.as_str()).collect();

    vec![
        flag("data-dir", files.dir.display()),
        flag("log-dir", files.dir.join("logs").display()),
        flag("genesis-file", files.genesis.display()),
        flag("http-host", bind_address),
        flag("http-port", ports.http),
        flag("staking-port", ports.staking),
        flag("staking-tls-key-file", files.staking_key.display()),
        flag("staking-tls-cert-file", files.staking_cert.display()),
        flag("bootstrap-ips", ips.join(",")),
        flag("bootstrap-ids", ids.join(",")),
    ]
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn submit(&self, descriptor: &DeploymentDescriptor) -> Result<NodeHandle> {
        let name = descriptor.name();
        if self.processes.lock().await.contains_key(name) {
            anyhow::bail!("Node already running: {}", name);
        }

        let files = prepare_node_dir(&self.run_dir, descriptor).await?;
        let ports = self.ports.allocate()?;
        let args = node_args(
            &files,
            ports,
            self.bind_address,
            &descriptor.bootstrap_endpoints(),
        );

        let log = std::fs::File::create(&files.log)
            .with_context(|| format!("Failed to create {:?}", files.log))?;
        let log_err = log.try_clone().context("Failed to clone log file handle")?;

        info!(
            "Starting node {} (http={}, staking={})",
            name, ports.http, ports.staking
        );
        debug!("{} {}", descriptor.spec.image, args.join(" "));

        let child = Command::new(&descriptor.spec.image)
            .args(&args)
            .envs(
                descriptor
                    .spec
                    .env
                    .iter()
                    .map(|e| (e.name.as_str(), e.value.as_str())),
            )
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", descriptor.spec.image))?;

        self.processes.lock().await.insert(name.to_string(), child);

        Ok(NodeHandle {
            name: name.to_string(),
            api_url: format!("http://{}", SocketAddr::new(self.bind_address, ports.http)),
            staking_address: SocketAddr::new(self.bind_address, ports.staking).to_string(),
            backend_ref: files.dir.display().to_string(),
        })
    }

    async fn check_health(&self, handle: &NodeHandle) -> Result<bool> {
        {
            let mut processes = self.processes.lock().await;
            let child = processes
                .get_mut(&handle.name)
                .with_context(|| format!("Node not running: {}", handle.name))?;

            if let Some(status) = child.try_wait().context("Failed to poll node process")? {
                debug!("Node {} exited with {}", handle.name, status);
                return Ok(false);
            }
        }

        NodeClient::new(handle.api_url.clone(), self.client.clone())
            .health()
            .await
    }

    async fn bootstrap_endpoint(&self, handle: &NodeHandle) -> Result<BootstrapEndpoint> {
        let client = NodeClient::new(handle.api_url.clone(), self.client.clone());
        discover_endpoint(&client, handle).await
    }

    async fn teardown(&self, handle: &NodeHandle) -> Result<()> {
        let mut child = self
            .processes
            .lock()
            .await
            .remove(&handle.name)
            .with_context(|| format!("Node not found: {}", handle.name))?;

        match child.try_wait() {
            Ok(Some(status)) => info!("Node {} had already exited ({})", handle.name, status),
            _ => {
                info!("Stopping node {}", handle.name);
                child
                    .kill()
                    .await
                    .with_context(|| format!("Failed to kill node {}", handle.name))?;
            }
        }

        let dir = self.run_dir.join(&handle.name);
        tokio::fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to remove {:?}", dir))?;

        // Last node out removes the run directory
        if self.processes.lock().await.is_empty() {
            if let Err(e) = tokio::fs::remove_dir(&self.run_dir).await {
                debug!("Keeping run directory {:?}: {}", self.run_dir, e);
            }
        }

        Ok(())
    }
}
