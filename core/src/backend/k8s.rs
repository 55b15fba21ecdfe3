use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{discover_endpoint, http_client, Backend};
use crate::node_client::NodeClient;
use crate::types::{BackendKind, BootstrapEndpoint, DeploymentDescriptor, NodeHandle};

pub const DEFAULT_NODE_API_TEMPLATE: &str = "http://{name}.{namespace}.svc.cluster.local:9650";
pub const DEFAULT_STAKING_ADDRESS_TEMPLATE: &str = "{name}.{namespace}.svc.cluster.local:9651";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct K8sBackendConfig {
    /// Base URL of the orchestration API server
    pub api_server: String,
    /// Bearer token for the API server
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Where a node's HTTP API is reachable; `{name}` and `{namespace}` are substituted
    #[serde(default = "default_node_api_template")]
    pub node_api_template: String,
    /// Where a node accepts staking connections; same placeholders
    #[serde(default = "default_staking_address_template")]
    pub staking_address_template: String,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_node_api_template() -> String {
    DEFAULT_NODE_API_TEMPLATE.to_string()
}

fn default_staking_address_template() -> String {
    DEFAULT_STAKING_ADDRESS_TEMPLATE.to_string()
}

impl K8sBackendConfig {
    pub fn new(api_server: impl Into<String>) -> Self {
        Self {
            api_server: api_server.into(),
            token: None,
            request_timeout_ms: default_request_timeout_ms(),
            node_api_template: default_node_api_template(),
            staking_address_template: default_staking_address_template(),
        }
    }
}

/// Error body returned by the API server.
#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub message: Option<String>,
    pub reason: Option<String>,
    pub code: Option<u16>,
}

/// Submits descriptors as custom resources; a controller on the cluster turns them into pods.
pub struct K8sBackend {
    api_server: Url,
    token: Option<String>,
    node_api_template: String,
    staking_address_template: String,
    client: Client,
}

impl K8sBackend {
    pub fn new(config: K8sBackendConfig) -> Result<Self> {
        let api_server = Url::parse(&config.api_server).context("Invalid API server URL")?;
        let client = http_client(config.request_timeout_ms)?;

        Ok(Self {
            api_server,
            token: config.token,
            node_api_template: config.node_api_template,
            staking_address_template: config.staking_address_template,
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.api_server.join(path).with_context(|| {
            format!(
                "Failed to join api_server={} with path={}",
                self.api_server, path
            )
        })?;

        let mut req = self.client.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        Ok(req)
    }

    fn node_client(&self, handle: &NodeHandle) -> NodeClient {
        NodeClient::new(handle.api_url.clone(), self.client.clone())
    }
}

/// `v1` lives under `/api`, `group/version` under `/apis`.
pub fn collection_path(api_version: &str, namespace: &str, kind: &str) -> String {
    let root = if api_version.contains('/') { "apis" } else { "api" };
    format!(
        "/{}/{}/namespaces/{}/{}s",
        root,
        api_version,
        namespace,
        kind.to_lowercase()
    )
}

pub fn render_template(template: &str, name: &str, namespace: &str) -> String {
    template
        .replace("{name}", name)
        .replace("{namespace}", namespace)
}

async fn api_error(action: &str, resp: Response) -> anyhow::Error {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    match serde_json::from_str::<Status>(&body) {
        Ok(Status {
            message: Some(message),
            reason,
            ..
        }) => match reason {
            Some(reason) => anyhow!("{} failed ({}, {}): {}", action, status, reason, message),
            None => anyhow!("{} failed ({}): {}", action, status, message),
        },
        _ => anyhow!("{} failed ({}): {}", action, status, body),
    }
}

#[async_trait]
impl Backend for K8sBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::K8s
    }

    async fn submit(&self, descriptor: &DeploymentDescriptor) -> Result<NodeHandle> {
        let name = descriptor.name();
        let namespace = descriptor.namespace();
        let path = collection_path(&descriptor.api_version, namespace, &descriptor.kind);

        info!(
            "Creating {} {}/{} ({}:{})",
            descriptor.kind, namespace, name, descriptor.spec.image, descriptor.spec.tag
        );

        let resp = self
            .request(Method::POST, &path)?
            .json(descriptor)
            .send()
            .await
            .context("Failed to send create request")?;

        if !resp.status().is_success() {
            return Err(api_error("Create", resp).await);
        }

        debug!("Created {}/{}", namespace, name);

        Ok(NodeHandle {
            name: name.to_string(),
            api_url: render_template(&self.node_api_template, name, namespace),
            staking_address: render_template(&self.staking_address_template, name, namespace),
            backend_ref: format!("{}/{}", path, name),
        })
    }

    async fn check_health(&self, handle: &NodeHandle) -> Result<bool> {
        self.node_client(handle).health().await
    }

    async fn bootstrap_endpoint(&self, handle: &NodeHandle) -> Result<BootstrapEndpoint> {
        discover_endpoint(&self.node_client(handle), handle).await
    }

    async fn teardown(&self, handle: &NodeHandle) -> Result<()> {
        info!("Deleting {}", handle.backend_ref);

        let resp = self
            .request(Method::DELETE, &handle.backend_ref)?
            .send()
            .await
            .context("Failed to send delete request")?;

        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                warn!("{} was already gone", handle.backend_ref);
                Ok(())
            }
            _ => Err(api_error("Delete", resp).await),
        }
    }
}
