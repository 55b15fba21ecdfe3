use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct NodeIdReply {
    #[serde(rename = "nodeID")]
    node_id: String,
}

/// Client for the node's health and info APIs.
pub struct NodeClient {
    base_url: String,
    client: Client,
}

impl NodeClient {
    pub fn new(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /ext/health. Level-triggered: 200 means healthy, any other status means not (yet).
    pub async fn health(&self) -> Result<bool> {
        let url = format!("{}/ext/health", self.base_url);
        debug!("Checking health at {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send health request")?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            status => {
                debug!("Health check at {} returned {}", url, status);
                Ok(false)
            }
        }
    }

    /// info.getNodeID via POST /ext/info
    pub async fn node_id(&self) -> Result<String> {
        let url = format!("{}/ext/info", self.base_url);
        debug!("Fetching node ID from {}", url);

        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "info.getNodeID",
            params: Value::Object(Default::default()),
        };

        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .context("Failed to send info request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("info.getNodeID failed ({}): {}", status, body);
        }

        let reply = resp
            .json::<JsonRpcResponse<NodeIdReply>>()
            .await
            .context("Failed to parse info response")?;

        if let Some(err) = reply.error {
            anyhow::bail!("info.getNodeID failed ({}): {}", err.code, err.message);
        }

        let result = reply
            .result
            .context("info.getNodeID returned neither result nor error")?;
        Ok(result.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = NodeClient::new("http://127.0.0.1:9650/", Client::new());
        assert_eq!(client.base_url(), "http://127.0.0.1:9650");
    }

    #[test]
    fn test_parse_node_id_reply() {
        let body = r#"{"jsonrpc":"2.0","result":{"nodeID":"NodeID-7Xhw2mDxuDS44j42TCB6U5579esbSt3Lg"},"id":1}"#;
        let reply: JsonRpcResponse<NodeIdReply> = serde_json::from_str(body).unwrap();
        assert_eq!(
            reply.result.unwrap().node_id,
            "NodeID-7Xhw2mDxuDS44j42TCB6U5579esbSt3Lg"
        );

        let body = r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"method not found"},"id":1}"#;
        let reply: JsonRpcResponse<NodeIdReply> = serde_json::from_str(body).unwrap();
        assert!(reply.result.is_none());
        assert_eq!(reply.error.unwrap().code, -32601);
    }
}
