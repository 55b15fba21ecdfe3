use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use netrunner_core::{K8sBackendConfig, K8sNodeConfig, NodeBackendConfig, NodeConfig, OrchestratorConfig};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const TEST_GENESIS: &str = r#"{"networkID": 9999, "allocations": [], "startTime": 1630987200}"#;

/// How a mocked node answers `/ext/health`.
#[derive(Debug, Clone, Copy)]
pub enum Health {
    /// 503 for the first n probes, 200 afterwards
    After(usize),
    Never,
}

#[derive(Default)]
struct ClusterState {
    created: Mutex<Vec<(String, Value)>>,
    deleted: Mutex<Vec<String>>,
    health: Mutex<HashMap<String, Health>>,
    probes: Mutex<HashMap<String, usize>>,
    rejected: Mutex<HashSet<String>>,
}

/// In-process stand-in for an orchestration API server plus the HTTP APIs of
/// the nodes it runs. Node APIs are served under `/nodes/{name}`.
pub struct MockCluster {
    pub port: u16,
    state: Arc<ClusterState>,
    server: tokio::task::JoinHandle<()>,
}

impl MockCluster {
    pub async fn start() -> Self {
        let state = Arc::new(ClusterState::default());

        let app = Router::new()
            .route("/api/:version/namespaces/:ns/:plural", post(create_resource))
            .route(
                "/api/:version/namespaces/:ns/:plural/:name",
                axum::routing::delete(delete_resource),
            )
            .route(
                "/apis/:group/:version/namespaces/:ns/:plural",
                post(create_resource),
            )
            .route(
                "/apis/:group/:version/namespaces/:ns/:plural/:name",
                axum::routing::delete(delete_resource),
            )
            .route("/nodes/:name/ext/health", get(node_health))
            .route("/nodes/:name/ext/info", post(node_info))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock cluster");
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock cluster failed");
        });

        Self {
            port,
            state,
            server,
        }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Backend config pointing both the API server and node APIs at this mock.
    pub fn backend_config(&self) -> K8sBackendConfig {
        let mut config = K8sBackendConfig::new(self.url());
        config.node_api_template = format!("{}/nodes/{{name}}", self.url());
        config.request_timeout_ms = 1_000;
        config
    }

    pub fn set_health(&self, name: &str, health: Health) {
        self.state
            .health
            .lock()
            .unwrap()
            .insert(name.to_string(), health);
    }

    pub fn reject(&self, name: &str) {
        self.state.rejected.lock().unwrap().insert(name.to_string());
    }

    /// (request path, body) of every accepted create, in arrival order.
    pub fn created(&self) -> Vec<(String, Value)> {
        self.state.created.lock().unwrap().clone()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.created()
            .iter()
            .map(|(_, body)| body["metadata"]["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.deleted.lock().unwrap().clone()
    }
}

impl Drop for MockCluster {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn create_resource(
    State(state): State<Arc<ClusterState>>,
    uri: Uri,
    Json(body): Json<Value>,
) -> Response {
    let name = body["metadata"]["name"].as_str().unwrap_or_default().to_string();

    if state.rejected.lock().unwrap().contains(&name) {
        let status = json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": format!("avalanchegos \"{}\" already exists", name),
            "reason": "AlreadyExists",
            "code": 409
        });
        return (StatusCode::CONFLICT, Json(status)).into_response();
    }

    state
        .created
        .lock()
        .unwrap()
        .push((uri.path().to_string(), body.clone()));
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn delete_resource(State(state): State<Arc<ClusterState>>, uri: Uri) -> StatusCode {
    state.deleted.lock().unwrap().push(uri.path().to_string());
    StatusCode::OK
}

async fn node_health(
    State(state): State<Arc<ClusterState>>,
    Path(name): Path<String>,
) -> StatusCode {
    let probes = {
        let mut probes = state.probes.lock().unwrap();
        let count = probes.entry(name.clone()).or_insert(0);
        *count += 1;
        *count
    };

    let health = state.health.lock().unwrap().get(&name).copied();
    match health {
        Some(Health::After(n)) if probes > n => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn node_info(Path(name): Path<String>, Json(req): Json<Value>) -> Json<Value> {
    assert_eq!(req["method"], "info.getNodeID");
    Json(json!({
        "jsonrpc": "2.0",
        "id": req["id"],
        "result": {"nodeID": format!("NodeID-{}", name)}
    }))
}

pub fn k8s_node(name: &str, is_beacon: bool, identifier: &str) -> NodeConfig {
    NodeConfig {
        name: name.to_string(),
        is_beacon,
        config_file: r#"{"network-peer-list-gossip-frequency": "250ms", "network-max-reconnect-delay": "1s"}"#
            .to_string(),
        staking_key: "fooKey".to_string(),
        staking_cert: "fooCert".to_string(),
        backend: NodeBackendConfig::K8s(K8sNodeConfig {
            api_version: "v1".to_string(),
            identifier: identifier.to_string(),
            image: "avaplatform/avalanchego".to_string(),
            kind: "Avalanchego".to_string(),
            namespace: "test01".to_string(),
            tag: "v1.10.0".to_string(),
        }),
    }
}

pub fn fast_orchestrator() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval_ms: 20,
        attempt_timeout_ms: 500,
        startup_timeout_ms: 1_500,
        monitor_interval_ms: 50,
    }
}
