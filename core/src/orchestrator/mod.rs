//! Startup and supervision of one network.
//!
//! The orchestrator submits the beacon descriptors, waits for every beacon to
//! report healthy, injects the beacons' bootstrap endpoints into the dependent
//! descriptors, submits those, and waits for them in turn. Each phase runs one
//! task per node and joins all of them before the state machine advances.
//! Once started, every node gets a background monitor whose reports are folded
//! into Healthy/Degraded by a single state-owning task.

mod config;
mod health;

pub use config::OrchestratorConfig;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::deployment::{build_deployments, Deployments};
use crate::error::{NetworkError, Phase};
use crate::types::{
    BootstrapEndpoint, DeploymentDescriptor, NetworkConfig, NetworkState, NodeHandle,
};

struct Monitors {
    tasks: JoinSet<()>,
    keeper: JoinHandle<()>,
}

struct PhaseOutcome {
    healthy: Vec<String>,
    pending: Vec<String>,
}

/// Drives one network from Initializing to Healthy (or Degraded/Failed) and
/// back down to Stopped. Not reusable: a stopped orchestrator stays stopped.
pub struct NetworkOrchestrator {
    network: NetworkConfig,
    backend: Arc<dyn Backend>,
    config: OrchestratorConfig,
    state: Arc<watch::Sender<NetworkState>>,
    descriptors: Vec<DeploymentDescriptor>,
    submitted: Vec<NodeHandle>,
    shutdown: CancellationToken,
    monitors: Option<Monitors>,
}

impl NetworkOrchestrator {
    pub fn new(network: NetworkConfig, backend: Arc<dyn Backend>, config: OrchestratorConfig) -> Self {
        let (state, _) = watch::channel(NetworkState::Initializing);

        Self {
            network,
            backend,
            config,
            state: Arc::new(state),
            descriptors: Vec::new(),
            submitted: Vec::new(),
            shutdown: CancellationToken::new(),
            monitors: None,
        }
    }

    pub fn state(&self) -> NetworkState {
        *self.state.borrow()
    }

    /// Watch state transitions, including the ones made by background monitors.
    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.state.subscribe()
    }

    /// Nodes the backend accepted and that have not been torn down.
    pub fn submitted_nodes(&self) -> &[NodeHandle] {
        &self.submitted
    }

    /// Descriptors of the network, beacons first. Dependents carry their
    /// bootstrap endpoints once the beacon phase is over.
    pub fn descriptors(&self) -> &[DeploymentDescriptor] {
        &self.descriptors
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn transition(&self, next: NetworkState) -> bool {
        health::transition(&self.state, next)
    }

    /// Bring the network up.
    ///
    /// Configuration defects are reported before anything is submitted. On a
    /// submission or health failure, nodes already submitted keep running;
    /// call [`stop`](Self::stop) to tear them down.
    pub async fn start(&mut self) -> Result<(), NetworkError> {
        let current = self.state();
        if current != NetworkState::Initializing {
            return Err(NetworkError::InvalidState {
                action: "start",
                state: current,
            });
        }

        let deployments = self
            .config
            .validate()
            .and_then(|()| build_deployments(&self.network, self.backend.kind()));
        let Deployments {
            beacons,
            mut non_beacons,
        } = match deployments {
            Ok(deployments) => deployments,
            Err(e) => {
                error!("Invalid network configuration: {}", e);
                self.transition(NetworkState::Failed);
                return Err(e.into());
            }
        };

        info!(
            "Starting network with {} beacon(s) and {} dependent(s)",
            beacons.len(),
            non_beacons.len()
        );
        self.descriptors = beacons.iter().chain(non_beacons.iter()).cloned().collect();

        self.transition(NetworkState::BeaconsStarting);
        let beacon_handles = self.submit_phase(Phase::Beacons, &beacons).await?;

        let outcome = self.await_healthy(&beacon_handles).await;
        if !outcome.pending.is_empty() {
            self.transition(NetworkState::Failed);
            return Err(self.timeout_error(Phase::Beacons, NetworkState::Failed, outcome));
        }
        self.transition(NetworkState::BeaconsHealthy);

        if non_beacons.is_empty() {
            self.transition(NetworkState::Healthy);
            self.spawn_monitors(HashMap::new());
            return Ok(());
        }

        let endpoints = self.discover_bootstrap_endpoints(&beacon_handles).await?;
        for descriptor in &mut non_beacons {
            let fresh = descriptor.set_bootstrap_endpoints(&endpoints);
            debug_assert!(fresh, "bootstrap endpoints already set on {}", descriptor.name());
        }
        self.descriptors = beacons.into_iter().chain(non_beacons.iter().cloned()).collect();

        self.transition(NetworkState::DependentsStarting);
        let dependent_handles = self.submit_phase(Phase::Dependents, &non_beacons).await?;

        let outcome = self.await_healthy(&dependent_handles).await;
        if outcome.pending.is_empty() {
            self.transition(NetworkState::Healthy);
            self.spawn_monitors(HashMap::new());
            info!("Network is healthy");
            return Ok(());
        }

        if outcome.healthy.is_empty() {
            self.transition(NetworkState::Failed);
            return Err(self.timeout_error(Phase::Dependents, NetworkState::Failed, outcome));
        }

        // Keep watching: late dependents can still bring the network to Healthy.
        self.transition(NetworkState::Degraded);
        let statuses = outcome.pending.iter().map(|n| (n.clone(), false)).collect();
        self.spawn_monitors(statuses);
        Err(self.timeout_error(Phase::Dependents, NetworkState::Degraded, outcome))
    }

    /// Tear the network down. Valid from any state but Stopped.
    pub async fn stop(&mut self) -> Result<(), NetworkError> {
        let current = self.state();
        if current == NetworkState::Stopped {
            return Err(NetworkError::InvalidState {
                action: "stop",
                state: current,
            });
        }

        info!("Stopping network ({} node(s) submitted)", self.submitted.len());
        self.shutdown.cancel();

        if let Some(mut monitors) = self.monitors.take() {
            while let Some(joined) = monitors.tasks.join_next().await {
                if let Err(e) = joined {
                    warn!("Health monitor ended abnormally: {}", e);
                }
            }
            if let Err(e) = monitors.keeper.await {
                warn!("State keeper ended abnormally: {}", e);
            }
        }

        let backend = self.backend.clone();
        let results = join_all(self.submitted.iter().map(|handle| {
            let backend = backend.clone();
            async move { (handle.name.clone(), backend.teardown(handle).await) }
        }))
        .await;

        let mut failed = Vec::new();
        for (name, result) in results {
            if let Err(e) = result {
                error!("Failed to tear down {}: {:#}", name, e);
                failed.push(name);
            }
        }

        self.submitted.clear();
        self.transition(NetworkState::Stopped);

        if failed.is_empty() {
            Ok(())
        } else {
            Err(NetworkError::Teardown { failed })
        }
    }

    /// Submit every descriptor of a phase concurrently. A failure moves the
    /// network to Failed once every in-flight submission of the phase has
    /// answered, so nodes the backend accepted are always recorded for teardown.
    async fn submit_phase(
        &mut self,
        phase: Phase,
        descriptors: &[DeploymentDescriptor],
    ) -> Result<Vec<NodeHandle>, NetworkError> {
        info!("Submitting {} {} node(s)", descriptors.len(), phase);

        let mut pending: FuturesUnordered<_> = descriptors
            .iter()
            .map(|descriptor| {
                let backend = self.backend.clone();
                async move {
                    let result = backend.submit(descriptor).await;
                    (descriptor.name().to_string(), result)
                }
            })
            .collect();

        let mut accepted = HashMap::new();
        let mut first_failure = None;
        while let Some((name, result)) = pending.next().await {
            match result {
                Ok(handle) => {
                    debug!("Submitted {}", name);
                    self.submitted.push(handle.clone());
                    accepted.insert(name, handle);
                }
                Err(e) => {
                    error!("Failed to submit {} node {}: {:#}", phase, name, e);
                    if first_failure.is_none() {
                        first_failure = Some((name, e));
                    }
                }
            }
        }

        if let Some((node, source)) = first_failure {
            self.transition(NetworkState::Failed);
            return Err(NetworkError::Submission {
                phase,
                node,
                submitted: self.submitted.iter().map(|h| h.name.clone()).collect(),
                source,
            });
        }

        Ok(descriptors
            .iter()
            .filter_map(|d| accepted.remove(d.name()))
            .collect())
    }

    /// Poll every node of a phase until all are healthy or the startup deadline passes.
    async fn await_healthy(&self, handles: &[NodeHandle]) -> PhaseOutcome {
        let (tx, mut rx) = mpsc::channel(handles.len() * 2 + 1);
        let cancel = self.shutdown.child_token();

        let mut tasks = JoinSet::new();
        for handle in handles {
            tasks.spawn(health::poll_until_healthy(
                self.backend.clone(),
                handle.clone(),
                self.config.poll_interval(),
                self.config.attempt_timeout(),
                tx.clone(),
                cancel.clone(),
            ));
        }
        drop(tx);

        let mut ready = HashSet::new();
        let deadline = tokio::time::sleep(self.config.startup_timeout());
        tokio::pin!(deadline);

        while ready.len() < handles.len() {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(
                        "Startup deadline of {:?} reached with {}/{} node(s) healthy",
                        self.config.startup_timeout(),
                        ready.len(),
                        handles.len()
                    );
                    break;
                }
                report = rx.recv() => match report {
                    Some(report) if report.healthy => {
                        info!("Node {} is healthy", report.node);
                        ready.insert(report.node);
                    }
                    Some(report) => debug!("Node {} not healthy yet", report.node),
                    None => break,
                },
            }
        }

        // Barrier: no poll task of this phase outlives it.
        cancel.cancel();
        drop(rx);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Health poll task ended abnormally: {}", e);
            }
        }

        let (healthy, pending): (Vec<String>, Vec<String>) = handles
            .iter()
            .map(|h| h.name.clone())
            .partition(|name| ready.contains(name));

        PhaseOutcome { healthy, pending }
    }

    async fn discover_bootstrap_endpoints(
        &self,
        beacons: &[NodeHandle],
    ) -> Result<Vec<BootstrapEndpoint>, NetworkError> {
        let attempt_timeout = self.config.attempt_timeout();

        let results = join_all(beacons.iter().map(|handle| {
            let backend = self.backend.clone();
            async move {
                let result =
                    match tokio::time::timeout(attempt_timeout, backend.bootstrap_endpoint(handle))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(anyhow::anyhow!("timed out after {:?}", attempt_timeout)),
                    };
                (handle.name.clone(), result)
            }
        }))
        .await;

        let mut endpoints = Vec::with_capacity(results.len());
        for (name, result) in results {
            match result {
                Ok(endpoint) => {
                    info!("Beacon {} bootstraps at {}", name, endpoint);
                    endpoints.push(endpoint);
                }
                Err(source) => {
                    error!("Failed to discover bootstrap endpoint of {}: {:#}", name, source);
                    self.transition(NetworkState::Failed);
                    return Err(NetworkError::Bootstrap { node: name, source });
                }
            }
        }

        Ok(endpoints)
    }

    /// Start one monitor per submitted node and the task that owns their statuses.
    /// Nodes missing from `statuses` are taken to be healthy.
    fn spawn_monitors(&mut self, mut statuses: HashMap<String, bool>) {
        for handle in &self.submitted {
            statuses.entry(handle.name.clone()).or_insert(true);
        }

        let (tx, rx) = mpsc::channel(self.submitted.len() * 2 + 1);
        let cancel = self.shutdown.child_token();

        let mut tasks = JoinSet::new();
        for handle in &self.submitted {
            tasks.spawn(health::monitor_node(
                self.backend.clone(),
                handle.clone(),
                self.config.monitor_interval(),
                self.config.attempt_timeout(),
                tx.clone(),
                cancel.clone(),
            ));
        }

        let keeper = tokio::spawn(health::keep_state(self.state.clone(), statuses, rx, cancel));
        debug!("Started {} background health monitor(s)", tasks.len());

        self.monitors = Some(Monitors { tasks, keeper });
    }

    fn timeout_error(&self, phase: Phase, state: NetworkState, outcome: PhaseOutcome) -> NetworkError {
        NetworkError::HealthTimeout {
            phase,
            state,
            timeout: self.config.startup_timeout(),
            healthy: outcome.healthy,
            pending: outcome.pending,
        }
    }
}

impl Drop for NetworkOrchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
