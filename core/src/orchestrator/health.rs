use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::types::{NetworkState, NodeHandle};

/// Result of one health probe, sent by a poll task to the state owner.
#[derive(Debug, Clone)]
pub(crate) struct HealthReport {
    pub node: String,
    pub healthy: bool,
}

/// Apply a state transition unless the current state forbids it.
///
/// All writes go through here so that a stale report can never move the
/// network out of Failed or Stopped.
pub(crate) fn transition(state: &watch::Sender<NetworkState>, next: NetworkState) -> bool {
    state.send_if_modified(|current| {
        if !current.can_transition_to(next) {
            return false;
        }
        info!("Network state: {} -> {}", current, next);
        *current = next;
        true
    })
}

async fn probe(backend: &dyn Backend, handle: &NodeHandle, attempt_timeout: Duration) -> bool {
    match tokio::time::timeout(attempt_timeout, backend.check_health(handle)).await {
        Ok(Ok(healthy)) => {
            debug!("Node {} healthy={}", handle.name, healthy);
            healthy
        }
        Ok(Err(e)) => {
            debug!("Health check of {} failed: {:#}", handle.name, e);
            false
        }
        Err(_) => {
            debug!("Health check of {} timed out after {:?}", handle.name, attempt_timeout);
            false
        }
    }
}

/// Startup poll task: probe until the node reports healthy or the phase is cancelled.
pub(crate) async fn poll_until_healthy(
    backend: Arc<dyn Backend>,
    handle: NodeHandle,
    interval: Duration,
    attempt_timeout: Duration,
    reports: mpsc::Sender<HealthReport>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let healthy = tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    healthy = probe(backend.as_ref(), &handle, attempt_timeout) => healthy,
                }
            }
        };

        let report = HealthReport {
            node: handle.name.clone(),
            healthy,
        };
        if reports.send(report).await.is_err() || healthy {
            return;
        }
    }
}

/// Background monitor: keeps probing a node for as long as the network lives.
pub(crate) async fn monitor_node(
    backend: Arc<dyn Backend>,
    handle: NodeHandle,
    interval: Duration,
    attempt_timeout: Duration,
    reports: mpsc::Sender<HealthReport>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; startup just probed this node.
    ticker.tick().await;

    loop {
        let healthy = tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    healthy = probe(backend.as_ref(), &handle, attempt_timeout) => healthy,
                }
            }
        };

        let report = HealthReport {
            node: handle.name.clone(),
            healthy,
        };
        if reports.send(report).await.is_err() {
            return;
        }
    }
}

/// Single owner of the post-startup node statuses. Folds monitor reports into
/// Healthy/Degraded and publishes the result.
pub(crate) async fn keep_state(
    state: Arc<watch::Sender<NetworkState>>,
    mut statuses: HashMap<String, bool>,
    mut reports: mpsc::Receiver<HealthReport>,
    cancel: CancellationToken,
) {
    loop {
        let report = tokio::select! {
            _ = cancel.cancelled() => return,
            report = reports.recv() => match report {
                Some(report) => report,
                None => return,
            },
        };

        let previous = statuses.insert(report.node.clone(), report.healthy);
        if previous != Some(report.healthy) {
            if report.healthy {
                info!("Node {} is healthy again", report.node);
            } else {
                warn!("Node {} became unhealthy", report.node);
            }
        }

        let next = if statuses.values().all(|healthy| *healthy) {
            NetworkState::Healthy
        } else {
            NetworkState::Degraded
        };
        transition(&state, next);
    }
}
