use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::node::{Node, NodeRegistry, NodeStatus};

/// Probe `node` and record the result: `up` on success, `down` on failure.
///
/// The probe runs without holding the node's guard. If a dispatch recorded a transport
/// failure while the probe was in flight, the probe result is not applied; the error,
/// if any, is still returned. Overlapping health checks do not discard each other.
pub async fn health_check(node: &Node) -> Result<()> {
    let epoch = node.state().read().await.failure_epoch;

    let probe = node.transport().health_check().await;

    let mut state = node.state().write().await;
    state.last_checked = Some(Utc::now());
    if state.failure_epoch != epoch {
        tracing::debug!(node = %node.name(), "Dispatch failed during probe, result discarded");
        return probe.map_err(|e| e.for_node(node.name()));
    }

    match &probe {
        Ok(()) => {
            if state.set_status(NodeStatus::Up) == NodeStatus::Down {
                tracing::info!(node = %node.name(), "Node is back up");
            }
        }
        Err(e) => {
            if state.set_status(NodeStatus::Down) == NodeStatus::Up {
                tracing::warn!(node = %node.name(), error = %e, "Node failed health check, marked down");
            }
        }
    }

    probe.map_err(|e| e.for_node(node.name()))
}

/// Shortest interval the monitor accepts between rounds.
pub const MIN_HEALTH_INTERVAL: Duration = Duration::from_millis(100);

/// Periodically health-checks every node in a registry.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    registry: Arc<NodeRegistry>,
    interval: Duration,
    max_jitter: Duration,
}

impl HealthMonitor {
    /// Probes run every `interval`, delayed by up to a tenth of it to spread load.
    /// Intervals below [`MIN_HEALTH_INTERVAL`] are raised to it.
    pub fn new(registry: Arc<NodeRegistry>, interval: Duration) -> Self {
        let interval = interval.max(MIN_HEALTH_INTERVAL);
        Self {
            registry,
            interval,
            max_jitter: interval / 10,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe all nodes concurrently. Returns each node's status afterwards, by name.
    pub async fn check_all(&self) -> Vec<(String, NodeStatus)> {
        let mut probes = JoinSet::new();
        for node in self.registry.all_nodes() {
            probes.spawn(async move {
                if let Err(e) = health_check(&node).await {
                    tracing::debug!(node = %node.name(), error = %e, "Health check failed");
                }
                (node.name().to_string(), node.status().await)
            });
        }

        let mut results = Vec::with_capacity(self.registry.len());
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(entry) => results.push(entry),
                Err(e) => tracing::error!(error = %e, "Health probe task failed"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Run until `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) {
        tracing::info!(
            nodes = self.registry.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Starting health monitor"
        );

        loop {
            let results = self.check_all().await;
            let down = results
                .iter()
                .filter(|(_, status)| *status == NodeStatus::Down)
                .count();
            tracing::debug!(checked = results.len(), down, "Health check round complete");

            let delay = self.interval + self.jitter();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Health monitor stopped");
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
