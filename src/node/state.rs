use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::ValidationError;
use crate::node::connection::Connection;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Up,
    Down,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            NodeStatus::Up => "up",
            NodeStatus::Down => "down",
        })
    }
}

/// Mutable per-node state, only reachable through the node's guard.
#[derive(Debug, Clone)]
pub(crate) struct NodeState {
    pub(crate) status: NodeStatus,
    pub(crate) running_jobs: u32,
    /// Bumped each time a dispatch marks the node down. A health check that sees it
    /// change while its probe is in flight discards the probe result.
    pub(crate) failure_epoch: u64,
    pub(crate) last_checked: Option<DateTime<Utc>>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            status: NodeStatus::Up,
            running_jobs: 0,
            failure_epoch: 0,
            last_checked: None,
        }
    }
}

impl NodeState {
    pub(crate) fn set_status(&mut self, status: NodeStatus) -> NodeStatus {
        let previous = self.status;
        self.status = status;
        previous
    }

    /// Record a transport failure seen by a dispatch and mark the node down.
    pub(crate) fn record_failure(&mut self) -> NodeStatus {
        self.failure_epoch += 1;
        self.set_status(NodeStatus::Down)
    }
}

/// A worker machine known to the registry.
#[derive(Debug)]
pub struct Node {
    name: String,
    roles: Vec<String>,
    connection: Connection,
    transport: Transport,
    state: RwLock<NodeState>,
}

impl Node {
    /// Build a node. The connection has already been validated; the name must not be empty.
    /// Duplicate roles are dropped, keeping first occurrences in order.
    pub fn new(
        name: impl Into<String>,
        roles: Vec<String>,
        connection: Connection,
        transport: Transport,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }

        let mut unique_roles: Vec<String> = Vec::with_capacity(roles.len());
        for role in roles {
            if !unique_roles.contains(&role) {
                unique_roles.push(role);
            }
        }

        Ok(Self {
            name,
            roles: unique_roles,
            connection,
            transport,
            state: RwLock::new(NodeState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// True when the node carries every role in `required`.
    pub fn has_roles(&self, required: &[String]) -> bool {
        required.iter().all(|r| self.roles.contains(r))
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub async fn status(&self) -> NodeStatus {
        self.state.read().await.status
    }

    pub async fn running_jobs(&self) -> u32 {
        self.state.read().await.running_jobs
    }

    pub async fn snapshot(&self) -> NodeSnapshot {
        let state = self.state.read().await;
        NodeSnapshot {
            name: self.name.clone(),
            roles: self.roles.clone(),
            connection: self.connection.clone(),
            status: state.status,
            running_jobs: state.running_jobs,
            last_checked: state.last_checked,
        }
    }

    pub(crate) fn state(&self) -> &RwLock<NodeState> {
        &self.state
    }
}

/// Point-in-time, read-only view of a node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub roles: Vec<String>,
    #[serde(flatten)]
    pub connection: Connection,
    pub status: NodeStatus,
    pub running_jobs: u32,
    pub last_checked: Option<DateTime<Utc>>,
}
