//! Execution transports: how a command physically reaches a node.
//!
//! Every node is bound to exactly one [`Transport`] chosen by its connection type:
//!
//! - [`LocalTransport`]: runs `sh -c <command>` on this machine
//! - [`RemoteShellTransport`]: runs the command through a [`RemoteShell`] session
//!
//! Both expose the same two operations, a liveness probe and command execution.
//! Transports only report outcomes; node status and job counts are owned by the
//! coordinator.

pub mod local;
pub mod ssh;

use std::sync::Arc;

use thiserror::Error;

use crate::config::TransportConfig;
use crate::error::DistrunError;
use crate::job::Job;
use crate::node::{Connection, ConnectionType};
use crate::report::RunReportItem;

pub use local::LocalTransport;
pub use ssh::{OpenSshClient, RemoteShell, RemoteShellTransport, SshTarget};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Liveness probe failed or timed out.
    #[error("{0}")]
    Unreachable(String),

    /// The command could not be started or the connection dropped.
    #[error("{0}")]
    TransportFailed(String),

    /// The command ran and reported failure.
    #[error("{reason}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        reason: String,
    },
}

impl TransportError {
    /// Attach the node name so the error can be surfaced to callers.
    pub fn for_node(self, node: &str) -> DistrunError {
        let node = node.to_string();
        match self {
            TransportError::Unreachable(reason) => DistrunError::Unreachable { node, reason },
            TransportError::TransportFailed(reason) => {
                DistrunError::TransportFailed { node, reason }
            }
            TransportError::ExecutionFailed { exit_code, reason } => DistrunError::ExecutionFailed {
                node,
                exit_code,
                reason,
            },
        }
    }
}

/// Captured result of a finished shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Write this output into `report` and classify it.
    pub fn record(self, report: &mut RunReportItem) -> Result<(), TransportError> {
        let output = if self.stdout.is_empty() {
            None
        } else {
            Some(self.stdout)
        };

        if self.exit_code == Some(0) {
            report.mark_succeeded(self.exit_code, output);
            return Ok(());
        }

        let reason = if self.stderr.trim().is_empty() {
            match self.exit_code {
                Some(code) => format!("Exit code: {}", code),
                None => "Terminated by signal".to_string(),
            }
        } else {
            self.stderr
        };
        report.mark_failed(self.exit_code, output, reason.clone());
        Err(TransportError::ExecutionFailed {
            exit_code: self.exit_code,
            reason,
        })
    }
}

impl From<std::process::Output> for ShellOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// The transport a node is bound to.
#[derive(Debug, Clone)]
pub enum Transport {
    Local(LocalTransport),
    RemoteShell(RemoteShellTransport),
}

impl Transport {
    pub fn kind(&self) -> ConnectionType {
        match self {
            Transport::Local(_) => ConnectionType::Local,
            Transport::RemoteShell(_) => ConnectionType::Ssh,
        }
    }

    /// Probe the node. Bounded by the transport's probe timeout.
    pub async fn health_check(&self) -> Result<(), TransportError> {
        match self {
            Transport::Local(t) => t.health_check().await,
            Transport::RemoteShell(t) => t.health_check().await,
        }
    }

    /// Run `job` and record the outcome in `report`.
    pub async fn execute_command(
        &self,
        job: &Job,
        report: &mut RunReportItem,
    ) -> Result<(), TransportError> {
        match self {
            Transport::Local(t) => t.execute_command(job, report).await,
            Transport::RemoteShell(t) => t.execute_command(job, report).await,
        }
    }
}

/// Builds the transport for a node from its connection.
#[derive(Debug, Clone)]
pub struct TransportFactory {
    config: TransportConfig,
    remote_shell: Arc<dyn RemoteShell>,
}

impl TransportFactory {
    /// Factory using the system OpenSSH client for remote nodes.
    pub fn new(config: TransportConfig) -> Self {
        let remote_shell = Arc::new(OpenSshClient::new(&config));
        Self {
            config,
            remote_shell,
        }
    }

    /// Factory using a caller-supplied remote shell implementation.
    pub fn with_remote_shell(config: TransportConfig, remote_shell: Arc<dyn RemoteShell>) -> Self {
        Self {
            config,
            remote_shell,
        }
    }

    pub fn bind(&self, connection: &Connection) -> Transport {
        match connection.kind() {
            ConnectionType::Local => Transport::Local(LocalTransport::new(&self.config)),
            ConnectionType::Ssh => Transport::RemoteShell(RemoteShellTransport::new(
                SshTarget::from(connection.options()),
                self.remote_shell.clone(),
                self.config.probe_timeout(),
            )),
        }
    }
}

impl Default for TransportFactory {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}
