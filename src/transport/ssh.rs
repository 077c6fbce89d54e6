use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::TransportConfig;
use crate::job::Job;
use crate::node::ConnectionOptions;
use crate::report::RunReportItem;
use crate::transport::{ShellOutput, TransportError};

/// Exit status the OpenSSH client uses for its own errors.
const SSH_CLIENT_ERROR: i32 = 255;

/// Where and as whom a remote command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub key_file: String,
}

impl From<&ConnectionOptions> for SshTarget {
    fn from(options: &ConnectionOptions) -> Self {
        Self {
            host: options.ssh_host.clone(),
            user: options.ssh_user.clone(),
            key_file: options.ssh_private_key_file.clone(),
        }
    }
}

impl std::fmt::Display for SshTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

/// A remote shell session provider.
///
/// Implementations return [`TransportError::TransportFailed`] when the session cannot
/// be established and a [`ShellOutput`] once the remote command has run, whatever its
/// exit status.
#[async_trait]
pub trait RemoteShell: Send + Sync + std::fmt::Debug {
    async fn run(&self, target: &SshTarget, command: &str) -> Result<ShellOutput, TransportError>;
}

/// [`RemoteShell`] backed by the `ssh` binary in batch mode.
#[derive(Debug, Clone)]
pub struct OpenSshClient {
    program: String,
    connect_timeout_secs: u64,
}

impl OpenSshClient {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            program: config.ssh_program.clone(),
            connect_timeout_secs: config.ssh_connect_timeout_secs,
        }
    }

    fn args(&self, target: &SshTarget, command: &str) -> Vec<String> {
        vec![
            "-i".to_string(),
            target.key_file.clone(),
            "-l".to_string(),
            target.user.clone(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "--".to_string(),
            target.host.clone(),
            command.to_string(),
        ]
    }
}

#[async_trait]
impl RemoteShell for OpenSshClient {
    async fn run(&self, target: &SshTarget, command: &str) -> Result<ShellOutput, TransportError> {
        let output = Command::new(&self.program)
            .args(self.args(target, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                TransportError::TransportFailed(format!("cannot spawn {}: {}", self.program, e))
            })?;

        let output = ShellOutput::from(output);
        if output.exit_code == Some(SSH_CLIENT_ERROR) {
            let stderr = output.stderr.trim();
            return Err(TransportError::TransportFailed(if stderr.is_empty() {
                format!("ssh to {} failed", target)
            } else {
                stderr.to_string()
            }));
        }
        Ok(output)
    }
}

/// Runs commands on a remote node through a [`RemoteShell`].
#[derive(Debug, Clone)]
pub struct RemoteShellTransport {
    target: SshTarget,
    shell: Arc<dyn RemoteShell>,
    probe_timeout: Duration,
}

impl RemoteShellTransport {
    pub fn new(target: SshTarget, shell: Arc<dyn RemoteShell>, probe_timeout: Duration) -> Self {
        Self {
            target,
            shell,
            probe_timeout,
        }
    }

    /// Opens a session and runs `true`.
    pub async fn health_check(&self) -> Result<(), TransportError> {
        match tokio::time::timeout(self.probe_timeout, self.shell.run(&self.target, "true")).await
        {
            Err(_) => Err(TransportError::Unreachable(format!(
                "probe of {} timed out after {:?}",
                self.target, self.probe_timeout
            ))),
            Ok(Err(e)) => Err(TransportError::Unreachable(e.to_string())),
            Ok(Ok(output)) if !output.success() => Err(TransportError::Unreachable(format!(
                "probe of {} exited with {:?}",
                self.target, output.exit_code
            ))),
            Ok(Ok(_)) => Ok(()),
        }
    }

    pub async fn execute_command(
        &self,
        job: &Job,
        report: &mut RunReportItem,
    ) -> Result<(), TransportError> {
        tracing::info!(job = %job.name, target = %self.target, "Executing job over ssh");
        report.mark_started();

        let run = self.shell.run(&self.target, &job.command);
        let result = match job.timeout() {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    let reason = format!("Timed out after {}s", limit.as_secs());
                    report.mark_failed(None, None, reason.clone());
                    return Err(TransportError::ExecutionFailed {
                        exit_code: None,
                        reason,
                    });
                }
            },
            None => run.await,
        };

        match result {
            Ok(output) => output.record(report),
            Err(e) => {
                tracing::warn!(job = %job.name, target = %self.target, error = %e, "Remote session failed");
                report.mark_failed(None, None, e.to_string());
                Err(e)
            }
        }
    }
}
