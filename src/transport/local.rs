use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::TransportConfig;
use crate::job::Job;
use crate::report::RunReportItem;
use crate::transport::{ShellOutput, TransportError};

/// Runs commands in a shell on the machine hosting this process.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    shell: String,
    probe_timeout: Duration,
}

impl LocalTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            shell: config.local_shell.clone(),
            probe_timeout: config.probe_timeout(),
        }
    }

    /// Checks that the shell can be spawned and exits cleanly.
    pub async fn health_check(&self) -> Result<(), TransportError> {
        let probe = tokio::time::timeout(self.probe_timeout, self.spawn("true")).await;
        match probe {
            Err(_) => Err(TransportError::Unreachable(format!(
                "probe timed out after {:?}",
                self.probe_timeout
            ))),
            Ok(Err(e)) => Err(TransportError::Unreachable(format!(
                "cannot spawn {}: {}",
                self.shell, e
            ))),
            Ok(Ok(output)) if !output.status.success() => Err(TransportError::Unreachable(
                format!("probe exited with {:?}", output.status.code()),
            )),
            Ok(Ok(_)) => Ok(()),
        }
    }

    pub async fn execute_command(
        &self,
        job: &Job,
        report: &mut RunReportItem,
    ) -> Result<(), TransportError> {
        tracing::info!(job = %job.name, command = %job.command, "Executing job locally");
        report.mark_started();

        let result = match job.timeout() {
            Some(limit) => match tokio::time::timeout(limit, self.spawn(&job.command)).await {
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
            None => self.spawn(&job.command).await,
        };

        match result {
            Ok(output) => ShellOutput::from(output).record(report),
            Err(e) => {
                tracing::error!(job = %job.name, error = %e, "Job could not be started");
                let reason = format!("cannot spawn {}: {}", self.shell, e);
                report.mark_failed(None, None, reason.clone());
                Err(TransportError::TransportFailed(reason))
            }
        }
    }

    async fn spawn(&self, command: &str) -> std::io::Result<std::process::Output> {
        Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
    }
}
