use std::sync::Arc;

use crate::config::DispatchConfig;
use crate::error::{DistrunError, Result};
use crate::job::Job;
use crate::node::{Node, NodeStatus};
use crate::report::{ReportStore, RunReportItem};

/// Decides how many jobs a node may run at once.
pub trait DispatchPolicy: Send + Sync {
    /// `None` means no ceiling.
    fn max_running_jobs(&self, node: &Node) -> Option<u32>;
}

impl DispatchPolicy for DispatchConfig {
    fn max_running_jobs(&self, node: &Node) -> Option<u32> {
        self.limit_for(node.name())
    }
}

/// Result of [`Dispatcher::run_job`]: the finished report and how the execution went.
#[derive(Debug)]
pub struct JobRun {
    pub report: RunReportItem,
    pub result: Result<()>,
}

impl JobRun {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Dispatches jobs to nodes while keeping each node's running-job count and status
/// consistent.
#[derive(Clone)]
pub struct Dispatcher {
    policy: Arc<dyn DispatchPolicy>,
    reports: Option<Arc<dyn ReportStore>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(DispatchConfig::default()))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("has_report_store", &self.reports.is_some())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(policy: Arc<dyn DispatchPolicy>) -> Self {
        Self {
            policy,
            reports: None,
        }
    }

    pub fn with_report_store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.reports = Some(store);
        self
    }

    /// Reserve a slot on `node`. Returns the new running-job count.
    ///
    /// Fails with [`DistrunError::NodeBusyLimitExceeded`] when the policy's ceiling is
    /// already reached. Never changes the node's status.
    pub async fn begin_dispatch(&self, node: &Node) -> Result<u32> {
        let limit = self.policy.max_running_jobs(node);
        let mut state = node.state().write().await;
        if let Some(limit) = limit {
            if state.running_jobs >= limit {
                tracing::debug!(node = %node.name(), limit, "Dispatch rejected, node at capacity");
                return Err(DistrunError::NodeBusyLimitExceeded {
                    node: node.name().to_string(),
                    limit,
                });
            }
        }
        state.running_jobs += 1;
        Ok(state.running_jobs)
    }

    /// Release a slot taken by [`begin_dispatch`](Self::begin_dispatch). Returns the new
    /// running-job count.
    pub async fn end_dispatch(&self, node: &Node) -> u32 {
        release(node).await
    }

    /// Run `job` on `node`, writing the outcome into `report`.
    ///
    /// A transport failure marks the node `down`; a failing command leaves its status
    /// alone. The slot taken at the start is released on every path. The execution runs
    /// on its own task, so dropping this future does not cancel the command or leak the
    /// slot.
    pub async fn dispatch(
        &self,
        node: &Arc<Node>,
        job: &Job,
        report: &mut RunReportItem,
    ) -> Result<()> {
        let running = self.begin_dispatch(node).await?;
        tracing::debug!(node = %node.name(), job = %job.name, running, "Dispatch started");

        let task_node = node.clone();
        let task_job = job.clone();
        let task_report = report.clone();

        let handle = tokio::spawn(async move {
            let exec_node = task_node.clone();
            let execution = tokio::spawn(async move {
                let mut report = task_report;
                let result = exec_node
                    .transport()
                    .execute_command(&task_job, &mut report)
                    .await;
                (result, report)
            })
            .await;

            let outcome = match execution {
                Ok((Ok(()), report)) => (Ok(()), Some(report)),
                Ok((Err(e), report)) => {
                    let err = e.for_node(task_node.name());
                    if err.is_transport_failure() {
                        mark_down(&task_node, &err).await;
                    }
                    (Err(err), Some(report))
                }
                Err(e) => (
                    Err(DistrunError::Internal(format!(
                        "execution on {} aborted: {}",
                        task_node.name(),
                        e
                    ))),
                    None,
                ),
            };

            let running = release(&task_node).await;
            tracing::debug!(node = %task_node.name(), running, "Dispatch finished");
            outcome
        });

        match handle.await {
            Ok((result, Some(finished))) => {
                *report = finished;
                result
            }
            Ok((result, None)) => {
                if let Err(e) = &result {
                    report.mark_failed(None, None, e.to_string());
                }
                result
            }
            Err(e) => Err(DistrunError::Internal(format!("dispatch task failed: {}", e))),
        }
    }

    /// Dispatch `job` to `node` with a fresh report and persist the finished report.
    ///
    /// Fails without running anything when the node lacks a role the job requires or
    /// is at its concurrency ceiling. Otherwise the execution outcome is carried in
    /// [`JobRun::result`].
    pub async fn run_job(&self, node: &Arc<Node>, job: &Job) -> Result<JobRun> {
        if let Some(role) = job.roles.iter().find(|r| !node.roles().contains(r)) {
            return Err(DistrunError::MissingRole {
                node: node.name().to_string(),
                role: role.clone(),
            });
        }

        let mut report = RunReportItem::new(&job.name, node.name());
        let result = self.dispatch(node, job, &mut report).await;
        if let Err(e @ DistrunError::NodeBusyLimitExceeded { .. }) = result {
            return Err(e);
        }

        match &result {
            Ok(()) => tracing::info!(node = %node.name(), job = %job.name, "Job succeeded"),
            Err(e) => tracing::warn!(node = %node.name(), job = %job.name, error = %e, "Job failed"),
        }

        if let Some(store) = &self.reports {
            store.persist(report.clone()).await?;
        }

        Ok(JobRun { report, result })
    }
}

async fn release(node: &Node) -> u32 {
    let mut state = node.state().write().await;
    if state.running_jobs == 0 {
        tracing::warn!(node = %node.name(), "Dispatch released with no running jobs");
    } else {
        state.running_jobs -= 1;
    }
    state.running_jobs
}

async fn mark_down(node: &Node, cause: &DistrunError) {
    let previous = node.state().write().await.record_failure();
    if previous == NodeStatus::Up {
        tracing::warn!(node = %node.name(), error = %cause, "Node marked down after transport failure");
    }
}
