use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{run_api, ApiState};
use crate::config::ServerConfig;
use crate::coordinator::{Dispatcher, HealthMonitor};
use crate::error::Result;
use crate::job::JobRegistry;
use crate::loader::{JobReader, NodeReader};
use crate::node::NodeRegistry;
use crate::report::{InMemoryReportStore, ReportStore};
use crate::transport::TransportFactory;

/// Owns the loaded registries and wires the long-running subsystems together.
pub struct Server {
    pub config: ServerConfig,
    pub nodes: Arc<NodeRegistry>,
    pub jobs: Arc<JobRegistry>,
    pub reports: Arc<dyn ReportStore>,
    pub dispatcher: Dispatcher,
}

impl Server {
    /// Load nodes, then jobs, from the configured directories.
    ///
    /// # Errors
    ///
    /// Any declaration that fails to parse or validate aborts startup. The partially
    /// filled registries are dropped with the error.
    pub fn load(config: ServerConfig) -> Result<Self> {
        let factory = TransportFactory::new(config.transport.clone());
        Self::load_with(config, factory)
    }

    /// Like [`load`](Self::load), with a caller-supplied transport factory.
    pub fn load_with(config: ServerConfig, factory: TransportFactory) -> Result<Self> {
        let mut nodes = NodeRegistry::new();
        NodeReader::new(factory).read_from_directory(&config.nodes_dir, &mut nodes)?;

        let mut jobs = JobRegistry::new();
        if let Some(jobs_dir) = &config.jobs_dir {
            JobReader::new().read_from_directory(jobs_dir, &mut jobs)?;
        }

        let reports: Arc<dyn ReportStore> = Arc::new(InMemoryReportStore::new());
        let dispatcher = Dispatcher::new(Arc::new(config.dispatch.clone()))
            .with_report_store(reports.clone());

        Ok(Self {
            config,
            nodes: Arc::new(nodes),
            jobs: Arc::new(jobs),
            reports,
            dispatcher,
        })
    }

    /// Run the health monitor and the REST API until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the API listener cannot be bound.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        tracing::info!(
            nodes = self.nodes.len(),
            jobs = self.jobs.len(),
            addr = %self.config.listen_addr,
            "Starting distrun server"
        );

        let monitor = HealthMonitor::new(self.nodes.clone(), self.config.health_check_interval());
        let monitor_token = token.clone();
        let monitor_handle = tokio::spawn(async move {
            monitor.run(monitor_token).await;
        });

        let state = ApiState {
            nodes: self.nodes.clone(),
            jobs: self.jobs.clone(),
            reports: self.reports.clone(),
        };
        let served = run_api(self.config.listen_addr, state, token.clone()).await;

        // The API only returns early on error; stop the monitor either way.
        token.cancel();
        if let Err(e) = monitor_handle.await {
            tracing::error!(error = %e, "Health monitor task failed");
        }

        served?;
        tracing::info!("Server stopped");
        Ok(())
    }
}
