use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Settings for the execution transports bound to each node.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for a single liveness probe, in milliseconds.
    pub probe_timeout_ms: u64,
    /// Shell used by the local transport (invoked as `<shell> -c <command>`).
    pub local_shell: String,
    /// OpenSSH client binary used by the remote-shell transport.
    pub ssh_program: String,
    /// Passed to ssh as `ConnectTimeout`, in seconds.
    pub ssh_connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 5000,
            local_shell: "sh".to_string(),
            ssh_program: "ssh".to_string(),
            ssh_connect_timeout_secs: 5,
        }
    }
}

impl TransportConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn with_probe_timeout_ms(mut self, probe_timeout_ms: u64) -> Self {
        self.probe_timeout_ms = probe_timeout_ms;
        self
    }

    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }
}

/// Per-node concurrency ceilings applied by the dispatcher.
///
/// `None` means unlimited. Overrides are keyed by node name and win over the default.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    pub max_running_jobs: Option<u32>,
    pub node_overrides: HashMap<String, u32>,
}

impl DispatchConfig {
    pub fn with_max_running_jobs(mut self, limit: u32) -> Self {
        self.max_running_jobs = Some(limit);
        self
    }

    pub fn with_node_limit(mut self, node: impl Into<String>, limit: u32) -> Self {
        self.node_overrides.insert(node.into(), limit);
        self
    }

    /// Effective ceiling for the named node.
    pub fn limit_for(&self, node: &str) -> Option<u32> {
        self.node_overrides
            .get(node)
            .copied()
            .or(self.max_running_jobs)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub nodes_dir: PathBuf,
    pub jobs_dir: Option<PathBuf>,
    pub listen_addr: SocketAddr,
    pub health_check_interval_ms: u64,
    pub transport: TransportConfig,
    pub dispatch: DispatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            nodes_dir: PathBuf::from("/etc/distrun/nodes"),
            jobs_dir: None,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            health_check_interval_ms: 30_000,
            transport: TransportConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(nodes_dir: impl Into<PathBuf>, listen_addr: SocketAddr) -> Self {
        Self {
            nodes_dir: nodes_dir.into(),
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_jobs_dir(mut self, jobs_dir: impl Into<PathBuf>) -> Self {
        self.jobs_dir = Some(jobs_dir.into());
        self
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}
