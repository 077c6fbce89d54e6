use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use distrun::config::{DispatchConfig, ServerConfig, TransportConfig};
use distrun::coordinator::{health_check, Dispatcher};
use distrun::job::{Job, JobRegistry};
use distrun::loader::{JobReader, NodeReader};
use distrun::node::{NodeRegistry, NodeSnapshot};
use distrun::report::RunReportItem;
use distrun::server::Server;
use distrun::shutdown::install_shutdown_handler;
use distrun::transport::TransportFactory;

#[derive(Parser, Debug)]
#[command(name = "distrun")]
#[command(version)]
#[command(about = "Run commands on a fleet of local and ssh-reachable nodes")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Load the configuration and serve the REST API
    Serve(ServeArgs),

    /// Load node declarations and print the resulting registry
    Nodes {
        #[command(flatten)]
        source: SourceArgs,

        /// Fill empty ssh host/user/key fields with defaults (preview only)
        #[arg(long)]
        with_defaults: bool,

        /// Probe every node before printing
        #[arg(long)]
        check: bool,

        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },

    /// Run one job on one node and print the report
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Directory of job declarations
        #[arg(long)]
        jobs_dir: PathBuf,

        /// Job name
        #[arg(long)]
        job: String,

        /// Node name
        #[arg(long)]
        node: String,

        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },
}

#[derive(Parser, Debug)]
struct SourceArgs {
    /// Directory of node declarations
    #[arg(long, default_value = "/etc/distrun/nodes")]
    nodes_dir: PathBuf,

    /// Timeout for a single health probe, in milliseconds
    #[arg(long, default_value = "5000")]
    probe_timeout_ms: u64,

    /// OpenSSH client binary
    #[arg(long, default_value = "ssh")]
    ssh_program: String,
}

impl SourceArgs {
    fn transport_config(&self) -> TransportConfig {
        TransportConfig::default()
            .with_probe_timeout_ms(self.probe_timeout_ms)
            .with_ssh_program(self.ssh_program.clone())
    }
}

#[derive(Parser, Debug)]
struct ServeArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Directory of job declarations
    #[arg(long)]
    jobs_dir: Option<PathBuf>,

    /// Port for the REST API
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Address to bind the REST API to
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Interval between health check rounds, in milliseconds
    #[arg(long, default_value = "30000", value_parser = clap::value_parser!(u64).range(100..))]
    health_interval_ms: u64,

    /// Maximum concurrently running jobs per node (unlimited when omitted)
    #[arg(long)]
    max_jobs_per_node: Option<u32>,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct RunOutput<'a> {
    success: bool,
    report: &'a RunReportItem,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_nodes(nodes: &[NodeSnapshot], output: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(nodes)?),
        OutputFormat::Table => {
            println!(
                "{:<20} {:<6} {:<6} {:<8} {:<28} ROLES",
                "NAME", "TYPE", "STATUS", "RUNNING", "TARGET"
            );
            for node in nodes {
                let opts = node.connection.options();
                let target = match node.connection.kind() {
                    distrun::node::ConnectionType::Local => "-".to_string(),
                    distrun::node::ConnectionType::Ssh => {
                        format!("{}@{}", opts.ssh_user, opts.ssh_host)
                    }
                };
                println!(
                    "{:<20} {:<6} {:<6} {:<8} {:<28} {}",
                    node.name,
                    node.connection.kind(),
                    node.status,
                    node.running_jobs,
                    target,
                    node.roles.join(",")
                );
            }
        }
    }
    Ok(())
}

fn print_report(
    report: &RunReportItem,
    success: bool,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&RunOutput { success, report })?
            );
        }
        OutputFormat::Table => {
            println!("Report:    {}", report.id);
            println!("Job:       {}", report.job);
            println!("Node:      {}", report.node);
            println!("Status:    {}", report.status);
            if let Some(code) = report.exit_code {
                println!("Exit code: {}", code);
            }
            if let Some(duration) = report.duration() {
                println!("Duration:  {}ms", duration.num_milliseconds());
            }
            if let Some(out) = &report.output {
                println!("Output:\n{}", out);
            }
            if let Some(err) = &report.error {
                println!("Error:\n{}", err);
            }
        }
    }
    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let listen_addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;

    let mut dispatch = DispatchConfig::default();
    if let Some(limit) = args.max_jobs_per_node {
        dispatch = dispatch.with_max_running_jobs(limit);
    }

    let config = ServerConfig {
        nodes_dir: args.source.nodes_dir.clone(),
        jobs_dir: args.jobs_dir,
        listen_addr,
        health_check_interval_ms: args.health_interval_ms,
        transport: args.source.transport_config(),
        dispatch,
    };

    tracing::info!(
        nodes_dir = %config.nodes_dir.display(),
        addr = %config.listen_addr,
        "Loading configuration"
    );

    let server = Server::load(config)?;
    let token = install_shutdown_handler();
    server.run(token).await?;
    Ok(())
}

async fn run_nodes(
    source: SourceArgs,
    with_defaults: bool,
    check: bool,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = NodeReader::new(TransportFactory::new(source.transport_config()));
    if with_defaults {
        reader = reader.with_ssh_defaults();
    }

    let mut registry = NodeRegistry::new();
    reader.read_from_directory(&source.nodes_dir, &mut registry)?;

    if check {
        for node in registry.all_nodes() {
            if let Err(e) = health_check(&node).await {
                tracing::warn!(node = %node.name(), error = %e, "Health check failed");
            }
        }
    }

    print_nodes(&registry.snapshots().await, &output)
}

async fn run_once(
    source: SourceArgs,
    jobs_dir: PathBuf,
    job_name: String,
    node_name: String,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut nodes = NodeRegistry::new();
    NodeReader::new(TransportFactory::new(source.transport_config()))
        .read_from_directory(&source.nodes_dir, &mut nodes)?;

    let mut jobs = JobRegistry::new();
    JobReader::new().read_from_directory(&jobs_dir, &mut jobs)?;

    let node = nodes.require(&node_name)?;
    let job: &Job = jobs
        .get(&job_name)
        .ok_or_else(|| distrun::DistrunError::JobNotFound(job_name.clone()))?;

    let dispatcher = Dispatcher::new(Arc::new(DispatchConfig::default()));
    let run = dispatcher.run_job(&node, job).await?;
    print_report(&run.report, run.is_success(), &output)?;

    run.result?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging();

    match args.command {
        Commands::Serve(serve_args) => {
            run_serve(serve_args).await?;
        }
        Commands::Nodes {
            source,
            with_defaults,
            check,
            output,
        } => {
            run_nodes(source, with_defaults, check, output).await?;
        }
        Commands::Run {
            source,
            jobs_dir,
            job,
            node,
            output,
        } => {
            run_once(source, jobs_dir, job, node, output).await?;
        }
    }

    Ok(())
}
