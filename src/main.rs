// Main binary that starts the orchestrator
use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

use krane_runner::ProcessRunner;
use krane_server::jobs::TcpProbe;
use krane_server::{recover_cluster_tasks, Config, LogNotifier, Server};
use krane_store::MemoryStore;

const DEFAULT_CONFIG: &str = "/etc/krane/krane.toml";

#[derive(Parser)]
#[command(
    name = "krane",
    version,
    about = "Kubernetes cluster lifecycle manager for bare infrastructure"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, env = "KRANE_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator: crash recovery, supervisor, background jobs
    Serve,
    /// Run the crash-recovery reconciliation against a quiescent store
    /// and exit
    Recover,
    /// Show configuration status
    Status,
}

fn init_tracing() {
    registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve) => serve(&cli.config).await,
        Some(Commands::Recover) => recover(&cli.config).await,
        Some(Commands::Status) => {
            print_status(&cli.config);
            Ok(())
        }
        None => {
            // default invocation: status summary plus usage
            print_status(&cli.config);
            println!();
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

fn print_status(config_path: &Path) {
    if config_path.exists() {
        println!("Status: Configured");
    } else {
        println!("Status: Not configured (run `krane serve` to start with defaults)");
    }
    println!("Config: {}", config_path.display());
}

async fn serve(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    info!(config = %config_path.display(), "starting krane");

    // the relational store is an external collaborator; the in-memory
    // reference store backs standalone runs
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(ProcessRunner::new(&config.runner_program));
    let notifier = Arc::new(LogNotifier);
    let probe = Arc::new(TcpProbe::default());

    let server = Server::bootstrap(config, store, runner, notifier, probe).await?;
    server.run_until_shutdown().await
}

async fn recover(config_path: &Path) -> Result<()> {
    // config is validated even though the reference store needs none of it
    Config::load(config_path)?;
    info!(config = %config_path.display(), "running crash recovery");

    let store = MemoryStore::new();
    let report = recover_cluster_tasks(&store).await?;
    println!(
        "Recovered: {} clusters, {} task logs, {} details, {} hosts, {} nodes, {} provisioners",
        report.clusters,
        report.task_logs,
        report.details,
        report.hosts,
        report.nodes,
        report.provisioners
    );
    Ok(())
}
