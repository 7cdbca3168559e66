//! Command-line interface for kube-load-simulator
//!
//! # Usage Examples
//!
//! ```bash
//! # Default run: 10 runners for 10 seconds against the current context
//! kube-load-simulator
//!
//! # Larger run against a specific cluster
//! kube-load-simulator --kubeconfig ~/.kube/hub.kubeconfig --context hub \
//!   --concurrent 100 --duration 10m --interval 20
//!
//! # Remove leftovers of an interrupted run
//! kube-load-simulator --concurrent 100 --clean
//!
//! # Watch runner phases while the run is going
//! kube-load-simulator --diagnostics &
//! curl localhost:6060/runners
//! ```

use anyhow::Context;
use clap::{ArgAction, Parser};
use kube_load_simulator::config::parse_duration;
use kube_load_simulator::{diagnostics, ClusterOpts};
use loadtest_kube_client::{ConnectParams, Connector, HttpConnector, MemoryCluster, MemoryConnector};
use loadtest_runner::{PoolConfig, RunnerPool, StopReason, Template};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kube-load-simulator")]
#[command(about = "Generate concurrent create/update/delete load against a Kubernetes API server")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    cluster: ClusterOpts,

    /// Number of concurrent runners
    #[arg(long, default_value_t = loadtest_runner::DEFAULT_WORKERS)]
    concurrent: usize,

    /// How long to generate load (e.g. "300", "30s", "5m", "1h")
    #[arg(long, default_value = "10")]
    duration: String,

    /// Tick interval in milliseconds
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Only delete the namespaces and objects a previous run created
    #[arg(long)]
    clean: bool,

    /// Patch a counter label on every tick (--update=false to disable)
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    update: bool,

    /// Path to the resource template
    #[arg(long, default_value = "./testdata/manifestwork-template.yaml")]
    template: PathBuf,

    /// Serve runner phases over HTTP
    #[arg(long)]
    diagnostics: bool,

    /// Address of the diagnostics endpoint
    #[arg(long, default_value = "localhost:6060")]
    diagnostics_listen: String,

    /// Run against an in-memory cluster instead of a real API server
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let template = Template::from_file(&cli.template)
        .with_context(|| format!("Failed to load template from {:?}", cli.template))?;
    let duration = parse_duration(&cli.duration)
        .with_context(|| format!("Invalid --duration {:?}", cli.duration))?;

    let config = PoolConfig::new()
        .with_workers(cli.concurrent)
        .with_interval(Duration::from_millis(cli.interval))
        .with_duration(duration)
        .with_clean_only(cli.clean)
        .with_update(cli.update);

    let diagnostics_listen = cli.diagnostics.then(|| cli.diagnostics_listen.clone());

    if cli.dry_run {
        tracing::info!("[DRY-RUN] Using an in-memory cluster, no API server will be contacted");
        let cluster = MemoryCluster::new();
        run_pool(
            config,
            template,
            MemoryConnector::new(cluster.clone()),
            diagnostics_listen,
        )
        .await;
        tracing::info!("[DRY-RUN] Cluster activity: {:?}", cluster.stats());
    } else {
        let params = ConnectParams::from(&cli.cluster);
        run_pool(
            config,
            template,
            HttpConnector::new(params),
            diagnostics_listen,
        )
        .await;
    }

    Ok(())
}

async fn run_pool<C: Connector + 'static>(
    config: PoolConfig,
    template: Template,
    connector: C,
    diagnostics_listen: Option<String>,
) {
    let pool = RunnerPool::new(config, template, connector);

    if let Some(listen) = diagnostics_listen {
        diagnostics::spawn(listen, pool.phases());
    }

    match pool.run(shutdown_signal()).await {
        StopReason::Deadline(duration) => {
            tracing::info!("Run of {:?} complete, waiting for cleanup", duration)
        }
        StopReason::Interrupted => tracing::info!("Waiting for cleanup after interrupt"),
        StopReason::CleanOnly => tracing::info!("Clean-only run dispatched"),
        StopReason::AlreadyStarted => {}
    }
    pool.wait().await;
}

/// Completes on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received interrupt signal (Ctrl+C)"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
