use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use telespect::collector::Collector;
use telespect::config::Config;
use telespect::export::HealthMetrics;
use telespect::producer;

/// Spectral telemetry pipeline: collector and producer.
#[derive(Parser)]
#[command(name = "telespect", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the collector: accept producer connections, maintain windows,
    /// answer with confidence statistics.
    Collector {
        /// Persist each computed spectrum to `{id}_spectrum.txt`,
        /// overriding the config file.
        #[arg(short = 'l', long)]
        persist: bool,
    },

    /// Run a producer: send synthetic readings on a fixed cadence.
    Producer {
        /// Persist each reply record to `{pid}_{id}_result.txt`,
        /// overriding the config file.
        #[arg(short = 'l', long)]
        persist: bool,
    },

    /// Print version information and exit.
    Version,
}

/// Build-time version info, injected via RUSTFLAGS or build.rs.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Command::Version = cli.command {
        println!("telespect {}", version::full());
        return Ok(());
    }

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    // Config is required for both run modes.
    let config_path = cli
        .config
        .context("--config is required (use --help for usage)")?;

    let mut cfg = Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting telespect",
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    match cli.command {
        Command::Collector { persist } => {
            cfg.collector.persist_spectra |= persist;
            rt.block_on(run_collector(cfg))
        }
        Command::Producer { persist } => {
            cfg.producer.persist_results |= persist;
            rt.block_on(run_producer(cfg))
        }
        Command::Version => unreachable!("handled above"),
    }
}

/// Spawn a task resolving when SIGINT or SIGTERM arrives.
fn shutdown_signal() -> tokio::sync::oneshot::Receiver<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }

        let _ = shutdown_tx.send(());
    });

    shutdown_rx
}

async fn run_collector(cfg: Config) -> Result<()> {
    let shutdown_rx = shutdown_signal();

    let health = Arc::new(
        HealthMetrics::new(&cfg.health.addr).context("creating health metrics")?,
    );
    health.start().await?;

    let mut collector = Collector::new(cfg.collector, Arc::clone(&health));
    collector.start().await?;

    // Wait for shutdown signal.
    let _ = shutdown_rx.await;

    // Graceful shutdown.
    collector.stop().await;
    health.stop().await?;

    tracing::info!("telespect collector stopped");

    Ok(())
}

async fn run_producer(cfg: Config) -> Result<()> {
    let shutdown_rx = shutdown_signal();

    let cancel = CancellationToken::new();
    let mut producer_task = tokio::spawn(producer::run(cfg.producer, cancel.clone()));

    tokio::select! {
        _ = shutdown_rx => {
            cancel.cancel();
            producer_task.await.context("joining producer task")??;
        }
        res = &mut producer_task => {
            res.context("joining producer task")??;
        }
    }

    tracing::info!("telespect producer stopped");

    Ok(())
}
