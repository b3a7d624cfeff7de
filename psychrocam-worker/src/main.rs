use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use psychrocam_connectors::HaSourceFactory;
use psychrocam_core::TypedCache;
use psychrocam_worker::{
    CommandRenderer, CycleOutcome, FileConfigStorage, RefreshOrchestrator, SqliteStore,
};

/// Psychrocam refresh worker
#[derive(Parser, Debug, Clone)]
#[command(name = "psychrocam-worker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Shared cache database
    #[arg(long, env = "PSYCHROCAM_STORE", default_value = "psychrocam.sqlite")]
    store: PathBuf,

    /// Directory with default and custom YAML configuration
    #[arg(long, env = "PSYCHROCAM_CONFIG_DIR", default_value = "static")]
    config_dir: PathBuf,

    /// Chart renderer command line; gets the context as JSON on stdin
    #[arg(long, env = "PSYCHROCAM_RENDERER", default_value = "psychrochart-render")]
    renderer: String,

    /// Seconds a crashed cycle may hold the refresh lease
    #[arg(long, env = "PSYCHROCAM_LEASE_SECS", default_value_t = 300)]
    lease_secs: u64,

    /// Remote request timeout in seconds
    #[arg(long, env = "PSYCHROCAM_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// Render timeout in seconds
    #[arg(long, env = "PSYCHROCAM_RENDER_TIMEOUT_SECS", default_value_t = 60)]
    render_timeout_secs: u64,

    /// Debug level (0=warn, 1=info, 2=debug, 3=trace)
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value = "0")]
    debug: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Reset the cache and poll on schedule until interrupted
    #[default]
    Run,
    /// Run one forced refresh cycle
    Refresh,
    /// Clear the cache and reload configuration
    Reset,
}

fn orchestrator(cli: &Cli) -> Result<RefreshOrchestrator> {
    let store = SqliteStore::open(&cli.store)
        .with_context(|| format!("opening shared store {}", cli.store.display()))?;
    let Some(renderer) = CommandRenderer::from_command_line(&cli.renderer) else {
        bail!("empty renderer command");
    };
    let renderer = renderer.timeout(Duration::from_secs(cli.render_timeout_secs));

    Ok(RefreshOrchestrator::new(
        TypedCache::new(Arc::new(store)),
        Arc::new(FileConfigStorage::new(&cli.config_dir)),
        Arc::new(HaSourceFactory::new(Duration::from_secs(cli.timeout_secs))),
        Arc::new(renderer),
    )
    .with_lease(Duration::from_secs(cli.lease_secs)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    warn!("Starting psychrocam-worker v{}", env!("CARGO_PKG_VERSION"));
    let orchestrator = orchestrator(&cli)?;

    match cli.command.unwrap_or_default() {
        Command::Run => {
            orchestrator.force_full_reset().context("initial reset")?;
            orchestrator
                .run_scheduled(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Cannot listen for Ctrl-C: {e}");
                        std::future::pending::<()>().await;
                    }
                })
                .await;
        }
        Command::Refresh => match orchestrator.force_refresh_cycle().await {
            CycleOutcome::Failed { stage, reason } => bail!("refresh failed at {stage}: {reason}"),
            outcome => info!("{outcome:?}"),
        },
        Command::Reset => {
            orchestrator.force_full_reset().context("cache reset")?;
            info!("Cache reset");
        }
    }
    Ok(())
}
