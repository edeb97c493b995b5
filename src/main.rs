//! Voxlog CLI - presence session tracker

use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxlog::config::expand_path;
use voxlog::{Config, Core};

#[derive(Parser, Debug)]
#[command(name = "voxlog")]
#[command(author = "Voxlog Team")]
#[command(version)]
#[command(about = "Voxlog - tracks how long voice channels are occupied", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.voxlog/config.toml")]
    config: PathBuf,

    /// Override server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override server host
    #[arg(long)]
    host: Option<String>,

    /// Write daily-rotated logs to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Initialize a new config file with defaults
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_path = expand_path(&args.config);

    // Handle --init flag
    if args.init {
        let _guard = init_logging(args.verbose, args.log_dir.as_deref());
        if config_path.exists() {
            tracing::warn!("Config file already exists: {}", config_path.display());
            return Ok(());
        }
        Config::create_default(&config_path)?;
        tracing::info!("Created default config at: {}", config_path.display());
        return Ok(());
    }

    // Load configuration
    let config_found = config_path.exists();
    let mut config = if config_found {
        Config::from_file(&config_path)?
    } else {
        Config::default()
    };
    config.apply_env_overrides()?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(log_dir) = args.log_dir {
        config.log_dir = Some(log_dir);
    }

    let log_dir = config.log_dir.as_deref().map(expand_path);
    let _guard = init_logging(args.verbose, log_dir.as_deref());

    if !config_found {
        tracing::warn!(
            "Config file not found at {}, using defaults and environment",
            config_path.display()
        );
    }

    let core = match Core::start(config).await {
        Ok(core) => core,
        Err(e) => {
            tracing::error!("Startup failed: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Monitoring {} scope(s)", core.managers().len());

    // Start API server (blocks until shutdown)
    core.start_api_server().await?;
    core.stop_watching().await?;

    Ok(())
}

/// Console logging plus optional daily-rotated file output
fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("voxlog={},tower_http=debug", log_level).into());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "voxlog.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}
