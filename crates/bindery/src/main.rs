//! # Bindery - Quire PDF workbench
//!
//! Merges and splits uploaded PDFs behind a per-session CAPTCHA, and keeps
//! the upload directory bounded with a retention sweep.
//!
//! ## Architecture
//! ```text
//! Browser → Bindery → lopdf → uploads/
//!              ↓
//!      Session store (Redis or memory)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod captcha;
mod config;
mod pdf;
mod routes;
mod session;
mod state;
mod sweeper;
mod upload;

use config::AppConfig;
use state::AppState;

/// Quire Bindery - CAPTCHA-guarded PDF merge/split
#[derive(Parser, Debug)]
#[command(name = "bindery")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/bindery.toml")]
    config: String,

    /// Redis URL for session state (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Upload directory (overrides config)
    #[arg(long, env = "UPLOAD_FOLDER")]
    upload_dir: Option<PathBuf>,

    /// Session signing key (overrides config)
    #[arg(long, env = "APP_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,

    /// Run one retention sweep over the upload directory and exit
    #[arg(long)]
    sweep_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    let config = AppConfig::load(&args.config, &args)?;

    if args.sweep_once {
        return sweep_once(&config).await;
    }

    info!("📚 Starting Quire Bindery v{}", env!("CARGO_PKG_VERSION"));
    config.validate()?;
    info!("📋 Configuration loaded from {}", args.config);

    tokio::fs::create_dir_all(&config.upload.dir)
        .await
        .with_context(|| format!("Failed to create upload directory {:?}", config.upload.dir))?;

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Periodic sweeps on top of the per-page-view one
    if config.cleanup.interval_secs > 0 {
        tokio::spawn(sweeper::sweeper_worker(
            config.upload.dir.clone(),
            Duration::from_secs(config.cleanup.retention_secs),
            Duration::from_secs(config.cleanup.interval_secs),
            shutdown_tx.subscribe(),
        ));
    }

    let listen_addr = config.listen_addr.clone();
    let state = AppState::new(config).await?;
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {listen_addr}"))?;
    info!("🚀 Bindery listening on {}", listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("👋 Bindery shutdown complete");
    Ok(())
}

/// One-shot sweep for cron-style use
async fn sweep_once(config: &AppConfig) -> Result<()> {
    let dir = config.upload.dir.clone();
    let retention = Duration::from_secs(config.cleanup.retention_secs);

    match sweeper::run_sweep(dir.clone(), retention).await {
        Some(report) => info!(
            dir = ?dir,
            scanned = report.scanned,
            removed = report.removed,
            failed = report.failed,
            "Sweep complete"
        ),
        None => info!(dir = ?dir, "Upload folder does not exist, nothing to sweep"),
    }
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
