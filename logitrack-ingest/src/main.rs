//! logitrack-ingest - Vessel position ingestion service
//!
//! Runs the ingestion pipeline (live AISStream feed or synthetic generator)
//! and a small health HTTP surface until Ctrl+C or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use logitrack_common::config::IngestConfig;
use logitrack_ingest::{build_router, AppState, IngestPipeline};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for logitrack-ingest
#[derive(Parser, Debug)]
#[command(name = "logitrack-ingest")]
#[command(about = "Vessel position ingestion and classification service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "LOGITRACK_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(short, long, env = "LOGITRACK_DATABASE")]
    database: Option<PathBuf>,

    /// Use the live position feed regardless of configuration
    #[arg(long)]
    live: bool,

    /// Health endpoint address, e.g. 127.0.0.1:5780
    #[arg(long, env = "LOGITRACK_HEALTH_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        IngestConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    if args.live {
        config.live_mode = true;
    }
    if let Some(bind) = args.bind {
        config.health_bind = bind;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate().context("Invalid configuration")?;

    info!("Starting logitrack-ingest v{}", env!("CARGO_PKG_VERSION"));

    let db_path = config.resolve_database_path(args.database.as_deref());
    info!("Database: {}", db_path.display());
    let pool = logitrack_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let cancel = CancellationToken::new();

    let pipeline = if config.enabled {
        info!(
            live_mode = config.live_mode,
            cycle_interval_secs = config.cycle_interval_secs,
            quota_per_cycle = config.classifier.quota_per_cycle,
            "Ingestion enabled"
        );
        Some(IngestPipeline::spawn(&config, pool.clone(), cancel.clone()))
    } else {
        info!("Ingestion disabled by configuration; serving health endpoints only");
        None
    };

    let state = AppState::new(pool.clone(), pipeline.as_ref().map(IngestPipeline::monitor));
    let app = build_router(state);

    let addr: SocketAddr = config
        .health_bind
        .parse()
        .with_context(|| format!("Invalid health_bind address '{}'", config.health_bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Health check: http://{}/health", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    if let Some(pipeline) = pipeline {
        pipeline.shutdown().await;
    }
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
