//! biosync-jobs - physiological signal job service
//!
//! Accepts ECG/EEG uploads, runs the external analysis engine on them,
//! correlates pairs of analyses and serves the stored results.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use biosync_common::config::{CliOverrides, ServiceConfig};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use biosync_jobs::services::{JobStore, ProcessEngine};
use biosync_jobs::AppState;

/// Command-line arguments for biosync-jobs
#[derive(Parser, Debug)]
#[command(name = "biosync-jobs")]
#[command(about = "ECG/EEG analysis and correlation job service")]
#[command(version)]
struct Args {
    /// Path to TOML config file (overrides BIOSYNC_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder for uploads and results (overrides BIOSYNC_ROOT_FOLDER)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:5740 (overrides BIOSYNC_BIND)
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG wins; otherwise start at info and switch to the configured
    // level once the config is resolved
    let env_filter = EnvFilter::try_from_default_env().ok();
    let follow_config = env_filter.is_none();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting biosync-jobs v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );

    let args = Args::parse();
    let config = ServiceConfig::resolve(&CliOverrides {
        config_path: args.config,
        root_folder: args.root_folder,
        bind_address: args.bind,
    })
    .context("Failed to resolve configuration")?;

    if follow_config {
        match EnvFilter::try_new(&config.log_level) {
            Ok(level) => {
                if let Err(e) = filter_handle.reload(level) {
                    warn!("Failed to apply log level {}: {}", config.log_level, e);
                }
            }
            Err(e) => warn!("Ignoring invalid log level {:?}: {}", config.log_level, e),
        }
    }

    let store = Arc::new(
        JobStore::open(&config.root_folder)
            .await
            .context("Failed to initialize root folder")?,
    );
    info!("Root folder: {}", store.root().display());
    info!(
        "Engine: {} (timeout {}s, max {} concurrent)",
        config.engine.program,
        config.engine.timeout.as_secs(),
        config.engine.max_concurrent
    );

    let engine = Arc::new(ProcessEngine::new(config.engine.clone()));
    let state = AppState::new(
        store,
        engine,
        config.allowed_extensions.clone(),
        config.max_upload_bytes,
    );
    let app = biosync_jobs::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install terminate handler: {}", e);
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
