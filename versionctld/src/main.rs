mod api;
mod config;
mod error;
mod pipeline;
mod prober;
mod reconcile;
mod scheduler;
mod sources;
mod store;
mod store_manager;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::store::db::SnapshotDb;
use crate::store_manager::StoreHandle;

#[derive(Debug, Parser)]
#[command(name = "versionctld", version, about = "Cross-environment service version reconciliation")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(
        long,
        env = "VERSIONCTL_CONFIG",
        default_value = "/etc/versionctl/versionctld.toml"
    )]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "versionctld=debug"
    } else {
        "versionctld=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter))
        )
        .init();

    tracing::info!("Starting versionctld");

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    tracing::info!(
        "Loaded config from {}: {} environments, refresh every {}s",
        cli.config.display(),
        config.environments.len(),
        config.refresh.interval_secs
    );

    // Open SQLite database; a previously stored snapshot is served right away
    let db = SnapshotDb::open(&config.store.db_path)?;
    tracing::info!("Opened database at {:?}", config.store.db_path);

    let (store, snapshots) = StoreHandle::spawn(db)?;
    let pipeline = Arc::new(Pipeline::from_config(&config)?);

    let cancel = CancellationToken::new();

    let scheduler_cancel = cancel.clone();
    let interval = config.refresh.interval();
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler::run(pipeline, store, interval, scheduler_cancel).await {
            tracing::error!("Refresh scheduler error: {}", e);
        }
    });

    let app_state = api::routes::AppState {
        snapshots,
        title: Arc::from(config.api.title.as_str()),
    };
    let app = api::routes::router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();

    let _ = tokio::join!(scheduler_handle, server_handle);

    tracing::info!("Shutdown complete");
    Ok(())
}
