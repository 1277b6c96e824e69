//! # chronicle-server
//!
//! Control service for Chronicle.
//!
//! This binary provides:
//! - **Export** of a channel (or a whole forum) to record files in the
//!   archive directory
//! - **Import** of an archive into a destination channel as a background
//!   run, with progress, cancellation and crash checkpoints
//! - **Failed-batch management** for runs that stopped on an unrecoverable
//!   error
//! - **REST API** (axum) exposing all of the above

mod api;
mod config;
mod error;
mod runs;

use std::sync::Arc;
use std::time::Duration;

use chronicle_core::ReplayEngine;
use chronicle_net::{ApiClient, DeliveryPacer, DiscordClient};
use chronicle_store::RecordStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::runs::RunRegistry;

/// Time given to webhook cleanup after runs are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,chronicle_server=debug,chronicle_core=debug")
        }))
        .init();

    info!("Starting Chronicle server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    let Some(token) = config.discord_token.clone() else {
        anyhow::bail!("DISCORD_TOKEN is not set");
    };

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let store = match &config.archive_dir {
        Some(dir) => RecordStore::new(dir.clone())?,
        None => RecordStore::default_location()?,
    };
    info!(dir = %store.dir().display(), "Archive directory ready");
    if let Some(info) = store.read_failed_batch_info()? {
        tracing::warn!(
            source = %info.source,
            remaining = info.remaining,
            "A failed batch is outstanding; imports are blocked until it is resumed or discarded"
        );
    }

    let client = Arc::new(DiscordClient::new(
        ApiClient::new(config.api_base.clone(), token),
        DeliveryPacer::new(config.delivery_rate, config.delivery_burst),
        config.webhook_name.clone(),
    ));
    let engine = ReplayEngine::new(client.clone(), client.clone(), store);
    let runs = RunRegistry::new();

    let app_state = AppState {
        source: client,
        engine,
        runs: runs.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // -----------------------------------------------------------------------
    // 5. Abort active runs; their drop guards write in-progress checkpoints
    // -----------------------------------------------------------------------
    let aborted = runs.abort_all().await;
    if aborted > 0 {
        info!(aborted, "Aborted active runs");
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    }

    Ok(())
}
