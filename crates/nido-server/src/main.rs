//! # nido-server
//!
//! Real-time messaging server for the Nido network.
//!
//! This binary provides:
//! - **WebSocket event protocol** for direct messages and discussion
//!   threads, with presence tracking and live delivery
//! - **SQLite-backed store** for users, conversations, threads and messages
//! - **Media ingestion** for attachments, stored on disk and served back
//!   over HTTP
//! - **REST API** (axum) for health checks and media downloads

mod api;
mod config;
mod error;
mod presence;
mod service;
mod ws;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use nido_media::{FsObjectStorage, MediaIngest};
use nido_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::presence::PresenceRegistry;
use crate::service::ChatService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,nido_server=debug")),
        )
        .init();

    info!("Starting Nido server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Store: explicit path from config, platform data directory otherwise.
    let database = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    if let Some(path) = database.path() {
        info!(path = %path.display(), "Database opened");
    }

    // Media storage (creates the directory if missing).
    let storage = Arc::new(
        FsObjectStorage::new(
            config.media_storage_path.clone(),
            config.max_media_size,
            config.media_public_base_url.clone(),
        )
        .await?,
    );

    let presence = Arc::new(PresenceRegistry::new());
    let service = Arc::new(ChatService::new(
        database,
        MediaIngest::new(storage.clone()),
        presence,
    ));

    let app_state = AppState {
        service,
        storage,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP/WebSocket server (blocks until shutdown)
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

    Ok(())
}
