use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use nido_media::FsObjectStorage;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::service::ChatService;
use crate::ws::ws_upgrade;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
    pub storage: Arc<FsObjectStorage>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/ws", get(ws_upgrade))
        .route("/media/:name", get(media_download))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    max_media_size: usize,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        max_media_size: state.config.max_media_size,
    })
}

/// Serve a stored media object back by its public name.  The stored names
/// are uuid-based, so the extension is the only hint for the content type.
async fn media_download(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let data = state
        .storage
        .read_object(&name)
        .await
        .map_err(|e| ServerError::NotFound(e.to_string()))?;

    let content_type = content_type_for(&name);
    Ok(([(header::CONTENT_TYPE, content_type)], data))
}

fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next().unwrap_or("") {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_from_extension() {
        assert_eq!(content_type_for("abc.png"), "image/png");
        assert_eq!(content_type_for("abc.mp4"), "video/mp4");
        assert_eq!(content_type_for("abc"), "application/octet-stream");
        assert_eq!(content_type_for("abc.weird"), "application/octet-stream");
    }
}
