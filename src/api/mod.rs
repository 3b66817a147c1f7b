//! REST API server for tapedeck.
//!
//! Provides HTTP endpoints for:
//! - Transport control (record, play, pause, resume, seek, stop)
//! - Transport status polling
//! - Recordings listing

pub mod error;
pub mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

use crate::engine::TransportController;

pub use routes::recordings::RecordingsState;
pub use routes::transport::{StartRequest, TransportApiState};

pub struct ApiServer {
    port: u16,
    transport_state: TransportApiState,
    recordings_state: RecordingsState,
}

impl ApiServer {
    pub fn new(controller: Arc<TransportController>, recordings_dir: PathBuf, port: u16) -> Self {
        Self {
            port,
            transport_state: TransportApiState { controller },
            recordings_state: RecordingsState { recordings_dir },
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            // Root and version endpoints
            .route("/", get(status))
            .route("/version", get(version))
            // Transport control endpoints
            .merge(routes::transport::router(self.transport_state))
            .merge(routes::recordings::router(self.recordings_state))
            .layer(ServiceBuilder::new());

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /              - Service info");
        info!("  GET  /version       - Get version info");
        info!("  POST /record        - Start recording");
        info!("  POST /record/toggle - Toggle recording");
        info!("  POST /play          - Start playback (last recording by default)");
        info!("  POST /play/toggle   - Play/pause toggle");
        info!("  POST /pause         - Pause playback");
        info!("  POST /resume        - Resume playback");
        info!("  POST /seek          - Seek within playback");
        info!("  POST /stop          - Stop and return to idle");
        info!("  GET  /status        - Get transport status");
        info!("  GET  /recordings    - List recorded files");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "tapedeck",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "tapedeck"
    }))
}
