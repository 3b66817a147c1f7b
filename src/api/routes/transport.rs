//! Transport control endpoints.
//!
//! Provides HTTP endpoints for:
//! - Starting/toggling recording (POST /record, POST /record/toggle)
//! - Starting/toggling playback (POST /play, POST /play/toggle)
//! - Pause/resume/seek/stop (POST /pause, /resume, /seek, /stop)
//! - Transport status (GET /status)

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::ApiResult;
use crate::engine::{PlayToggle, RecordToggle, TransportController, TransportState};

#[derive(Clone)]
pub struct TransportApiState {
    pub controller: Arc<TransportController>,
}

/// Optional request body for record/play endpoints.
#[derive(Debug, Default, serde::Deserialize)]
pub struct StartRequest {
    pub path: Option<PathBuf>,
}

#[derive(Debug, serde::Deserialize)]
pub struct SeekRequest {
    pub position_seconds: f64,
}

pub fn router(state: TransportApiState) -> Router {
    Router::new()
        .route("/record", post(start_recording))
        .route("/record/toggle", post(toggle_record))
        .route("/play", post(start_playback))
        .route("/play/toggle", post(toggle_play))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/seek", post(seek))
        .route("/stop", post(stop))
        .route("/status", get(status))
        .with_state(state)
}

async fn start_recording(
    State(state): State<TransportApiState>,
    body: Option<Json<StartRequest>>,
) -> ApiResult<Json<Value>> {
    let path = body.and_then(|Json(req)| req.path);
    info!("Record command received via API");

    let session = state.controller.start_recording(path).await?;
    Ok(Json(json!({
        "success": true,
        "session_id": session.id.to_string(),
        "path": session.path,
        "message": "Recording started",
    })))
}

async fn toggle_record(State(state): State<TransportApiState>) -> ApiResult<Json<Value>> {
    info!("Record toggle received via API");

    match state.controller.toggle_record().await? {
        RecordToggle::Started(session) => Ok(Json(json!({
            "success": true,
            "state": TransportState::Recording.as_str(),
            "session_id": session.id.to_string(),
            "path": session.path,
        }))),
        RecordToggle::Stopped(finalized) => Ok(Json(json!({
            "success": true,
            "state": TransportState::Idle.as_str(),
            "finalized": finalized,
        }))),
    }
}

async fn start_playback(
    State(state): State<TransportApiState>,
    body: Option<Json<StartRequest>>,
) -> ApiResult<Json<Value>> {
    let path = body.and_then(|Json(req)| req.path);
    info!("Play command received via API");

    let session = state.controller.start_playback(path).await?;
    Ok(Json(json!({
        "success": true,
        "session_id": session.id.to_string(),
        "path": session.path,
        "message": "Playback started",
    })))
}

async fn toggle_play(
    State(state): State<TransportApiState>,
    body: Option<Json<StartRequest>>,
) -> ApiResult<Json<Value>> {
    let path = body.and_then(|Json(req)| req.path);
    info!("Play toggle received via API");

    let outcome = match state.controller.toggle_play(path).await? {
        PlayToggle::Started(session) => json!({
            "success": true,
            "state": TransportState::Playing.as_str(),
            "session_id": session.id.to_string(),
            "path": session.path,
        }),
        PlayToggle::Paused => json!({
            "success": true,
            "state": TransportState::Paused.as_str(),
        }),
        PlayToggle::Resumed => json!({
            "success": true,
            "state": TransportState::Playing.as_str(),
        }),
    };
    Ok(Json(outcome))
}

async fn pause(State(state): State<TransportApiState>) -> ApiResult<Json<Value>> {
    state.controller.pause().await?;
    Ok(Json(json!({
        "success": true,
        "state": state.controller.current_state().as_str(),
    })))
}

async fn resume(State(state): State<TransportApiState>) -> ApiResult<Json<Value>> {
    state.controller.resume().await?;
    Ok(Json(json!({
        "success": true,
        "state": state.controller.current_state().as_str(),
    })))
}

async fn seek(
    State(state): State<TransportApiState>,
    Json(req): Json<SeekRequest>,
) -> ApiResult<Json<Value>> {
    state.controller.seek(req.position_seconds).await?;
    Ok(Json(json!({
        "success": true,
        "position_seconds": req.position_seconds,
    })))
}

async fn stop(State(state): State<TransportApiState>) -> ApiResult<Json<Value>> {
    info!("Stop command received via API");

    let finalized = state.controller.stop().await;
    Ok(Json(json!({
        "success": true,
        "state": TransportState::Idle.as_str(),
        "finalized": finalized,
    })))
}

/// Current transport status, suitable for UI polling.
async fn status(State(state): State<TransportApiState>) -> Json<Value> {
    let status = state.controller.status().await;

    Json(json!({
        "state": status.state.as_str(),
        "active": status.state.is_active(),
        "session_id": status.session_id,
        "mode": status.mode.map(|m| m.as_str()),
        "path": status.path,
        "started_at": status.started_at,
        "elapsed_seconds": status.elapsed_seconds,
        "total_seconds": status.total_seconds,
        "last_recording": status.last_recording,
        "last_error": status.last_error,
    }))
}
