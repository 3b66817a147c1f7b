//! Recordings listing endpoint.
//!
//! The library of past takes is the filesystem itself: timestamped WAVs in
//! the recordings directory, newest first.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};

use crate::api::error::{ApiError, ApiResult};

const DEFAULT_LIMIT: usize = 50;

#[derive(Clone)]
pub struct RecordingsState {
    pub recordings_dir: PathBuf,
}

pub fn router(state: RecordingsState) -> Router {
    Router::new()
        .route("/recordings", get(list_recordings))
        .with_state(state)
}

async fn list_recordings(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<RecordingsState>,
) -> ApiResult<Json<Value>> {
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_LIMIT);

    let mut entries = Vec::new();
    let dir = match std::fs::read_dir(&state.recordings_dir) {
        Ok(dir) => dir,
        // No recordings yet is not an error.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Json(json!({ "recordings": [] })));
        }
        Err(e) => {
            return Err(ApiError::internal(format!(
                "Failed to read recordings dir: {e}"
            )))
        }
    };

    for entry in dir.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("wav") {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push((path, metadata.len(), modified));
    }

    entries.sort_by(|a, b| b.2.cmp(&a.2));
    entries.truncate(limit);

    let recordings: Vec<Value> = entries
        .into_iter()
        .map(|(path, size, modified)| {
            let modified: chrono::DateTime<chrono::Utc> = modified.into();
            json!({
                "name": path.file_name().map(|n| n.to_string_lossy().to_string()),
                "path": path,
                "size_bytes": size,
                "modified": modified,
            })
        })
        .collect();

    Ok(Json(json!({ "recordings": recordings })))
}
