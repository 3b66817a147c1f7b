//! HTTP client for the tapedeck service API.
//!
//! All CLI transport commands go through the running service — the CLI
//! never touches the audio device or the recordings directly.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub struct TransportClient {
    client: reqwest::Client,
    base_url: String,
}

/// Transport status as reported by GET /status.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct StatusResponse {
    pub state: String,
    pub active: bool,
    pub session_id: Option<String>,
    pub mode: Option<String>,
    pub path: Option<PathBuf>,
    pub elapsed_seconds: f64,
    pub total_seconds: f64,
    pub last_recording: Option<RecordingSummary>,
    pub last_error: Option<String>,
}

/// Finalized recording summary embedded in status responses.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub frame_count: u64,
    pub duration_seconds: f64,
}

impl TransportClient {
    pub fn new(port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://127.0.0.1:{port}"),
        }
    }

    pub async fn start_record(&self, path: Option<&Path>) -> Result<Value> {
        let body = path.map(|p| json!({ "path": p }));
        self.post("/record", body).await
    }

    pub async fn start_play(&self, path: Option<&Path>) -> Result<Value> {
        let body = path.map(|p| json!({ "path": p }));
        self.post("/play", body).await
    }

    pub async fn pause(&self) -> Result<Value> {
        self.post("/pause", None).await
    }

    pub async fn resume(&self) -> Result<Value> {
        self.post("/resume", None).await
    }

    pub async fn seek(&self, position_seconds: f64) -> Result<Value> {
        self.post("/seek", Some(json!({ "position_seconds": position_seconds })))
            .await
    }

    pub async fn stop(&self) -> Result<Value> {
        self.post("/stop", None).await
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .context("Failed to connect to tapedeck service. Is it running?")?;

        let body = response.text().await?;
        serde_json::from_str(&body).context("Failed to parse status response")
    }

    pub async fn recordings(&self, limit: usize) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/recordings?limit={}", self.base_url, limit))
            .send()
            .await
            .context("Failed to connect to tapedeck service. Is it running?")?;

        let json: Value = response.json().await?;
        Ok(json)
    }

    async fn post(&self, route: &str, body: Option<Value>) -> Result<Value> {
        let mut request = self.client.post(format!("{}{}", self.base_url, route));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .context("Failed to connect to tapedeck service. Is it running?")?;

        let status = response.status();
        let json: Value = response
            .json()
            .await
            .context("Failed to parse service response")?;

        if !status.is_success() {
            anyhow::bail!(
                "{}",
                json.get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("Unknown error")
            );
        }

        Ok(json)
    }
}
