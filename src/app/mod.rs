use crate::api::ApiServer;
use crate::capture::MicSource;
use crate::config::Config;
use crate::engine::{
    EngineError, FinishedEvent, MonotonicClock, TransportConfig, TransportController,
    TransportObserver,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Observer that narrates session lifecycle into the service log.
struct LogObserver;

#[async_trait]
impl TransportObserver for LogObserver {
    async fn on_finished(&self, event: FinishedEvent) {
        match (&event.file, event.finished_naturally) {
            (Some(file), _) => info!(
                "Recording saved: {:?} ({:.2}s, {} frames)",
                file.path, file.duration_seconds, file.frame_count
            ),
            (None, true) => info!("Playback finished"),
            (None, false) => info!("Session stopped"),
        }
    }

    async fn on_error(&self, error: EngineError) {
        error!("Transport error: {}", error);
    }
}

pub async fn run_service() -> Result<()> {
    info!("Starting tapedeck service");

    let config = Config::load()?;
    let recordings_dir = config.recordings_dir()?;
    std::fs::create_dir_all(&recordings_dir)
        .context("Failed to create recordings directory")?;

    let capture = MicSource::new(config.audio.sample_rate, config.audio.channels);

    let transport_config = TransportConfig {
        recordings_dir: recordings_dir.clone(),
        progress_tick: Duration::from_millis(config.transport.progress_tick_ms),
        stop_timeout: Duration::from_secs(config.transport.stop_timeout_seconds),
        ..TransportConfig::default()
    };

    let controller = TransportController::spawn(
        transport_config,
        Box::new(capture),
        Arc::new(MonotonicClock),
    );
    controller.set_observer(Arc::new(LogObserver)).await;

    info!("Recordings directory: {:?}", recordings_dir);
    info!("tapedeck is ready!");
    info!(
        "Toggle recording with: curl -X POST http://127.0.0.1:{}/record/toggle",
        config.api.port
    );

    let api_server = ApiServer::new(controller, recordings_dir, config.api.port);
    api_server.start().await
}
