//! Microphone capture via cpal.
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated thread
//! for the whole capture. The stream callback forwards chunks into the
//! transport's channel with `try_send` — the audio callback must never
//! block, so a full channel drops the chunk and we log it once.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::CaptureSource;
use crate::engine::{ConflictError, EngineError, TransportState};

pub struct MicSource {
    sample_rate: u32,
    channels: u16,
    worker: Option<CaptureWorker>,
}

struct CaptureWorker {
    stop_tx: std_mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl MicSource {
    /// Create a mic source targeting the default input device. The device
    /// itself is opened lazily on `start`, on the capture thread.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            worker: None,
        }
    }
}

impl CaptureSource for MicSource {
    fn start(&mut self, frames: mpsc::Sender<Vec<f32>>) -> Result<(), EngineError> {
        if self.worker.is_some() {
            return Err(ConflictError::AlreadyActive {
                state: TransportState::Recording,
            }
            .into());
        }

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let join = std::thread::Builder::new()
            .name("tapedeck-capture".to_string())
            .spawn(move || {
                let stream = match build_input_stream(sample_rate, channels, frames) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(permission_denied(format!(
                        "failed to start input stream: {e}"
                    ))));
                    return;
                }

                let _ = ready_tx.send(Ok(()));

                // Hold the stream alive until stop; dropping it ends capture
                // and drops the frame sender with it.
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Capture thread shut down");
            })
            .map_err(|e| permission_denied(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Mic capture started ({} Hz, {} ch)", sample_rate, channels);
                self.worker = Some(CaptureWorker { stop_tx, join });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(permission_denied("capture thread died during startup".into()))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.join.join().is_err() {
                warn!("Capture thread panicked during shutdown");
            }
            info!("Mic capture stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for MicSource {
    fn drop(&mut self) {
        if self.is_active() {
            debug!("Dropping active MicSource, cleaning up");
            self.stop();
        }
    }
}

fn build_input_stream(
    sample_rate: u32,
    channels: u16,
    frames: mpsc::Sender<Vec<f32>>,
) -> Result<cpal::Stream, EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| permission_denied("no input device available".into()))?;

    info!(
        "Capturing from device: {}",
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut warned_full = false;
    let err_fn = |err| error!("Input stream error: {}", err);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if frames.try_send(data.to_vec()).is_err() && !warned_full {
                    warned_full = true;
                    warn!("Frame channel full, dropping captured audio");
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| permission_denied(format!("failed to open input stream: {e}")))?;

    Ok(stream)
}

fn permission_denied(reason: String) -> EngineError {
    ConflictError::PermissionDenied { reason }.into()
}
