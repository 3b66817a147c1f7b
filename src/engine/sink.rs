//! WAV file sink for captured PCM frames.
//!
//! Thin wrapper over hound's `WavWriter`: appends interleaved f32 samples
//! and tracks the frame count. `close` is idempotent and hands back the
//! finalized summary either way.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use super::error::IoError;
use super::session::{AudioFormat, FinalizedFile};

pub struct FileSink {
    path: PathBuf,
    format: AudioFormat,
    writer: Option<WavWriter<BufWriter<File>>>,
    frames_written: u64,
    finalized: Option<FinalizedFile>,
}

impl FileSink {
    /// Create the container file and write its header.
    pub fn create(path: &Path, format: AudioFormat) -> Result<Self, IoError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| IoError::CreateFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            }
        }

        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let writer = WavWriter::create(path, spec).map_err(|e| IoError::CreateFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            format,
            writer: Some(writer),
            frames_written: 0,
            finalized: None,
        })
    }

    /// Append interleaved samples. Partial writes are not retried here —
    /// the caller decides what a failed write means for the session.
    pub fn write(&mut self, samples: &[f32]) -> Result<(), IoError> {
        let writer = self.writer.as_mut().ok_or_else(|| IoError::WriteFailed {
            reason: "sink already closed".to_string(),
        })?;

        for &sample in samples {
            writer.write_sample(sample).map_err(|e| IoError::WriteFailed {
                reason: e.to_string(),
            })?;
        }

        self.frames_written += samples.len() as u64 / self.format.channels as u64;
        Ok(())
    }

    pub fn frame_count(&self) -> u64 {
        self.frames_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finalize the header and return the summary. Calling again is a
    /// no-op that returns the same summary.
    pub fn close(&mut self) -> Result<FinalizedFile, IoError> {
        if let Some(finalized) = &self.finalized {
            return Ok(finalized.clone());
        }

        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| IoError::WriteFailed {
                reason: e.to_string(),
            })?;
        }

        let finalized = FinalizedFile {
            path: self.path.clone(),
            frame_count: self.frames_written,
            duration_seconds: self.frames_written as f64 / self.format.sample_rate as f64,
        };
        self.finalized = Some(finalized.clone());
        Ok(finalized)
    }
}
