//! Typed errors for the audio engine.
//!
//! Everything the engine can fail with is enumerated here; callers decide
//! how to recover. Nothing is logged-and-swallowed on a failed open.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::session::TransportState;

/// Failures touching the storage layer (sink, source, worker shutdown).
#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to create {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("unsupported audio format in {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("write failed: {reason}")]
    WriteFailed { reason: String },

    #[error("cannot seek: file has zero duration")]
    SeekOutOfRange,

    #[error("audio i/o did not settle within {}ms", .limit.as_millis())]
    Timeout { limit: Duration },
}

/// Failures caused by the transport being in the wrong state, or by the
/// platform refusing to hand over the input device.
#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("transport is busy ({state}); stop the active session first")]
    AlreadyActive { state: TransportState },

    #[error("audio input unavailable: {reason}")]
    PermissionDenied { reason: String },
}

/// Union of the two error families, for surfaces that can hit either.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),
}

impl EngineError {
    /// Whether this error means "the thing you asked for does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Io(IoError::NotFound { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_active_message_names_state() {
        let err = ConflictError::AlreadyActive {
            state: TransportState::Recording,
        };
        assert!(err.to_string().contains("recording"));
    }

    #[test]
    fn test_engine_error_from_io() {
        let err: EngineError = IoError::SeekOutOfRange.into();
        assert!(matches!(err, EngineError::Io(IoError::SeekOutOfRange)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_detection() {
        let err: EngineError = IoError::NotFound {
            path: PathBuf::from("/tmp/missing.wav"),
        }
        .into();
        assert!(err.is_not_found());
    }
}
