//! Transport session types and the lock-free publication cells shared
//! between the workers and the progress notifier.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of the transport state machine. Exactly one value at any instant;
/// all transitions go through the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Idle,
    Recording,
    Playing,
    Paused,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of activity a session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Recording,
    Playing,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Playing => "playing",
        }
    }
}

/// PCM shape written into and read back from WAV headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
        }
    }
}

/// One record-or-play activity. Created on start, destroyed on stop; at
/// most one exists at a time.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub mode: SessionMode,
    pub path: PathBuf,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub started_instant: Instant,
}

impl Session {
    pub fn new(mode: SessionMode, path: PathBuf, started_instant: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            path,
            started_at: chrono::Utc::now(),
            started_instant,
        }
    }
}

/// Immutable summary produced when a recording session closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedFile {
    pub path: PathBuf,
    pub frame_count: u64,
    pub duration_seconds: f64,
}

/// Snapshot of playback/record position, produced at the notifier cadence.
/// `total_seconds` is 0.0 while recording (duration unknown).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub elapsed_seconds: f64,
    pub total_seconds: f64,
    pub mode: SessionMode,
}

/// Delivered to the observer when a session ends. `file` is present for
/// recordings; `finished_naturally` is true only when playback ran off the
/// end of the file on its own.
#[derive(Debug, Clone)]
pub struct FinishedEvent {
    pub file: Option<FinalizedFile>,
    pub finished_naturally: bool,
}

/// Lock-free cell publishing the current transport state. The notifier and
/// status endpoint read this without taking the controller mutex.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(Self::encode(TransportState::Idle)))
    }

    pub fn set(&self, state: TransportState) {
        self.0.store(Self::encode(state), Ordering::Release);
    }

    pub fn get(&self) -> TransportState {
        Self::decode(self.0.load(Ordering::Acquire))
    }

    fn encode(state: TransportState) -> u8 {
        match state {
            TransportState::Idle => 0,
            TransportState::Recording => 1,
            TransportState::Playing => 2,
            TransportState::Paused => 3,
        }
    }

    fn decode(raw: u8) -> TransportState {
        match raw {
            1 => TransportState::Recording,
            2 => TransportState::Playing,
            3 => TransportState::Paused,
            _ => TransportState::Idle,
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Last-published position of the active session. Workers write it after
/// each chunk; the notifier and status endpoint only ever read it — they
/// never touch raw device or file state.
#[derive(Debug)]
pub struct PositionCell {
    frames: AtomicU64,
    total_frames: AtomicU64,
    sample_rate: AtomicU32,
}

impl PositionCell {
    pub fn new() -> Self {
        Self {
            frames: AtomicU64::new(0),
            total_frames: AtomicU64::new(0),
            sample_rate: AtomicU32::new(0),
        }
    }

    /// Arm the cell for a new session. `total_frames` is 0 while recording.
    pub fn reset(&self, sample_rate: u32, total_frames: u64) {
        self.sample_rate.store(sample_rate, Ordering::Release);
        self.total_frames.store(total_frames, Ordering::Release);
        self.frames.store(0, Ordering::Release);
    }

    pub fn publish(&self, frames: u64) {
        self.frames.store(frames, Ordering::Release);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn elapsed_seconds(&self) -> f64 {
        let rate = self.sample_rate.load(Ordering::Acquire);
        if rate == 0 {
            return 0.0;
        }
        self.frames.load(Ordering::Acquire) as f64 / rate as f64
    }

    pub fn total_seconds(&self) -> f64 {
        let rate = self.sample_rate.load(Ordering::Acquire);
        if rate == 0 {
            return 0.0;
        }
        self.total_frames.load(Ordering::Acquire) as f64 / rate as f64
    }

    pub fn sample(&self, mode: SessionMode) -> ProgressSample {
        ProgressSample {
            elapsed_seconds: self.elapsed_seconds(),
            total_seconds: self.total_seconds(),
            mode,
        }
    }
}

impl Default for PositionCell {
    fn default() -> Self {
        Self::new()
    }
}
