//! Transport state machine: Idle / Recording / Playing / Paused.
//!
//! All transitions are serialized behind one mutex. Audio I/O never runs
//! under that mutex: recording writes happen on a blocking-pool worker fed
//! by the capture channel, playback reads happen on a paced async worker,
//! and both report back through the `TransportEvent` queue drained by an
//! engine-owned event loop. Workers never mutate transport state directly.
//!
//! Resource acquisition order is Controller -> Sink/Source -> Clock,
//! never reversed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capture::CaptureSource;

use super::clock::Clock;
use super::error::{ConflictError, EngineError, IoError};
use super::observer::{ObserverHandle, TransportObserver};
use super::progress::{ProgressNotifier, DEFAULT_TICK};
use super::session::{
    AudioFormat, FinalizedFile, FinishedEvent, PositionCell, Session, SessionMode, StateCell,
    TransportState,
};
use super::sink::FileSink;
use super::source::FileSource;

/// Depth of the capture -> writer frame queue. At typical callback sizes
/// this buffers a comfortable fraction of a second of audio.
const FRAME_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub recordings_dir: PathBuf,
    pub progress_tick: Duration,
    /// Ceiling on how long `stop` waits for a worker to flush and close.
    pub stop_timeout: Duration,
    /// Frames per paced playback read.
    pub play_chunk_frames: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("."),
            progress_tick: DEFAULT_TICK,
            stop_timeout: Duration::from_secs(2),
            play_chunk_frames: 2048,
        }
    }
}

/// Events signalled from I/O workers back to the controller.
#[derive(Debug)]
enum TransportEvent {
    ReachedEnd { session_id: Uuid },
    IoFailed { session_id: Uuid, error: IoError },
}

/// Commands delivered to the playback worker.
#[derive(Debug)]
enum PlayerCommand {
    Pause,
    Resume,
    Seek(f64),
    Stop,
}

enum SessionWorker {
    Recording {
        done_rx: oneshot::Receiver<Result<FinalizedFile, IoError>>,
    },
    Playing {
        commands: mpsc::Sender<PlayerCommand>,
        done_rx: oneshot::Receiver<()>,
    },
}

struct ActiveSession {
    session: Session,
    worker: SessionWorker,
}

struct Inner {
    capture: Box<dyn CaptureSource>,
    session: Option<ActiveSession>,
    last_recording: Option<FinalizedFile>,
    last_error: Option<String>,
    notifier_task: Option<JoinHandle<()>>,
}

/// Observer notifications collected under the lock and delivered after it
/// is released, so a slow observer can never wedge a transition.
enum Emit {
    Finished(FinishedEvent),
    Error(EngineError),
}

/// Outcome of `toggle_record`.
pub enum RecordToggle {
    Started(Session),
    Stopped(Option<FinalizedFile>),
}

/// Outcome of `toggle_play`.
pub enum PlayToggle {
    Started(Session),
    Paused,
    Resumed,
}

/// Snapshot for status surfaces (API `/status`, CLI).
#[derive(Debug, Clone, Serialize)]
pub struct TransportStatus {
    pub state: TransportState,
    pub session_id: Option<String>,
    pub mode: Option<SessionMode>,
    pub path: Option<PathBuf>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub elapsed_seconds: f64,
    pub total_seconds: f64,
    pub last_recording: Option<FinalizedFile>,
    pub last_error: Option<String>,
}

pub struct TransportController {
    inner: Mutex<Inner>,
    state: Arc<StateCell>,
    position: Arc<PositionCell>,
    observer: ObserverHandle,
    events_tx: mpsc::Sender<TransportEvent>,
    clock: Arc<dyn Clock>,
    config: TransportConfig,
}

impl TransportController {
    /// Build the controller and spawn its event loop.
    pub fn spawn(
        config: TransportConfig,
        capture: Box<dyn CaptureSource>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(16);

        let controller = Arc::new(Self {
            inner: Mutex::new(Inner {
                capture,
                session: None,
                last_recording: None,
                last_error: None,
                notifier_task: None,
            }),
            state: Arc::new(StateCell::new()),
            position: Arc::new(PositionCell::new()),
            observer: ObserverHandle::new(),
            events_tx,
            clock,
            config,
        });

        tokio::spawn(Self::event_loop(controller.clone(), events_rx));
        controller
    }

    pub fn current_state(&self) -> TransportState {
        self.state.get()
    }

    /// Replace the registered observer.
    pub async fn set_observer(&self, observer: Arc<dyn TransportObserver>) {
        self.observer.set(observer).await;
    }

    pub async fn last_recording(&self) -> Option<FinalizedFile> {
        self.inner.lock().await.last_recording.clone()
    }

    pub async fn status(&self) -> TransportStatus {
        let inner = self.inner.lock().await;
        let (elapsed, total) = match inner.session.as_ref() {
            Some(active) if active.session.mode == SessionMode::Recording => {
                // Wall-clock elapsed for recording: the device may hold
                // frames the sink has not seen yet.
                let since = self
                    .clock
                    .now()
                    .duration_since(active.session.started_instant);
                (since.as_secs_f64(), 0.0)
            }
            Some(_) => (
                self.position.elapsed_seconds(),
                self.position.total_seconds(),
            ),
            None => (0.0, 0.0),
        };

        TransportStatus {
            state: self.state.get(),
            session_id: inner.session.as_ref().map(|a| a.session.id.to_string()),
            mode: inner.session.as_ref().map(|a| a.session.mode),
            path: inner.session.as_ref().map(|a| a.session.path.clone()),
            started_at: inner.session.as_ref().map(|a| a.session.started_at),
            elapsed_seconds: elapsed,
            total_seconds: total,
            last_recording: inner.last_recording.clone(),
            last_error: inner.last_error.clone(),
        }
    }

    /// Open a sink and start capturing into it. Fails with
    /// `ConflictError::AlreadyActive` unless the transport is Idle; a
    /// failed start leaves no session and no stray file behind.
    pub async fn start_recording(&self, path: Option<PathBuf>) -> Result<Session, EngineError> {
        let mut inner = self.inner.lock().await;
        if inner.session.is_some() {
            return Err(ConflictError::AlreadyActive {
                state: self.state.get(),
            }
            .into());
        }

        let path = path.unwrap_or_else(|| next_recording_path(&self.config.recordings_dir));
        let format = AudioFormat {
            sample_rate: inner.capture.sample_rate(),
            channels: inner.capture.channels(),
        };
        let mut sink = FileSink::create(&path, format)?;

        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        if let Err(e) = inner.capture.start(frames_tx) {
            let _ = sink.close();
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }

        let session = Session::new(SessionMode::Recording, path.clone(), self.clock.now());
        self.position.reset(format.sample_rate, 0);

        let (done_tx, done_rx) = oneshot::channel();
        let position = self.position.clone();
        let events = self.events_tx.clone();
        let session_id = session.id;
        tokio::task::spawn_blocking(move || {
            record_worker(sink, frames_rx, position, events, done_tx, session_id)
        });

        inner.session = Some(ActiveSession {
            session: session.clone(),
            worker: SessionWorker::Recording { done_rx },
        });
        self.state.set(TransportState::Recording);
        inner.notifier_task = Some(self.notifier().spawn(SessionMode::Recording));

        info!("Recording started: {:?} (session {})", path, session.id);
        Ok(session)
    }

    /// Open a source and start paced playback. With no path, plays the
    /// most recent finalized recording.
    pub async fn start_playback(&self, path: Option<PathBuf>) -> Result<Session, EngineError> {
        let mut inner = self.inner.lock().await;
        if inner.session.is_some() {
            return Err(ConflictError::AlreadyActive {
                state: self.state.get(),
            }
            .into());
        }

        let path = match path.or_else(|| inner.last_recording.as_ref().map(|f| f.path.clone())) {
            Some(path) => path,
            None => {
                return Err(IoError::NotFound {
                    path: self.config.recordings_dir.clone(),
                }
                .into())
            }
        };

        let source = FileSource::open(&path)?;
        self.position.reset(source.sample_rate(), source.total_frames());

        let session = Session::new(SessionMode::Playing, path.clone(), self.clock.now());
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (done_tx, done_rx) = oneshot::channel();
        let position = self.position.clone();
        let events = self.events_tx.clone();
        let session_id = session.id;
        let chunk_frames = self.config.play_chunk_frames;
        tokio::spawn(playback_worker(
            source,
            cmd_rx,
            position,
            events,
            done_tx,
            session_id,
            chunk_frames,
        ));

        inner.session = Some(ActiveSession {
            session: session.clone(),
            worker: SessionWorker::Playing {
                commands: cmd_tx,
                done_rx,
            },
        });
        self.state.set(TransportState::Playing);
        inner.notifier_task = Some(self.notifier().spawn(SessionMode::Playing));

        info!("Playback started: {:?} (session {})", path, session.id);
        Ok(session)
    }

    /// Pause playback, retaining position. No-op when already paused or
    /// Idle; pausing a recording is not supported.
    pub async fn pause(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        match inner.session.as_ref().map(|a| a.session.mode) {
            Some(SessionMode::Playing) => {
                if self.state.get() == TransportState::Paused {
                    return Ok(());
                }
                if let Some(commands) = player_commands(&inner) {
                    let _ = commands.send(PlayerCommand::Pause).await;
                }
                self.state.set(TransportState::Paused);
                if let Some(task) = inner.notifier_task.take() {
                    task.abort();
                }
                info!("Playback paused");
                Ok(())
            }
            Some(SessionMode::Recording) => Err(ConflictError::AlreadyActive {
                state: TransportState::Recording,
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Resume paused playback from the retained position. No-op when
    /// already Playing or Idle.
    pub async fn resume(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        match inner.session.as_ref().map(|a| a.session.mode) {
            Some(SessionMode::Playing) => {
                if self.state.get() == TransportState::Playing {
                    return Ok(());
                }
                if let Some(commands) = player_commands(&inner) {
                    let _ = commands.send(PlayerCommand::Resume).await;
                }
                self.state.set(TransportState::Playing);
                inner.notifier_task = Some(self.notifier().spawn(SessionMode::Playing));
                info!("Playback resumed");
                Ok(())
            }
            Some(SessionMode::Recording) => Err(ConflictError::AlreadyActive {
                state: TransportState::Recording,
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Seek within the playing/paused file, clamped by the source.
    pub async fn seek(&self, position_seconds: f64) -> Result<(), EngineError> {
        let inner = self.inner.lock().await;
        match inner.session.as_ref().map(|a| a.session.mode) {
            Some(SessionMode::Playing) => {
                if self.position.total_seconds() == 0.0 {
                    return Err(IoError::SeekOutOfRange.into());
                }
                if let Some(commands) = player_commands(&inner) {
                    let _ = commands.send(PlayerCommand::Seek(position_seconds)).await;
                }
                Ok(())
            }
            Some(SessionMode::Recording) => Err(ConflictError::AlreadyActive {
                state: TransportState::Recording,
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Stop whatever is active and return to Idle. Always succeeds; close
    /// failures are reported through the observer. Idempotent — stopping
    /// from Idle is a no-op returning `None`.
    pub async fn stop(&self) -> Option<FinalizedFile> {
        let mut inner = self.inner.lock().await;
        let (finalized, emits) = self.teardown(&mut inner, false).await;
        drop(inner);
        self.emit_all(emits).await;
        finalized
    }

    /// Record toggle: Idle starts, Recording stops, anything else is a
    /// conflict. Thin wrapper — the programmatic API above stays the
    /// real entry point.
    pub async fn toggle_record(&self) -> Result<RecordToggle, EngineError> {
        match self.state.get() {
            TransportState::Idle => Ok(RecordToggle::Started(self.start_recording(None).await?)),
            TransportState::Recording => Ok(RecordToggle::Stopped(self.stop().await)),
            state => Err(ConflictError::AlreadyActive { state }.into()),
        }
    }

    /// Play toggle: Idle starts, Playing pauses, Paused resumes.
    pub async fn toggle_play(&self, path: Option<PathBuf>) -> Result<PlayToggle, EngineError> {
        match self.state.get() {
            TransportState::Idle => Ok(PlayToggle::Started(self.start_playback(path).await?)),
            TransportState::Playing => {
                self.pause().await?;
                Ok(PlayToggle::Paused)
            }
            TransportState::Paused => {
                self.resume().await?;
                Ok(PlayToggle::Resumed)
            }
            state => Err(ConflictError::AlreadyActive { state }.into()),
        }
    }

    fn notifier(&self) -> ProgressNotifier {
        ProgressNotifier::new(
            self.config.progress_tick,
            self.position.clone(),
            self.state.clone(),
            self.observer.clone(),
        )
    }

    async fn event_loop(controller: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::ReachedEnd { session_id } => {
                    controller.handle_reached_end(session_id).await;
                }
                TransportEvent::IoFailed { session_id, error } => {
                    controller.handle_io_failure(session_id, error).await;
                }
            }
        }
    }

    async fn handle_reached_end(&self, session_id: Uuid) {
        let mut inner = self.inner.lock().await;
        let matches = inner
            .session
            .as_ref()
            .map(|a| a.session.id == session_id && a.session.mode == SessionMode::Playing)
            .unwrap_or(false);
        if !matches {
            debug!("Ignoring reached-end for stale session {}", session_id);
            return;
        }

        info!("Playback finished naturally (session {})", session_id);
        let (_, emits) = self.teardown(&mut inner, true).await;
        drop(inner);
        self.emit_all(emits).await;
    }

    async fn handle_io_failure(&self, session_id: Uuid, error: IoError) {
        let mut inner = self.inner.lock().await;
        let matches = inner
            .session
            .as_ref()
            .map(|a| a.session.id == session_id)
            .unwrap_or(false);
        if !matches {
            debug!("Ignoring i/o failure for stale session {}: {}", session_id, error);
            return;
        }

        error!("Session {} failed: {}", session_id, error);
        inner.last_error = Some(error.to_string());
        let mut emits = vec![Emit::Error(error.into())];
        let (_, mut more) = self.teardown(&mut inner, false).await;
        emits.append(&mut more);
        drop(inner);
        self.emit_all(emits).await;
    }

    /// Shared teardown: dismantle the active session (if any), land in
    /// Idle, and collect the observer notifications to deliver once the
    /// lock is released. Waits on worker shutdown are bounded by the
    /// configured stop timeout.
    async fn teardown(
        &self,
        inner: &mut Inner,
        finished_naturally: bool,
    ) -> (Option<FinalizedFile>, Vec<Emit>) {
        let mut emits = Vec::new();
        let Some(active) = inner.session.take() else {
            return (None, emits);
        };

        // State first so the notifier stops emitting immediately, then
        // kill its task outright.
        self.state.set(TransportState::Idle);
        if let Some(task) = inner.notifier_task.take() {
            task.abort();
        }

        let mut finalized = None;
        match active.worker {
            SessionWorker::Recording { done_rx } => {
                inner.capture.stop();
                match tokio::time::timeout(self.config.stop_timeout, done_rx).await {
                    Ok(Ok(Ok(file))) => {
                        info!(
                            "Recording finalized: {:?} ({} frames, {:.2}s)",
                            file.path, file.frame_count, file.duration_seconds
                        );
                        inner.last_recording = Some(file.clone());
                        finalized = Some(file);
                    }
                    Ok(Ok(Err(e))) => {
                        warn!("Recording close failed: {}", e);
                        inner.last_error = Some(e.to_string());
                        emits.push(Emit::Error(e.into()));
                    }
                    Ok(Err(_)) => {
                        let e = IoError::WriteFailed {
                            reason: "recording worker exited without reporting".to_string(),
                        };
                        inner.last_error = Some(e.to_string());
                        emits.push(Emit::Error(e.into()));
                    }
                    Err(_) => {
                        let e = IoError::Timeout {
                            limit: self.config.stop_timeout,
                        };
                        warn!("{}", e);
                        inner.last_error = Some(e.to_string());
                        emits.push(Emit::Error(e.into()));
                    }
                }
            }
            SessionWorker::Playing { commands, done_rx } => {
                let _ = commands.send(PlayerCommand::Stop).await;
                match tokio::time::timeout(self.config.stop_timeout, done_rx).await {
                    Ok(_) => {}
                    Err(_) => {
                        let e = IoError::Timeout {
                            limit: self.config.stop_timeout,
                        };
                        warn!("{}", e);
                        inner.last_error = Some(e.to_string());
                        emits.push(Emit::Error(e.into()));
                    }
                }
            }
        }

        emits.push(Emit::Finished(FinishedEvent {
            file: finalized.clone(),
            finished_naturally,
        }));
        (finalized, emits)
    }

    async fn emit_all(&self, emits: Vec<Emit>) {
        if emits.is_empty() {
            return;
        }
        let observer = self.observer.current().await;
        for emit in emits {
            match emit {
                Emit::Finished(event) => observer.on_finished(event).await,
                Emit::Error(error) => observer.on_error(error).await,
            }
        }
    }
}

fn player_commands(inner: &Inner) -> Option<mpsc::Sender<PlayerCommand>> {
    match inner.session.as_ref()?.worker {
        SessionWorker::Playing { ref commands, .. } => Some(commands.clone()),
        SessionWorker::Recording { .. } => None,
    }
}

/// Timestamp-derived filename in the recordings directory, with a counter
/// suffix on collision.
fn next_recording_path(dir: &Path) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%dT%H%M%S");
    let candidate = dir.join(format!("recording-{timestamp}.wav"));
    if !candidate.exists() {
        return candidate;
    }
    for i in 1..100 {
        let alt = dir.join(format!("recording-{timestamp}-{i}.wav"));
        if !alt.exists() {
            return alt;
        }
    }
    candidate
}

/// Drains the capture channel into the sink on the blocking pool. Exits
/// when the channel closes (capture stopped) or a write fails; either way
/// the sink is closed and the result reported through `done`.
fn record_worker(
    mut sink: FileSink,
    mut frames: mpsc::Receiver<Vec<f32>>,
    position: Arc<PositionCell>,
    events: mpsc::Sender<TransportEvent>,
    done: oneshot::Sender<Result<FinalizedFile, IoError>>,
    session_id: Uuid,
) {
    while let Some(chunk) = frames.blocking_recv() {
        if let Err(e) = sink.write(&chunk) {
            error!("Recording write failed: {}", e);
            let _ = events.blocking_send(TransportEvent::IoFailed {
                session_id,
                error: e,
            });
            break;
        }
        position.publish(sink.frame_count());
    }

    let _ = done.send(sink.close());
}

/// Reads the source at realtime rate, publishing position after every
/// chunk. Pause parks on the command channel so a paused session costs
/// nothing; Stop and channel closure both end the session.
async fn playback_worker(
    mut source: FileSource,
    mut commands: mpsc::Receiver<PlayerCommand>,
    position: Arc<PositionCell>,
    events: mpsc::Sender<TransportEvent>,
    done: oneshot::Sender<()>,
    session_id: Uuid,
    chunk_frames: usize,
) {
    let rate = source.sample_rate().max(1);
    let chunk_duration = Duration::from_secs_f64(chunk_frames as f64 / rate as f64);
    let mut paused = false;

    'session: loop {
        if paused {
            match commands.recv().await {
                Some(PlayerCommand::Resume) => paused = false,
                Some(PlayerCommand::Pause) => {}
                Some(PlayerCommand::Seek(pos)) => {
                    if !apply_seek(&mut source, &position, &events, session_id, pos).await {
                        break 'session;
                    }
                }
                Some(PlayerCommand::Stop) | None => break 'session,
            }
            continue;
        }

        match commands.try_recv() {
            Ok(PlayerCommand::Pause) => {
                paused = true;
                continue;
            }
            Ok(PlayerCommand::Resume) => {}
            Ok(PlayerCommand::Seek(pos)) => {
                if !apply_seek(&mut source, &position, &events, session_id, pos).await {
                    break 'session;
                }
            }
            Ok(PlayerCommand::Stop) => break 'session,
            Err(mpsc::error::TryRecvError::Empty) => {}
            Err(mpsc::error::TryRecvError::Disconnected) => break 'session,
        }

        let chunk = match source.read(chunk_frames) {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = events
                    .send(TransportEvent::IoFailed {
                        session_id,
                        error: e,
                    })
                    .await;
                break 'session;
            }
        };
        position.publish(source.position_frames());

        if chunk.reached_end {
            let _ = events.send(TransportEvent::ReachedEnd { session_id }).await;
            break 'session;
        }

        tokio::time::sleep(chunk_duration).await;
    }

    source.close();
    let _ = done.send(());
}

/// Returns false when the session must end because the seek hit an i/o
/// failure (already reported through the event queue).
async fn apply_seek(
    source: &mut FileSource,
    position: &PositionCell,
    events: &mpsc::Sender<TransportEvent>,
    session_id: Uuid,
    pos: f64,
) -> bool {
    match source.seek(pos) {
        Ok(()) => {
            position.publish(source.position_frames());
            true
        }
        Err(e) => {
            let _ = events
                .send(TransportEvent::IoFailed {
                    session_id,
                    error: e,
                })
                .await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_recording_path_has_timestamped_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = next_recording_path(dir.path());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("recording-"));
        assert!(name.ends_with(".wav"));
    }

    #[test]
    fn test_next_recording_path_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let first = next_recording_path(dir.path());
        std::fs::write(&first, b"").unwrap();

        let second = next_recording_path(dir.path());
        assert_ne!(first, second);
    }
}
