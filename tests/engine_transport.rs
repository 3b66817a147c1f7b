//! Transport state machine properties, driven end to end with a scripted
//! capture source so no audio hardware is needed.

use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use tapedeck::capture::CaptureSource;
use tapedeck::engine::{
    AudioFormat, ConflictError, EngineError, FileSink, FileSource, FinishedEvent, MonotonicClock,
    ProgressSample, RecordToggle, TransportController, TransportObserver, TransportState,
};
use tapedeck::engine::transport::TransportConfig;

const RATE: u32 = 44_100;

/// Capture source that emits a steady stream of synthetic chunks from a
/// plain thread, like a device would.
struct ScriptedSource {
    worker: Option<(std_mpsc::Sender<()>, thread::JoinHandle<()>)>,
}

impl ScriptedSource {
    fn new() -> Self {
        Self { worker: None }
    }
}

impl CaptureSource for ScriptedSource {
    fn start(&mut self, frames: mpsc::Sender<Vec<f32>>) -> Result<(), EngineError> {
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let join = thread::spawn(move || {
            let chunk = vec![0.25f32; 441];
            loop {
                if stop_rx.try_recv().is_ok() {
                    break;
                }
                if frames.blocking_send(chunk.clone()).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(5));
            }
        });
        self.worker = Some((stop_tx, join));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((stop_tx, join)) = self.worker.take() {
            let _ = stop_tx.send(());
            let _ = join.join();
        }
    }

    fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    fn sample_rate(&self) -> u32 {
        RATE
    }

    fn channels(&self) -> u16 {
        1
    }
}

/// Capture source standing in for a device the platform refuses to open.
struct DeniedSource;

impl CaptureSource for DeniedSource {
    fn start(&mut self, _frames: mpsc::Sender<Vec<f32>>) -> Result<(), EngineError> {
        Err(ConflictError::PermissionDenied {
            reason: "microphone access denied".to_string(),
        }
        .into())
    }

    fn stop(&mut self) {}

    fn is_active(&self) -> bool {
        false
    }

    fn sample_rate(&self) -> u32 {
        RATE
    }

    fn channels(&self) -> u16 {
        1
    }
}

#[derive(Debug)]
enum Observed {
    Progress(ProgressSample),
    Finished(FinishedEvent),
    Error(String),
}

struct ChannelObserver(mpsc::UnboundedSender<Observed>);

#[async_trait]
impl TransportObserver for ChannelObserver {
    async fn on_progress(&self, sample: ProgressSample) {
        let _ = self.0.send(Observed::Progress(sample));
    }

    async fn on_finished(&self, event: FinishedEvent) {
        let _ = self.0.send(Observed::Finished(event));
    }

    async fn on_error(&self, error: EngineError) {
        let _ = self.0.send(Observed::Error(error.to_string()));
    }
}

fn controller(dir: &Path) -> Arc<TransportController> {
    controller_with_source(dir, Box::new(ScriptedSource::new()))
}

fn controller_with_source(
    dir: &Path,
    capture: Box<dyn CaptureSource>,
) -> Arc<TransportController> {
    TransportController::spawn(
        TransportConfig {
            recordings_dir: dir.to_path_buf(),
            progress_tick: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(2),
            play_chunk_frames: 2048,
        },
        capture,
        Arc::new(MonotonicClock),
    )
}

async fn observe(transport: &TransportController) -> mpsc::UnboundedReceiver<Observed> {
    let (tx, rx) = mpsc::unbounded_channel();
    transport.set_observer(Arc::new(ChannelObserver(tx))).await;
    rx
}

async fn wait_for_finished(rx: &mut mpsc::UnboundedReceiver<Observed>) -> FinishedEvent {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match rx.recv().await {
                Some(Observed::Finished(event)) => return event,
                Some(_) => continue,
                None => panic!("observer channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for finished event")
}

/// One-second mono take written straight through the sink.
fn write_take(path: &Path, frames: usize) {
    let mut sink = FileSink::create(
        path,
        AudioFormat {
            sample_rate: RATE,
            channels: 1,
        },
    )
    .unwrap();
    sink.write(&vec![0.1f32; frames]).unwrap();
    sink.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_record_stop_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let transport = controller(dir.path());
    let path = dir.path().join("take.wav");

    let session = transport
        .start_recording(Some(path.clone()))
        .await
        .unwrap();
    assert_eq!(transport.current_state(), TransportState::Recording);
    assert_eq!(session.path, path);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let finalized = transport.stop().await.expect("recording should finalize");
    assert_eq!(transport.current_state(), TransportState::Idle);
    assert!(finalized.frame_count > 0);
    assert!(path.exists());

    // Everything the sink counted comes back out of the source.
    let source = FileSource::open(&path).unwrap();
    assert_eq!(source.total_frames(), finalized.frame_count);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_while_active_is_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let transport = controller(dir.path());

    let session = transport.start_recording(None).await.unwrap();
    let before = transport.status().await;

    let err = transport.start_recording(None).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictError::AlreadyActive { .. })
    ));

    let err = transport.start_playback(None).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictError::AlreadyActive { .. })
    ));

    // The active session is untouched by the failed starts.
    let after = transport.status().await;
    assert_eq!(after.session_id, before.session_id);
    assert_eq!(after.session_id, Some(session.id.to_string()));
    assert_eq!(transport.current_state(), TransportState::Recording);

    transport.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_is_idempotent_from_idle() {
    let dir = tempfile::tempdir().unwrap();
    let transport = controller(dir.path());

    assert_eq!(transport.current_state(), TransportState::Idle);
    assert!(transport.stop().await.is_none());
    assert!(transport.stop().await.is_none());
    assert_eq!(transport.current_state(), TransportState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_playback_of_missing_file_stays_idle() {
    let dir = tempfile::tempdir().unwrap();
    let transport = controller(dir.path());

    let err = transport
        .start_playback(Some(dir.path().join("missing.wav")))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(transport.current_state(), TransportState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_playback_finishes_naturally() {
    let dir = tempfile::tempdir().unwrap();
    let transport = controller(dir.path());
    let mut observed = observe(&transport).await;

    let path = dir.path().join("short.wav");
    write_take(&path, 4096);

    transport.start_playback(Some(path)).await.unwrap();
    assert_eq!(transport.current_state(), TransportState::Playing);

    let finished = wait_for_finished(&mut observed).await;
    assert!(finished.finished_naturally);
    assert!(finished.file.is_none());
    assert_eq!(transport.current_state(), TransportState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pause_resume_is_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let transport = controller(dir.path());

    let path = dir.path().join("long.wav");
    write_take(&path, RATE as usize * 5);

    transport.start_playback(Some(path)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    transport.pause().await.unwrap();
    assert_eq!(transport.current_state(), TransportState::Paused);
    tokio::time::sleep(Duration::from_millis(60)).await;

    let at_pause = transport.status().await.elapsed_seconds;
    assert!(at_pause > 0.0);

    // Paused position is frozen.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.status().await.elapsed_seconds, at_pause);

    // Resuming is a no-op when already playing, and position continues
    // from the paused point without rewinding.
    transport.resume().await.unwrap();
    transport.resume().await.unwrap();
    assert_eq!(transport.current_state(), TransportState::Playing);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(transport.status().await.elapsed_seconds > at_pause);

    transport.stop().await;
    assert_eq!(transport.current_state(), TransportState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_progress_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let transport = controller(dir.path());
    let mut observed = observe(&transport).await;

    transport.start_recording(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    transport.stop().await;

    // Samples emitted during the session are expected.
    let mut progress_seen = 0;
    while let Ok(event) = observed.try_recv() {
        if matches!(event, Observed::Progress(_)) {
            progress_seen += 1;
        }
    }
    assert!(progress_seen > 0, "expected progress during recording");

    // After Idle, nothing more may arrive until a new session starts.
    tokio::time::sleep(Duration::from_millis(150)).await;
    while let Ok(event) = observed.try_recv() {
        assert!(
            !matches!(event, Observed::Progress(_)),
            "stale progress after stop: {:?}",
            event
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_recorded_frames_read_back_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exact.wav");

    let mut sink = FileSink::create(
        &path,
        AudioFormat {
            sample_rate: RATE,
            channels: 1,
        },
    )
    .unwrap();
    sink.write(&[0.5f32; 100]).unwrap();
    let finalized = sink.close().unwrap();
    assert_eq!(finalized.frame_count, 100);

    let mut source = FileSource::open(&path).unwrap();
    let chunk = source.read(100).unwrap();
    assert_eq!(chunk.samples.len(), 100);
    assert!(chunk.reached_end);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_permission_denied_leaves_no_session_or_file() {
    let dir = tempfile::tempdir().unwrap();
    let transport = controller_with_source(dir.path(), Box::new(DeniedSource));
    let path = dir.path().join("denied.wav");

    let err = transport
        .start_recording(Some(path.clone()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictError::PermissionDenied { .. })
    ));
    assert_eq!(transport.current_state(), TransportState::Idle);
    assert!(!path.exists(), "failed start must not leave a stray file");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_toggle_record_cycles_idle_recording_idle() {
    let dir = tempfile::tempdir().unwrap();
    let transport = controller(dir.path());

    let started = transport.toggle_record().await.unwrap();
    assert!(matches!(started, RecordToggle::Started(_)));
    assert_eq!(transport.current_state(), TransportState::Recording);

    tokio::time::sleep(Duration::from_millis(60)).await;

    let stopped = transport.toggle_record().await.unwrap();
    match stopped {
        RecordToggle::Stopped(Some(finalized)) => assert!(finalized.frame_count > 0),
        other => panic!("expected a finalized recording, got {:?}", std::mem::discriminant(&other)),
    }
    assert_eq!(transport.current_state(), TransportState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_playback_defaults_to_last_recording() {
    let dir = tempfile::tempdir().unwrap();
    let transport = controller(dir.path());
    let mut observed = observe(&transport).await;

    // Nothing recorded yet: nothing to play.
    let err = transport.start_playback(None).await.unwrap_err();
    assert!(err.is_not_found());

    transport.start_recording(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let finalized = transport.stop().await.unwrap();

    let session = transport.start_playback(None).await.unwrap();
    assert_eq!(session.path, finalized.path);

    let finished = wait_for_finished(&mut observed).await;
    // The first finished event belongs to the recording session.
    assert!(finished.file.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_seek_moves_playback_position() {
    let dir = tempfile::tempdir().unwrap();
    let transport = controller(dir.path());

    let path = dir.path().join("seekable.wav");
    write_take(&path, RATE as usize * 5);

    transport.start_playback(Some(path)).await.unwrap();
    transport.seek(3.0).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = transport.status().await;
    assert!(
        status.elapsed_seconds >= 2.9,
        "expected position near 3.0, got {}",
        status.elapsed_seconds
    );

    transport.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pause_while_recording_is_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let transport = controller(dir.path());

    transport.start_recording(None).await.unwrap();
    let err = transport.pause().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictError::AlreadyActive { .. })
    ));
    assert_eq!(transport.current_state(), TransportState::Recording);

    transport.stop().await;
}
