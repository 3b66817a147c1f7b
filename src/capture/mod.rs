pub mod mic_source;

pub use mic_source::MicSource;

use tokio::sync::mpsc;

use crate::engine::EngineError;

/// A producer of interleaved f32 PCM chunks for the recording path.
///
/// `start` hands the source a bounded channel; the source pushes chunks
/// into it from its own execution context until stopped. Dropping the
/// sender is how a source signals "no more frames".
pub trait CaptureSource: Send {
    /// Begin capturing into `frames`.
    fn start(&mut self, frames: mpsc::Sender<Vec<f32>>) -> Result<(), EngineError>;

    /// Stop capturing and release the device. Blocks until the capture
    /// context has shut down and the channel sender is dropped.
    fn stop(&mut self);

    /// Whether this source is currently capturing.
    fn is_active(&self) -> bool;

    /// The sample rate of captured audio.
    fn sample_rate(&self) -> u32;

    /// Channels per frame of captured audio.
    fn channels(&self) -> u16;
}
