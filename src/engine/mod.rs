pub mod clock;
pub mod error;
pub mod observer;
pub mod progress;
pub mod session;
pub mod sink;
pub mod source;
pub mod transport;

pub use clock::{Clock, MonotonicClock};
pub use error::{ConflictError, EngineError, IoError};
pub use observer::{NullObserver, ObserverHandle, TransportObserver};
pub use progress::ProgressNotifier;
pub use session::{
    AudioFormat, FinalizedFile, FinishedEvent, ProgressSample, Session, SessionMode,
    TransportState,
};
pub use sink::FileSink;
pub use source::{FileSource, ReadChunk};
pub use transport::{
    PlayToggle, RecordToggle, TransportConfig, TransportController, TransportStatus,
};
