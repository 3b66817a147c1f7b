//! Observer interface consumed by an external UI or service layer.
//!
//! Exactly one observer is registered at a time; replacing it swaps the
//! target for every later callback. Callbacks are delivered from engine
//! tasks and must not block for long.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::error::EngineError;
use super::session::{FinishedEvent, ProgressSample};

#[async_trait]
pub trait TransportObserver: Send + Sync {
    async fn on_progress(&self, _sample: ProgressSample) {}

    async fn on_finished(&self, _event: FinishedEvent) {}

    async fn on_error(&self, _error: EngineError) {}
}

/// Observer that ignores everything. Backs the engine until the service
/// registers a real one.
pub struct NullObserver;

#[async_trait]
impl TransportObserver for NullObserver {}

/// Replaceable slot holding the registered observer.
#[derive(Clone)]
pub struct ObserverHandle {
    inner: Arc<RwLock<Arc<dyn TransportObserver>>>,
}

impl ObserverHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(NullObserver))),
        }
    }

    pub async fn set(&self, observer: Arc<dyn TransportObserver>) {
        *self.inner.write().await = observer;
    }

    pub async fn current(&self) -> Arc<dyn TransportObserver> {
        self.inner.read().await.clone()
    }
}

impl Default for ObserverHandle {
    fn default() -> Self {
        Self::new()
    }
}
