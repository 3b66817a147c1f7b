//! Periodic progress delivery, decoupled from any UI toolkit.
//!
//! A notifier task ticks at a fixed period while the transport is in
//! Recording or Playing. Each tick reads the last-published position cell
//! and hands a `ProgressSample` to the registered observer. The task is
//! aborted on every transition out of its state and additionally gates
//! each tick on the state cell, so nothing is emitted after stop or pause.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::observer::ObserverHandle;
use super::session::{PositionCell, SessionMode, StateCell, TransportState};

pub const DEFAULT_TICK: Duration = Duration::from_millis(30);

pub struct ProgressNotifier {
    period: Duration,
    position: Arc<PositionCell>,
    state: Arc<StateCell>,
    observer: ObserverHandle,
}

impl ProgressNotifier {
    pub fn new(
        period: Duration,
        position: Arc<PositionCell>,
        state: Arc<StateCell>,
        observer: ObserverHandle,
    ) -> Self {
        Self {
            period,
            position,
            state,
            observer,
        }
    }

    /// Spawn the tick task for one active phase. The task exits on its own
    /// when the transport leaves the expected state; the controller also
    /// aborts the handle on transitions so no tick outlives a session.
    pub fn spawn(&self, mode: SessionMode) -> JoinHandle<()> {
        let period = self.period;
        let position = self.position.clone();
        let state = self.state.clone();
        let observer = self.observer.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let expected = match mode {
                    SessionMode::Recording => TransportState::Recording,
                    SessionMode::Playing => TransportState::Playing,
                };
                if state.get() != expected {
                    break;
                }

                let sample = position.sample(mode);
                observer.current().await.on_progress(sample).await;
            }
        })
    }
}
