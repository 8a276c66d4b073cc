//! Adaptive switch between one-batch-at-a-time and overlapping polls
//!
//! A queue that is mostly empty gains nothing from several polls in flight,
//! so the handler starts in [`ThroughputMode::Low`]: a new batch is granted
//! only once the previous one is fully released. As soon as a fetch comes
//! back with messages (reported as [`ReleaseReason::PartialFetch`] for the
//! unused remainder, possibly zero) it moves to [`ThroughputMode::High`]
//! and grants every request up to a batch. An empty fetch
//! ([`ReleaseReason::NoneFetched`]) drops it back to `Low`, but the request
//! right after it is still granted even while other batches are outstanding.
//! Only later requests wait for the outstanding permits to come back.

use crate::backpressure::{BackPressureHandler, BatchAwareBackPressureHandler, ReleaseReason};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ThroughputMode {
    Low,
    High,
}

#[derive(Debug)]
struct ThroughputState {
    mode: ThroughputMode,
    outstanding: usize,
    /// Next request is granted regardless of outstanding permits
    trial_pending: bool,
    draining: bool,
}

pub struct ThroughputAdaptiveHandler {
    id: String,
    batch_size: usize,
    state: Mutex<ThroughputState>,
}

impl ThroughputAdaptiveHandler {
    pub fn new(batch_size: usize) -> Self {
        Self {
            id: "throughput".to_string(),
            batch_size,
            state: Mutex::new(ThroughputState {
                mode: ThroughputMode::Low,
                outstanding: 0,
                trial_pending: false,
                draining: false,
            }),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn mode(&self) -> ThroughputMode {
        self.lock().mode
    }

    /// Permits this handler has granted and not yet seen released
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    fn lock(&self) -> MutexGuard<'_, ThroughputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl BackPressureHandler for ThroughputAdaptiveHandler {
    async fn request(&self, amount: usize) -> usize {
        let mut state = self.lock();
        if state.draining {
            return 0;
        }
        if state.mode == ThroughputMode::Low && state.outstanding > 0 && !state.trial_pending {
            log::trace!(
                "[{}] Low throughput, {} permits still outstanding",
                self.id,
                state.outstanding
            );
            return 0;
        }
        let granted = amount.min(self.batch_size);
        if granted > 0 {
            state.trial_pending = false;
        }
        state.outstanding += granted;
        granted
    }

    fn release(&self, amount: usize, reason: ReleaseReason) {
        let mut state = self.lock();
        state.outstanding = state.outstanding.saturating_sub(amount);

        let next_mode = match reason {
            ReleaseReason::PartialFetch => {
                state.trial_pending = false;
                ThroughputMode::High
            }
            ReleaseReason::NoneFetched => {
                state.trial_pending = true;
                ThroughputMode::Low
            }
            ReleaseReason::Processed | ReleaseReason::Limited => state.mode,
        };
        if next_mode != state.mode {
            log::debug!(
                "[{}] Throughput {} -> {} after {}",
                self.id,
                state.mode,
                next_mode,
                reason
            );
            state.mode = next_mode;
        }
    }

    async fn drain(&self, _timeout: Duration) -> bool {
        self.lock().draining = true;
        true
    }
}

#[async_trait::async_trait]
impl BatchAwareBackPressureHandler for ThroughputAdaptiveHandler {
    async fn request_batch(&self) -> usize {
        self.request(self.batch_size).await
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}
