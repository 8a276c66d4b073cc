use crate::backpressure::{BackPressureHandler, BatchAwareBackPressureHandler, ReleaseReason};
use std::time::Duration;

/// All-or-nothing gate: grants a whole batch or nothing
///
/// Placed last in a chain, it turns any partial grant from the handlers
/// before it into zero, so polls always ask for `batch_size` messages.
pub struct FullBatchHandler {
    batch_size: usize,
}

impl FullBatchHandler {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

#[async_trait::async_trait]
impl BackPressureHandler for FullBatchHandler {
    async fn request(&self, amount: usize) -> usize {
        if amount == self.batch_size {
            amount
        } else {
            0
        }
    }

    fn release(&self, _amount: usize, _reason: ReleaseReason) {}

    async fn drain(&self, _timeout: Duration) -> bool {
        true
    }
}

#[async_trait::async_trait]
impl BatchAwareBackPressureHandler for FullBatchHandler {
    async fn request_batch(&self) -> usize {
        self.batch_size
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}
