//! Chain of back-pressure handlers acting as one

use crate::backpressure::{BackPressureHandler, BatchAwareBackPressureHandler, ReleaseReason};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Threads each request through an ordered list of handlers
///
/// Handler *i+1* is asked for the amount handler *i* granted, and the last
/// grant is the result. Every handler that granted more than the result gets
/// the difference back as [`ReleaseReason::Limited`] before `request`
/// returns, so no handler keeps permits that were never used.
///
/// When a pass grants nothing, `request` waits for the next release (or
/// `no_permits_returned_wait_timeout`) before returning zero, which keeps an
/// idle poll loop from spinning.
pub struct CompositeBackPressureHandler {
    id: String,
    handlers: Vec<Arc<dyn BackPressureHandler>>,
    batch_size: usize,
    no_permits_returned_wait_timeout: Duration,
    permits_released: Notify,
}

impl CompositeBackPressureHandler {
    pub fn new(
        handlers: Vec<Arc<dyn BackPressureHandler>>,
        batch_size: usize,
        no_permits_returned_wait_timeout: Duration,
    ) -> Self {
        Self {
            id: "composite".to_string(),
            handlers,
            batch_size,
            no_permits_returned_wait_timeout,
            permits_released: Notify::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait::async_trait]
impl BackPressureHandler for CompositeBackPressureHandler {
    async fn request(&self, amount: usize) -> usize {
        // Registered before the pass so a release racing with it still wakes us
        let released = self.permits_released.notified();
        tokio::pin!(released);
        released.as_mut().enable();

        let mut grants = Vec::with_capacity(self.handlers.len());
        let mut permits = amount;
        for handler in &self.handlers {
            permits = handler.request(permits).await;
            grants.push(permits);
            if permits == 0 {
                break;
            }
        }

        for (handler, granted) in self.handlers.iter().zip(&grants) {
            if *granted > permits {
                handler.release(granted - permits, ReleaseReason::Limited);
            }
        }

        if permits == 0 && amount > 0 {
            log::trace!(
                "[{}] No permits granted, waiting up to {:?} for a release",
                self.id,
                self.no_permits_returned_wait_timeout
            );
            let _ = tokio::time::timeout(self.no_permits_returned_wait_timeout, released).await;
        }
        permits
    }

    fn release(&self, amount: usize, reason: ReleaseReason) {
        for handler in &self.handlers {
            handler.release(amount, reason);
        }
        if amount > 0 {
            self.permits_released.notify_waiters();
        }
    }

    async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        // Waiting requesters should observe the drain promptly
        self.permits_released.notify_waiters();

        let mut drained = true;
        for handler in &self.handlers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            drained &= handler.drain(remaining).await;
        }
        log::debug!("[{}] Drain finished, complete: {}", self.id, drained);
        drained
    }
}

#[async_trait::async_trait]
impl BatchAwareBackPressureHandler for CompositeBackPressureHandler {
    async fn request_batch(&self) -> usize {
        self.request(self.batch_size).await
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}
