//! Counting permit pool bounding the total number of in-flight messages

use crate::backpressure::{BackPressureHandler, BatchAwareBackPressureHandler, ReleaseReason};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Caps in-flight messages at `total_permits`
///
/// `request` grabs whatever permits are free without waiting. Only when none
/// are free does it wait, up to `acquire_timeout`, for a first one, then
/// takes any others that became free alongside it.
pub struct ConcurrencyLimiterHandler {
    id: String,
    batch_size: usize,
    total_permits: usize,
    acquire_timeout: Duration,
    semaphore: Semaphore,
    in_flight: AtomicUsize,
    draining: AtomicBool,
}

impl ConcurrencyLimiterHandler {
    pub fn new(total_permits: usize, batch_size: usize, acquire_timeout: Duration) -> Self {
        Self {
            id: "concurrency-limiter".to_string(),
            batch_size,
            total_permits,
            acquire_timeout,
            semaphore: Semaphore::new(total_permits),
            in_flight: AtomicUsize::new(0),
            draining: AtomicBool::new(false),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn total_permits(&self) -> usize {
        self.total_permits
    }

    /// Permits granted and not yet released
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    fn try_take(&self, wanted: usize) -> usize {
        let mut taken = 0;
        while taken < wanted {
            match self.semaphore.try_acquire() {
                Ok(permit) => {
                    permit.forget();
                    taken += 1;
                }
                Err(_) => break,
            }
        }
        taken
    }
}

#[async_trait::async_trait]
impl BackPressureHandler for ConcurrencyLimiterHandler {
    async fn request(&self, amount: usize) -> usize {
        if amount == 0 || self.draining.load(Ordering::Acquire) {
            return 0;
        }
        let wanted = amount.min(self.total_permits);

        let mut granted = self.try_take(wanted);
        if granted == 0 {
            log::trace!(
                "[{}] No permits available, waiting up to {:?}",
                self.id,
                self.acquire_timeout
            );
            match tokio::time::timeout(self.acquire_timeout, self.semaphore.acquire()).await {
                Ok(Ok(permit)) => {
                    permit.forget();
                    granted = 1 + self.try_take(wanted - 1);
                }
                Ok(Err(_)) => return 0,
                Err(_) => {
                    log::trace!("[{}] Timed out waiting for permits", self.id);
                    return 0;
                }
            }
        }

        // Drain began while we were acquiring
        if self.draining.load(Ordering::Acquire) {
            self.semaphore.add_permits(granted);
            return 0;
        }

        self.in_flight.fetch_add(granted, Ordering::AcqRel);
        log::trace!(
            "[{}] Granted {}/{} permits ({} available)",
            self.id,
            granted,
            amount,
            self.semaphore.available_permits()
        );
        granted
    }

    fn release(&self, amount: usize, reason: ReleaseReason) {
        if amount == 0 {
            return;
        }
        let previous = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(amount))
            })
            .unwrap_or_default();
        let returned = amount.min(previous);
        if returned < amount {
            log::warn!(
                "[{}] Release of {} permits ({}) exceeds the {} in flight",
                self.id,
                amount,
                reason,
                previous
            );
        }
        self.semaphore.add_permits(returned);
        log::trace!(
            "[{}] Released {} permits ({}), {} available",
            self.id,
            returned,
            reason,
            self.semaphore.available_permits()
        );
    }

    async fn drain(&self, timeout: Duration) -> bool {
        self.draining.store(true, Ordering::Release);
        log::debug!(
            "[{}] Draining, {} permits in flight",
            self.id,
            self.in_flight()
        );

        let total = u32::try_from(self.total_permits).unwrap_or(u32::MAX);
        match tokio::time::timeout(timeout, self.semaphore.acquire_many(total)).await {
            Ok(Ok(permits)) => {
                // Held for good; nothing is granted after a drain
                permits.forget();
                log::debug!("[{}] Drained", self.id);
                true
            }
            Ok(Err(_)) => false,
            Err(_) => {
                log::warn!(
                    "[{}] Drain timed out after {:?} with {} permits in flight",
                    self.id,
                    timeout,
                    self.in_flight()
                );
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl BatchAwareBackPressureHandler for ConcurrencyLimiterHandler {
    async fn request_batch(&self) -> usize {
        self.request(self.batch_size).await
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}
