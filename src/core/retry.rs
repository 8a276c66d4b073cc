//! Retry and back-off helpers for calls to the remote queue
//!
//! `retry_async` wraps a single remote operation (commit, lease extension)
//! with a fixed number of attempts. `BackOffPolicy` drives the exponential
//! delay the poll loop applies after failed fetches.

use std::time::Duration;
use tokio::time::sleep;

/// Configurable retry policy for async operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Policy that performs exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

/// Execute an async operation, retrying failed attempts per `policy`
///
/// # Examples
/// ```rust
/// use queue_listener::core::retry::{retry_async, RetryPolicy};
///
/// # async fn example() -> Result<String, String> {
/// let result = retry_async("commit", RetryPolicy::default(), || async {
///     Ok::<String, String>("deleted".to_string())
/// })
/// .await?;
/// # Ok(result)
/// # }
/// ```
pub async fn retry_async<F, T, E, Fut>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) if attempt < max_attempts => {
                log::debug!(
                    "Operation '{}' failed on attempt {}/{}, retrying in {:?}: {}",
                    operation_name,
                    attempt,
                    max_attempts,
                    policy.delay,
                    error
                );
                sleep(policy.delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Exponential back-off applied between polls after fetch failures
#[derive(Debug, Clone, PartialEq)]
pub struct BackOffPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for BackOffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackOffPolicy {
    /// Begin a new back-off sequence
    pub fn start(&self) -> BackOff {
        BackOff {
            policy: self.clone(),
            next_delay: self.initial_delay,
        }
    }
}

/// State of one back-off sequence; each call to `next_delay` grows the delay
#[derive(Debug, Clone)]
pub struct BackOff {
    policy: BackOffPolicy,
    next_delay: Duration,
}

impl BackOff {
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next_delay.min(self.policy.max_delay);
        self.next_delay = self
            .next_delay
            .mul_f64(self.policy.multiplier.max(1.0))
            .min(self.policy.max_delay);
        current
    }

    /// Sleep for the next delay in the sequence
    pub async fn back_off(&mut self) {
        let delay = self.next_delay();
        log::trace!("Backing off for {:?}", delay);
        sleep(delay).await;
    }
}
