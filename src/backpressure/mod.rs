//! Back-pressure: permits bounding how many messages may be in flight
//!
//! The poll loop asks a handler for permits before every fetch and never
//! fetches more messages than it was granted. Every granted permit is handed
//! back exactly once through [`BackPressureHandler::release`], tagged with a
//! [`ReleaseReason`] so adaptive handlers can tell a short fetch from a
//! processed message.
//!
//! Handlers compose: [`CompositeBackPressureHandler`] threads a request
//! through an ordered chain, each handler granting at most what the previous
//! one granted, and hands unused grants back as [`ReleaseReason::Limited`].
//!
//! | Handler                          | Role                                        |
//! |----------------------------------|---------------------------------------------|
//! | [`ConcurrencyLimiterHandler`]    | absolute ceiling on in-flight messages      |
//! | [`ThroughputAdaptiveHandler`]    | one batch at a time until fetches come full |
//! | [`FullBatchHandler`]             | only ever grants a complete batch           |

mod composite;
mod concurrency;
mod full_batch;
mod throughput;

// Public API module
pub mod api;

pub use api::*;

use std::time::Duration;

/// Why permits are being returned
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseReason {
    /// A message finished processing (successfully or not)
    Processed,
    /// A downstream handler in a chain granted fewer permits than this one
    Limited,
    /// A fetch returned no messages at all
    NoneFetched,
    /// A fetch returned fewer messages than permits were held for
    PartialFetch,
}

/// Which handler chain a container builds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BackPressureMode {
    /// Concurrency ceiling plus adaptive throughput
    #[default]
    Auto,
    /// As `Auto`, but a poll only happens once a whole batch is available
    AlwaysPollMaxMessages,
    /// Concurrency ceiling only; batches always overlap
    FixedHighThroughput,
}

/// Issues and reclaims permits for in-flight messages
#[async_trait::async_trait]
pub trait BackPressureHandler: Send + Sync {
    /// Request up to `amount` permits
    ///
    /// Returns the number granted, between zero and `amount`. May wait, but
    /// only for a bounded time; a timeout is reported as zero.
    async fn request(&self, amount: usize) -> usize;

    /// Return `amount` previously granted permits. Never blocks.
    fn release(&self, amount: usize, reason: ReleaseReason);

    /// Stop granting permits and wait up to `timeout` for all outstanding
    /// ones to come back. Returns whether that happened in time.
    async fn drain(&self, timeout: Duration) -> bool;
}

/// A handler that knows the container's batch size
#[async_trait::async_trait]
pub trait BatchAwareBackPressureHandler: BackPressureHandler {
    /// Request permits for one full batch
    async fn request_batch(&self) -> usize;

    fn batch_size(&self) -> usize;
}

#[cfg(test)]
mod tests;
