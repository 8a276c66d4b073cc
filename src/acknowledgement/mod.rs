//! Acknowledgement: committing successfully processed messages
//!
//! A message is only ever committed after its listener succeeded. The
//! processors differ in *when* commits are sent:
//!
//! - [`ImmediateAcknowledgementProcessor`] commits as soon as processing ends
//! - [`BatchingAcknowledgementProcessor`] buffers and flushes once
//!   `ack_threshold` messages are pending or `ack_interval` has passed since
//!   the oldest pending one
//!
//! and in the order they are sent, selected by [`AcknowledgementOrdering`].
//! Commits go out in chunks of at most `max_acknowledgements_per_batch`, are
//! retried per [`RetryPolicy`](crate::core::retry::RetryPolicy) and reported
//! to an [`AcknowledgementResultCallback`].

mod batching;
mod executor;
mod immediate;

pub use batching::BatchingAcknowledgementProcessor;
pub use executor::{AcknowledgementExecutor, ScheduledAcknowledgement};
pub use immediate::ImmediateAcknowledgementProcessor;

use crate::queue::{message_ids, ClientError, Message};
use std::sync::Arc;

/// Largest number of receipt handles committed in one call
pub const DEFAULT_MAX_ACKNOWLEDGEMENTS_PER_BATCH: usize = 10;

/// Order in which commits are sent
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AcknowledgementOrdering {
    /// No ordering; commits run concurrently
    #[default]
    Parallel,
    /// One global sequence in the order acknowledgements arrive
    Ordered,
    /// One sequence per message group; groups commit independently
    OrderedByGroup,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AcknowledgementError {
    #[error("Failed to acknowledge messages [{message_ids}]: {source}")]
    Commit {
        message_ids: String,
        #[source]
        source: ClientError,
    },

    #[error("ORDERED_BY_GROUP acknowledgement requires a message grouping function")]
    MissingGroupingFunction,
}

impl AcknowledgementError {
    pub(crate) fn commit(messages: &[Arc<Message>], source: ClientError) -> Self {
        Self::Commit {
            message_ids: message_ids(messages).join(", "),
            source,
        }
    }
}

pub type AcknowledgementResult<T> = Result<T, AcknowledgementError>;

/// Receives the outcome of every commit call
pub trait AcknowledgementResultCallback: Send + Sync {
    fn on_success(&self, _messages: &[Arc<Message>]) {}

    fn on_failure(&self, messages: &[Arc<Message>], error: &AcknowledgementError) {
        log::error!(
            "Acknowledgement failed for {} messages: {}",
            messages.len(),
            error
        );
    }
}

/// Logs commit failures; successes are only traced
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAcknowledgementCallback;

impl AcknowledgementResultCallback for LoggingAcknowledgementCallback {
    fn on_success(&self, messages: &[Arc<Message>]) {
        log::trace!("Acknowledged messages {:?}", message_ids(messages));
    }
}

/// Takes processed messages and gets them committed
#[async_trait::async_trait]
pub trait AcknowledgementProcessor: Send + Sync {
    /// Hand over messages whose listener succeeded
    ///
    /// Commit failures never surface here; they go to the result callback.
    async fn on_acknowledge(&self, messages: Vec<Arc<Message>>);

    /// Begin background work, if any. Must be called within a tokio runtime.
    fn start(&self);

    /// Send everything still pending and wait for commits in progress,
    /// bounded by the processor's shutdown timeout
    ///
    /// Acknowledgements arriving after `stop` are committed immediately.
    async fn stop(&self) -> bool;

    fn ordering(&self) -> AcknowledgementOrdering;
}

#[cfg(test)]
mod tests;
