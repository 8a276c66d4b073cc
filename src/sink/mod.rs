//! Message sinks: how a fetched batch is dispatched to the listener
//!
//! A sink decides the concurrency of a batch. [`FanOutMessageSink`] runs every
//! message at once, [`BatchMessageSink`] hands the batch over as one unit and
//! [`OrderedMessageSink`] runs messages one after another. Adapters wrap a
//! sink: [`MessageGroupingSinkAdapter`] splits batches into FIFO groups that
//! run in parallel while staying ordered inside, and
//! [`MessageVisibilityExtendingSinkAdapter`] keeps leases alive while the
//! wrapped sink works.
//!
//! `emit` resolves once every message of the batch has been processed, which
//! is what the container waits for when it shuts down.

mod batch;
mod context;
mod fan_out;
mod grouping;
mod ordered;
mod visibility;

pub use batch::BatchMessageSink;
pub use context::{CompletionHook, MessageProcessingContext};
pub use fan_out::FanOutMessageSink;
pub use grouping::MessageGroupingSinkAdapter;
pub use ordered::OrderedMessageSink;
pub use visibility::MessageVisibilityExtendingSinkAdapter;

use crate::queue::Message;
use std::sync::Arc;

/// Dispatches batches of messages for processing
#[async_trait::async_trait]
pub trait MessageSink: Send + Sync {
    /// Process `messages`, resolving once all of them are done
    async fn emit(&self, messages: Vec<Arc<Message>>, context: MessageProcessingContext);
}

#[cfg(test)]
mod tests;
