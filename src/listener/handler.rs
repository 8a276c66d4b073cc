//! Application-facing callbacks

use crate::listener::error::{ListenerError, ListenerResult};
use crate::queue::{message_ids, Message};
use std::sync::Arc;

/// Handles messages one at a time
///
/// Returning `Ok` marks the message for acknowledgement; returning `Err`
/// leaves it on the queue to be redelivered once its lease runs out.
#[async_trait::async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: Arc<Message>) -> ListenerResult<()>;
}

#[async_trait::async_trait]
impl<F, Fut> MessageListener for F
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ListenerResult<()>> + Send,
{
    async fn on_message(&self, message: Arc<Message>) -> ListenerResult<()> {
        self(message).await
    }
}

/// Handles a whole fetched batch in one call; the batch succeeds or fails as a unit
#[async_trait::async_trait]
pub trait BatchMessageListener: Send + Sync {
    async fn on_messages(&self, messages: Vec<Arc<Message>>) -> ListenerResult<()>;
}

/// The listener a container dispatches to
#[derive(Clone)]
pub enum Listener {
    Single(Arc<dyn MessageListener>),
    Batch(Arc<dyn BatchMessageListener>),
}

impl Listener {
    pub fn single(listener: impl MessageListener + 'static) -> Self {
        Self::Single(Arc::new(listener))
    }

    pub fn batch(listener: impl BatchMessageListener + 'static) -> Self {
        Self::Batch(Arc::new(listener))
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Listener::Batch(_))
    }
}

/// Notified when application code fails to process messages
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, messages: &[Arc<Message>], error: &ListenerError);
}

/// Logs listener failures and otherwise leaves the messages to be redelivered
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle(&self, messages: &[Arc<Message>], error: &ListenerError) {
        log::warn!(
            "Listener failed for messages {:?}: {}",
            message_ids(messages),
            error
        );
    }
}

impl<F> ErrorHandler for F
where
    F: Fn(&[Arc<Message>], &ListenerError) + Send + Sync,
{
    fn handle(&self, messages: &[Arc<Message>], error: &ListenerError) {
        self(messages, error)
    }
}
