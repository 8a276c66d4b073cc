//! What happens to a message once a sink dispatches it

use crate::acknowledgement::AcknowledgementProcessor;
use crate::backpressure::{BackPressureHandler, ReleaseReason};
use crate::listener::{ErrorHandler, Listener, ListenerError, ListenerResult};
use crate::queue::{message_ids, Message};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Called with messages once they are fully processed
pub type CompletionHook = Arc<dyn Fn(&[Arc<Message>]) + Send + Sync>;

/// Everything a sink needs to process a dispatch unit end to end
///
/// For each unit: run the listener, acknowledge on success or report to the
/// error handler on failure, run completion hooks, then release one
/// [`ReleaseReason::Processed`] permit per message. The permits are
/// released whatever the outcome, panics included.
#[derive(Clone)]
pub struct MessageProcessingContext {
    listener: Listener,
    acknowledgement: Arc<dyn AcknowledgementProcessor>,
    error_handler: Arc<dyn ErrorHandler>,
    back_pressure: Arc<dyn BackPressureHandler>,
    completion_hooks: Vec<CompletionHook>,
}

impl MessageProcessingContext {
    pub fn new(
        listener: Listener,
        acknowledgement: Arc<dyn AcknowledgementProcessor>,
        error_handler: Arc<dyn ErrorHandler>,
        back_pressure: Arc<dyn BackPressureHandler>,
    ) -> Self {
        Self {
            listener,
            acknowledgement,
            error_handler,
            back_pressure,
            completion_hooks: Vec::new(),
        }
    }

    /// A copy of this context that also runs `hook` after each unit
    pub fn with_completion_hook(&self, hook: CompletionHook) -> Self {
        let mut context = self.clone();
        context.completion_hooks.push(hook);
        context
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Process `messages` as one unit; returns whether the listener succeeded
    ///
    /// A batch listener receives the unit in one call. A single-message
    /// listener receives its messages one after another, each succeeding or
    /// failing on its own.
    pub async fn process(&self, messages: Vec<Arc<Message>>) -> bool {
        if messages.is_empty() {
            return true;
        }
        match &self.listener {
            Listener::Batch(listener) => {
                let result = guard_panics(&messages, listener.on_messages(messages.clone())).await;
                self.complete(messages, result).await
            }
            Listener::Single(listener) => {
                let mut all_succeeded = true;
                for message in messages {
                    let unit = vec![message.clone()];
                    let result = guard_panics(&unit, listener.on_message(message)).await;
                    all_succeeded &= self.complete(unit, result).await;
                }
                all_succeeded
            }
        }
    }

    async fn complete(&self, messages: Vec<Arc<Message>>, result: ListenerResult<()>) -> bool {
        let succeeded = result.is_ok();
        let count = messages.len();
        match result {
            Ok(()) => {
                log::trace!("Processed messages {:?}", message_ids(&messages));
                for hook in &self.completion_hooks {
                    hook(&messages);
                }
                self.acknowledgement.on_acknowledge(messages).await;
            }
            Err(error) => {
                self.error_handler.handle(&messages, &error);
                for hook in &self.completion_hooks {
                    hook(&messages);
                }
            }
        }
        self.back_pressure.release(count, ReleaseReason::Processed);
        succeeded
    }
}

async fn guard_panics<F>(messages: &[Arc<Message>], listener_call: F) -> ListenerResult<()>
where
    F: std::future::Future<Output = ListenerResult<()>>,
{
    match AssertUnwindSafe(listener_call).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(ListenerError::Panicked {
            message_ids: message_ids(messages).join(", "),
        }),
    }
}
