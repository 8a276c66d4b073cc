//! Lease extension for long-running processing

use crate::core::retry::{retry_async, RetryPolicy};
use crate::queue::{Message, QueueClient};
use crate::sink::{CompletionHook, MessageProcessingContext, MessageSink};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Keeps messages hidden from other consumers while the wrapped sink processes them
///
/// Every `message_visibility / 2` the lease of each message still being
/// processed is extended to `message_visibility` from now, so a lease never
/// runs out under a message that is making progress. A message leaves the
/// set as soon as its processing ends. Extension stops when the wrapped
/// sink's `emit` completes.
pub struct MessageVisibilityExtendingSinkAdapter {
    inner: Arc<dyn MessageSink>,
    client: Arc<dyn QueueClient>,
    message_visibility: Duration,
    retry_policy: RetryPolicy,
}

impl MessageVisibilityExtendingSinkAdapter {
    pub fn new(
        inner: Arc<dyn MessageSink>,
        client: Arc<dyn QueueClient>,
        message_visibility: Duration,
    ) -> Self {
        Self {
            inner,
            client,
            message_visibility,
            retry_policy: RetryPolicy::no_retry(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn extension_period(&self) -> Duration {
        (self.message_visibility / 2).max(Duration::from_millis(1))
    }
}

#[async_trait::async_trait]
impl MessageSink for MessageVisibilityExtendingSinkAdapter {
    async fn emit(&self, messages: Vec<Arc<Message>>, context: MessageProcessingContext) {
        let in_flight: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(
            messages
                .iter()
                .map(|message| message.receipt_handle().to_string())
                .collect(),
        ));

        let tracked = in_flight.clone();
        let hook: CompletionHook = Arc::new(move |done: &[Arc<Message>]| {
            let mut tracked = tracked.lock().unwrap_or_else(PoisonError::into_inner);
            for message in done {
                tracked.remove(message.receipt_handle());
            }
        });

        let (done_tx, done_rx) = oneshot::channel::<()>();
        let extender = tokio::spawn(extend_leases(
            self.client.clone(),
            in_flight,
            self.message_visibility,
            self.extension_period(),
            self.retry_policy.clone(),
            done_rx,
        ));

        self.inner
            .emit(messages, context.with_completion_hook(hook))
            .await;

        let _ = done_tx.send(());
        if let Err(e) = extender.await {
            log::error!("Lease extension task failed: {}", e);
        }
    }
}

async fn extend_leases(
    client: Arc<dyn QueueClient>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    message_visibility: Duration,
    period: Duration,
    retry_policy: RetryPolicy,
    mut done: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = &mut done => return,
            _ = ticker.tick() => {}
        }

        let receipt_handles: Vec<String> = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        if receipt_handles.is_empty() {
            continue;
        }

        log::trace!(
            "Extending lease of {} messages by {:?}",
            receipt_handles.len(),
            message_visibility
        );
        let result = retry_async("extend_lease", retry_policy.clone(), || {
            client.extend_lease_batch(&receipt_handles, message_visibility)
        })
        .await;
        if let Err(e) = result {
            log::warn!("Could not extend message leases: {}", e);
        }
    }
}
