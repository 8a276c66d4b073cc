use crate::queue::Message;
use crate::sink::{MessageProcessingContext, MessageSink};
use std::sync::Arc;

/// Hands the whole batch to the listener as one unit
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchMessageSink;

#[async_trait::async_trait]
impl MessageSink for BatchMessageSink {
    async fn emit(&self, messages: Vec<Arc<Message>>, context: MessageProcessingContext) {
        log::trace!("Dispatching batch of {} messages", messages.len());
        context.process(messages).await;
    }
}
