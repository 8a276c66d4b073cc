use crate::queue::Message;
use crate::sink::{MessageProcessingContext, MessageSink};
use std::sync::Arc;

/// Processes messages strictly one after another, in batch order
///
/// A failed message does not stop the ones behind it.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrderedMessageSink;

#[async_trait::async_trait]
impl MessageSink for OrderedMessageSink {
    async fn emit(&self, messages: Vec<Arc<Message>>, context: MessageProcessingContext) {
        for message in messages {
            context.process(vec![message]).await;
        }
    }
}
