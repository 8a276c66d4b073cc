use crate::queue::Message;
use crate::sink::{MessageProcessingContext, MessageSink};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Processes every message of a batch concurrently, each on its own task
///
/// A slow or failing message holds up nobody but itself; `emit` finishes
/// when the last one does.
#[derive(Debug, Default, Clone, Copy)]
pub struct FanOutMessageSink;

#[async_trait::async_trait]
impl MessageSink for FanOutMessageSink {
    async fn emit(&self, messages: Vec<Arc<Message>>, context: MessageProcessingContext) {
        let mut tasks = JoinSet::new();
        for message in messages {
            let context = context.clone();
            tasks.spawn(async move { context.process(vec![message]).await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                log::error!("Message task failed: {}", e);
            }
        }
    }
}
