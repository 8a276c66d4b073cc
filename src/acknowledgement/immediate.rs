use crate::acknowledgement::{
    AcknowledgementExecutor, AcknowledgementOrdering, AcknowledgementProcessor,
};
use crate::queue::Message;
use std::sync::Arc;

/// Commits each acknowledgement as soon as it arrives
///
/// `on_acknowledge` returns once the commit has been sent (or given up on),
/// so under `Ordered` the caller also waits for every earlier commit.
pub struct ImmediateAcknowledgementProcessor {
    executor: Arc<AcknowledgementExecutor>,
}

impl ImmediateAcknowledgementProcessor {
    pub fn new(executor: AcknowledgementExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }
}

#[async_trait::async_trait]
impl AcknowledgementProcessor for ImmediateAcknowledgementProcessor {
    async fn on_acknowledge(&self, messages: Vec<Arc<Message>>) {
        self.executor.acknowledge(messages).await;
    }

    fn start(&self) {}

    async fn stop(&self) -> bool {
        true
    }

    fn ordering(&self) -> AcknowledgementOrdering {
        self.executor.ordering()
    }
}
