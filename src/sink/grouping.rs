//! FIFO dispatch: ordered within a message group, parallel across groups

use crate::core::sequencer::GroupSequencer;
use crate::queue::{Message, MessageGroupingFunction};
use crate::sink::{MessageProcessingContext, MessageSink};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Splits each batch by message group and emits every group to the wrapped sink
///
/// Groups of one batch run concurrently. A group's slice of a batch is only
/// emitted after that group's slice of every earlier batch has finished, so
/// ordering holds across polls as well as within one. Wrap an ordered sink
/// (or a batch sink) to get strict per-group ordering.
pub struct MessageGroupingSinkAdapter {
    inner: Arc<dyn MessageSink>,
    grouping: MessageGroupingFunction,
    sequencer: Arc<GroupSequencer>,
}

impl MessageGroupingSinkAdapter {
    pub fn new(inner: Arc<dyn MessageSink>, grouping: MessageGroupingFunction) -> Self {
        Self {
            inner,
            grouping,
            sequencer: GroupSequencer::new(),
        }
    }

    /// Groups with dispatch in progress or queued
    pub fn active_groups(&self) -> usize {
        self.sequencer.active_keys()
    }

    /// Partition preserving first-seen group order and in-group message order
    fn partition(&self, messages: Vec<Arc<Message>>) -> Vec<(String, Vec<Arc<Message>>)> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Arc<Message>>> = HashMap::new();
        for message in messages {
            let key = (self.grouping)(&message);
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(message);
        }
        order
            .into_iter()
            .filter_map(|key| groups.remove(&key).map(|group| (key, group)))
            .collect()
    }
}

#[async_trait::async_trait]
impl MessageSink for MessageGroupingSinkAdapter {
    async fn emit(&self, messages: Vec<Arc<Message>>, context: MessageProcessingContext) {
        let mut tasks = JoinSet::new();
        for (group, messages) in self.partition(messages) {
            let mut slot = self.sequencer.enqueue(&group);
            let inner = self.inner.clone();
            let context = context.clone();
            tasks.spawn(async move {
                slot.wait_turn().await;
                log::trace!(
                    "Dispatching {} messages of group {}",
                    messages.len(),
                    slot.key()
                );
                inner.emit(messages, context).await;
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                log::error!("Message group task failed: {}", e);
            }
        }
    }
}
