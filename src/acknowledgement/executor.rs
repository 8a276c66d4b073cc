//! Ordering and sending of commit calls, shared by both processors

use crate::acknowledgement::{
    AcknowledgementError, AcknowledgementOrdering, AcknowledgementResult,
    AcknowledgementResultCallback, LoggingAcknowledgementCallback,
    DEFAULT_MAX_ACKNOWLEDGEMENTS_PER_BATCH,
};
use crate::core::retry::{retry_async, RetryPolicy};
use crate::core::sequencer::{GroupSequencer, SequenceSlot};
use crate::queue::{Message, MessageGroupingFunction, QueueClient, DEFAULT_MESSAGE_GROUP};
use std::collections::HashMap;
use std::sync::Arc;

/// Commits scheduled for one ordering key
///
/// Created by [`AcknowledgementExecutor::schedule`], which fixes its place in
/// the commit order; executing it waits for every earlier unit of the same key.
pub struct ScheduledAcknowledgement {
    slot: Option<SequenceSlot>,
    messages: Vec<Arc<Message>>,
}

impl ScheduledAcknowledgement {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

pub struct AcknowledgementExecutor {
    client: Arc<dyn QueueClient>,
    ordering: AcknowledgementOrdering,
    grouping: Option<MessageGroupingFunction>,
    sequencer: Arc<GroupSequencer>,
    retry_policy: RetryPolicy,
    max_acknowledgements_per_batch: usize,
    callback: Arc<dyn AcknowledgementResultCallback>,
}

impl AcknowledgementExecutor {
    /// Fails when `OrderedByGroup` is requested without a grouping function
    pub fn new(
        client: Arc<dyn QueueClient>,
        ordering: AcknowledgementOrdering,
        grouping: Option<MessageGroupingFunction>,
    ) -> AcknowledgementResult<Self> {
        if ordering == AcknowledgementOrdering::OrderedByGroup && grouping.is_none() {
            return Err(AcknowledgementError::MissingGroupingFunction);
        }
        Ok(Self {
            client,
            ordering,
            grouping,
            sequencer: GroupSequencer::new(),
            retry_policy: RetryPolicy::default(),
            max_acknowledgements_per_batch: DEFAULT_MAX_ACKNOWLEDGEMENTS_PER_BATCH,
            callback: Arc::new(LoggingAcknowledgementCallback),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_max_acknowledgements_per_batch(mut self, max: usize) -> Self {
        self.max_acknowledgements_per_batch = max.max(1);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn AcknowledgementResultCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn ordering(&self) -> AcknowledgementOrdering {
        self.ordering
    }

    /// Ordering key of a message: its group under `OrderedByGroup`, one shared key otherwise
    pub fn ordering_key(&self, message: &Message) -> String {
        match (&self.ordering, &self.grouping) {
            (AcknowledgementOrdering::OrderedByGroup, Some(grouping)) => grouping(message),
            _ => DEFAULT_MESSAGE_GROUP.to_string(),
        }
    }

    /// Split `messages` into units and reserve their commit positions
    ///
    /// Positions are taken synchronously, so the order of `schedule` calls is
    /// the commit order regardless of when the units are executed.
    pub fn schedule(&self, messages: Vec<Arc<Message>>) -> Vec<ScheduledAcknowledgement> {
        if messages.is_empty() {
            return Vec::new();
        }
        match self.ordering {
            AcknowledgementOrdering::Parallel => vec![ScheduledAcknowledgement {
                slot: None,
                messages,
            }],
            AcknowledgementOrdering::Ordered => vec![ScheduledAcknowledgement {
                slot: Some(self.sequencer.enqueue(DEFAULT_MESSAGE_GROUP)),
                messages,
            }],
            AcknowledgementOrdering::OrderedByGroup => {
                let mut keys: Vec<String> = Vec::new();
                let mut groups: HashMap<String, Vec<Arc<Message>>> = HashMap::new();
                for message in messages {
                    let key = self.ordering_key(&message);
                    if !groups.contains_key(&key) {
                        keys.push(key.clone());
                    }
                    groups.entry(key).or_default().push(message);
                }
                keys.into_iter()
                    .filter_map(|key| {
                        groups.remove(&key).map(|messages| ScheduledAcknowledgement {
                            slot: Some(self.sequencer.enqueue(&key)),
                            messages,
                        })
                    })
                    .collect()
            }
        }
    }

    /// Commit a scheduled unit once its turn comes, chunk by chunk
    pub async fn execute(&self, mut scheduled: ScheduledAcknowledgement) {
        if let Some(slot) = scheduled.slot.as_mut() {
            slot.wait_turn().await;
        }
        for chunk in scheduled
            .messages
            .chunks(self.max_acknowledgements_per_batch)
        {
            self.commit_chunk(chunk).await;
        }
        // Dropping the slot releases the next unit of this key
        drop(scheduled);
    }

    /// Schedule and commit in one step
    pub async fn acknowledge(&self, messages: Vec<Arc<Message>>) {
        let units = self.schedule(messages);
        futures::future::join_all(units.into_iter().map(|unit| self.execute(unit))).await;
    }

    async fn commit_chunk(&self, chunk: &[Arc<Message>]) {
        let receipt_handles: Vec<String> = chunk
            .iter()
            .map(|message| message.receipt_handle().to_string())
            .collect();

        let result = retry_async("commit", self.retry_policy.clone(), || {
            self.client.commit_batch(&receipt_handles)
        })
        .await;

        match result {
            Ok(()) => self.callback.on_success(chunk),
            Err(source) => {
                let error = AcknowledgementError::commit(chunk, source);
                self.callback.on_failure(chunk, &error);
            }
        }
    }
}
