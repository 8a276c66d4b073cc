//! Message types handed out by a [`QueueClient`](crate::queue::QueueClient)
//!
//! The listener core treats the body as opaque. It only reads the group id
//! (FIFO ordering) and the receipt handle (commit and lease extension).

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Group used when a message carries no group id
pub const DEFAULT_MESSAGE_GROUP: &str = "default";

/// Metadata attached by the broker when a message is received
#[derive(Debug, Clone)]
pub struct MessageHeader {
    /// Broker-assigned message identifier, stable across redeliveries
    pub message_id: String,
    /// Handle identifying this particular receive; needed to commit or extend
    pub receipt_handle: String,
    /// FIFO group id, `None` for standard queues
    pub group_id: Option<String>,
    /// Monotonic enqueue sequence assigned by the broker
    pub sequence: u64,
    /// How many times this message has been received, including this one
    pub receive_count: u32,
    /// When the message was first enqueued
    pub sent_timestamp: SystemTime,
    /// Name of the queue the message was received from
    pub queue: String,
}

/// A received queue message
#[derive(Debug, Clone)]
pub struct Message {
    pub header: MessageHeader,
    /// Message payload (application-specific data)
    pub data: String,
}

impl Message {
    pub fn new(message_id: String, receipt_handle: String, data: String) -> Self {
        Self {
            header: MessageHeader {
                message_id,
                receipt_handle,
                group_id: None,
                sequence: 0,
                receive_count: 1,
                sent_timestamp: SystemTime::now(),
                queue: String::new(),
            },
            data,
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.header.group_id = Some(group_id.into());
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.header.queue = queue.into();
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.header.sequence = sequence;
        self
    }

    pub fn id(&self) -> &str {
        &self.header.message_id
    }

    pub fn receipt_handle(&self) -> &str {
        &self.header.receipt_handle
    }

    pub fn group_id(&self) -> Option<&str> {
        self.header.group_id.as_deref()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.group_id() {
            Some(group) => write!(f, "{} (group {})", self.id(), group),
            None => write!(f, "{}", self.id()),
        }
    }
}

/// Maps a message to the ordering key used for FIFO dispatch and acknowledgement
pub type MessageGroupingFunction = Arc<dyn Fn(&Message) -> String + Send + Sync>;

/// Grouping by the broker-assigned FIFO group id
pub fn group_id_grouping() -> MessageGroupingFunction {
    Arc::new(|message: &Message| {
        message
            .group_id()
            .unwrap_or(DEFAULT_MESSAGE_GROUP)
            .to_string()
    })
}

/// Ids of a slice of messages, for log lines
pub fn message_ids(messages: &[Arc<Message>]) -> Vec<&str> {
    messages.iter().map(|message| message.id()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builders() {
        let message = Message::new("m-1".into(), "r-1".into(), "payload".into())
            .with_group_id("customer-7")
            .with_queue("orders.fifo")
            .with_sequence(12);

        assert_eq!(message.id(), "m-1");
        assert_eq!(message.receipt_handle(), "r-1");
        assert_eq!(message.group_id(), Some("customer-7"));
        assert_eq!(message.header.queue, "orders.fifo");
        assert_eq!(message.header.sequence, 12);
        assert_eq!(message.to_string(), "m-1 (group customer-7)");
    }

    #[test]
    fn test_group_id_grouping_falls_back_to_default_group() {
        let grouping = group_id_grouping();
        let grouped = Message::new("a".into(), "ra".into(), String::new()).with_group_id("g1");
        let ungrouped = Message::new("b".into(), "rb".into(), String::new());

        assert_eq!(grouping(&grouped), "g1");
        assert_eq!(grouping(&ungrouped), DEFAULT_MESSAGE_GROUP);
    }
}
