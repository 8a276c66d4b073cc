//! Public API for the queue boundary
//!
//! The listener core imports messages and the client trait from here rather
//! than from the internal modules.

// Client boundary and in-memory broker
pub use crate::queue::client::QueueClient;
pub use crate::queue::memory::{InMemoryQueue, QueueStats};

// Message types and utilities
pub use crate::queue::message::{
    group_id_grouping, message_ids, Message, MessageGroupingFunction, MessageHeader,
    DEFAULT_MESSAGE_GROUP,
};

// Error handling
pub use crate::queue::error::{ClientError, ClientResult};
