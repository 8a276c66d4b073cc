//! Queue-side types shared by the listener core
//!
//! # Overview
//!
//! The listener core never talks to a queue service directly. It works with
//! received [`Message`]s and a [`QueueClient`] that can fetch, commit and
//! extend leases:
//!
//! - **Message model**: opaque body plus the header fields the core reads
//!   (group id for FIFO ordering, receipt handle for commit / lease calls)
//! - **Client boundary**: an async trait the container, acknowledgement
//!   processors and visibility adapter are written against
//! - **In-memory broker**: [`InMemoryQueue`], a lease-based queue with FIFO
//!   group locking used by tests and the demo binary
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use queue_listener::queue::{InMemoryQueue, QueueClient};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = InMemoryQueue::fifo("orders.fifo");
//! queue.send("order created", Some("customer-7"))?;
//!
//! for message in queue.fetch(10, Duration::from_secs(1)).await? {
//!     println!("Received: {}", message.data);
//!     queue.commit(message.receipt_handle()).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod memory;
mod message;

// Public API module
pub mod api;

pub use api::*;
