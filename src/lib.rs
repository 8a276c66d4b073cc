//! Concurrency core of a queue-consuming listener engine
//!
//! Containers poll a [`queue::QueueClient`] under back-pressure, dispatch
//! messages through sinks to application listeners and commit processed
//! messages through acknowledgement processors.

pub mod acknowledgement;
pub mod backpressure;
pub mod core;
pub mod listener;
pub mod queue;
pub mod sink;
