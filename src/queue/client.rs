//! The boundary to the remote queue service

use crate::queue::error::ClientResult;
use crate::queue::message::Message;
use std::time::Duration;

/// Operations the listener core needs from a queue service
///
/// Implementations own the wire protocol and any transport-level retries.
/// `fetch` may legitimately return fewer messages than requested, including
/// none, without that being an error.
#[async_trait::async_trait]
pub trait QueueClient: Send + Sync {
    /// Name of the queue this client reads from, used in logs and message headers
    fn queue_name(&self) -> &str;

    /// Receive up to `max_messages`, long-polling for at most `wait_time`
    async fn fetch(&self, max_messages: usize, wait_time: Duration) -> ClientResult<Vec<Message>>;

    /// Delete a processed message
    async fn commit(&self, receipt_handle: &str) -> ClientResult<()>;

    /// Keep a received message hidden from other consumers for `duration` from now
    async fn extend_lease(&self, receipt_handle: &str, duration: Duration) -> ClientResult<()>;

    /// Delete several messages; every handle is attempted and the first failure reported
    async fn commit_batch(&self, receipt_handles: &[String]) -> ClientResult<()> {
        let mut first_error = None;
        for handle in receipt_handles {
            if let Err(e) = self.commit(handle).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Extend the lease of several messages; every handle is attempted
    async fn extend_lease_batch(
        &self,
        receipt_handles: &[String],
        duration: Duration,
    ) -> ClientResult<()> {
        let mut first_error = None;
        for handle in receipt_handles {
            if let Err(e) = self.extend_lease(handle, duration).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
