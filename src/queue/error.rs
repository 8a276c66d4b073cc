//! Queue client error types

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to fetch from queue {queue}: {message}")]
    Fetch { queue: String, message: String },

    #[error("Failed to commit {receipt_handle}: {message}")]
    Commit {
        receipt_handle: String,
        message: String,
    },

    #[error("Failed to extend lease of {receipt_handle}: {message}")]
    ExtendLease {
        receipt_handle: String,
        message: String,
    },

    #[error("Receipt handle not found or expired: {receipt_handle}")]
    UnknownReceiptHandle { receipt_handle: String },

    #[error("Queue is full (max size: {max_size})")]
    QueueFull { max_size: usize },
}

impl crate::core::error_handling::ContextualError for ClientError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}

/// Result type for queue client operations
pub type ClientResult<T> = Result<T, ClientError>;
