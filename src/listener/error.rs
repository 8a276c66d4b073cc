//! Listener and container error types

use crate::acknowledgement::AcknowledgementError;

/// Failure reported by application code for a message or batch
#[derive(Debug, Clone, thiserror::Error)]
pub enum ListenerError {
    #[error("Listener failed: {message}")]
    Failed { message: String },

    #[error("Listener panicked while processing {message_ids}")]
    Panicked { message_ids: String },
}

impl ListenerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Container construction and lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("Invalid container configuration: {message}")]
    Configuration { message: String },

    #[error("A container with id '{id}' is already registered")]
    DuplicateId { id: String },

    #[error("No container registered with id '{id}'")]
    NotFound { id: String },

    #[error("Container '{id}' cannot {operation} while {state}")]
    InvalidState {
        id: String,
        operation: String,
        state: String,
    },
}

impl ContainerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<AcknowledgementError> for ContainerError {
    fn from(error: AcknowledgementError) -> Self {
        Self::Configuration {
            message: error.to_string(),
        }
    }
}

impl crate::core::error_handling::ContextualError for ContainerError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, ContainerError::Configuration { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ContainerError::Configuration { message } => Some(message),
            _ => None,
        }
    }
}

pub type ListenerResult<T> = Result<T, ListenerError>;
pub type ContainerResult<T> = Result<T, ContainerError>;
