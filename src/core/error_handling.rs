//! Generic error handling utilities
//!
//! Lets callers log any of the crate's error types with the right amount of
//! detail: configuration mistakes are shown verbatim since the operator can
//! fix them, runtime failures get a short context line with the detail at
//! debug level.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)`; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a message the operator can act on
    fn is_user_actionable(&self) -> bool;

    /// The operator-facing message for user-actionable errors
    fn user_message(&self) -> Option<&str>;
}

/// Log an error with a detail level based on whether the operator can act on it
///
/// # Examples
/// ```rust,no_run
/// use queue_listener::core::error_handling::log_error_with_context;
/// use queue_listener::listener::ContainerError;
///
/// let error = ContainerError::Configuration {
///     message: "batch_size must be greater than zero".to_string(),
/// };
/// log_error_with_context(&error, "Starting container");
/// // Logs: "FATAL: batch_size must be greater than zero"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => log::error!("FATAL: {}", user_msg),
        _ => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
