//! Generic error handling utilities
//!
//! Provides unified error reporting that works across the crate's error
//! types while keeping a consistent logging pattern for whoever owns the
//! worker threads.

use strum_macros::Display;

/// How serious a reported failure is
///
/// `Warning` failures leave the pipeline usable, `Error` failures are
/// wiring or infrastructure mistakes, and `Fatal` failures end a worker
/// thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// # Implementation Consistency
/// When `is_user_actionable()` returns `true`, `user_message()` should return
/// `Some(message)`. When it returns `false`, `user_message()` should return
/// `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a specific message the user can act on
    ///
    /// Wiring mistakes (publisher and subscriber without a common type) and
    /// configuration errors are user-actionable; lock poisoning and handler
    /// failures are not.
    fn is_user_actionable(&self) -> bool;

    /// Returns the specific user message if this is a user-actionable error
    fn user_message(&self) -> Option<String>;

    /// Stable identifier of the failure kind, suitable for log filtering
    fn message_id(&self) -> &'static str {
        "E0000"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }
}

/// Log errors with appropriate detail level based on error specificity
///
/// - User-actionable errors show their specific message
/// - System errors show the operation context, with details at debug level
///
/// # Examples
/// ```rust,no_run
/// # use fanout::core::error_handling::log_error_with_context;
/// # use fanout::pubsub::api::PipelineError;
/// let error = PipelineError::NoCommonType {
///     publisher: "sensors".to_string(),
///     subscriber: "report".to_string(),
/// };
/// log_error_with_context(&error, "Wiring pipeline");
/// // Logs: "ERROR [E0101]: no common type between publisher 'sensors' and subscriber 'report'"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    let primary = match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => user_msg,
        _ => operation_context.to_string(),
    };
    log::error!("{} [{}]: {}", error.severity(), error.message_id(), primary);
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
