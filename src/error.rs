// Usage errors that the CLI reports with a dedicated exit code

use thiserror::Error;

/// Errors caused by what the caller asked for, as opposed to store or I/O failures.
///
/// These are raised inside `eyre::Report`s; the binary recovers them with
/// `downcast_ref::<UsageError>()` to pick the exit code.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("invalid selector `{token}`: {reason}")]
    InvalidSelector { token: String, reason: String },

    #[error("invalid queue name `{0}` (must match [A-Za-z][A-Za-z0-9_]*, max 64 chars)")]
    InvalidQueueName(String),

    #[error("invalid duration `{0}` (expected e.g. 30s, 5m, 1h)")]
    InvalidDuration(String),

    #[error("queue `{0}` does not exist")]
    MissingQueue(String),

    #[error("source and destination are the same queue `{0}`")]
    SameQueue(String),

    #[error("no command given to run")]
    EmptyCommand,

    #[error("no entries given")]
    NothingToAdd,
}

impl UsageError {
    pub(crate) fn selector(token: &str, reason: impl Into<String>) -> Self {
        UsageError::InvalidSelector {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}
