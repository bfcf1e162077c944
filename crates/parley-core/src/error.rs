//! Error types for the messaging subsystem.

use thiserror::Error;

/// Errors raised inside the mailbox and dispatch machinery.
///
/// None of these cross a tool boundary: `MessageSender` and
/// `MessageReceiver` turn them into `success: false` responses, and the
/// dispatch task logs them.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// An identity was empty.
    #[error("identity must not be empty")]
    EmptyIdentity,

    /// A registry lock was poisoned by a panicking holder.
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    /// `notify` was called with no tokio runtime to spawn onto.
    #[error("no async runtime available for dispatch")]
    NoRuntime,

    /// A tool request could not be parsed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The worker returned an error from `run_to_completion`.
    #[error("worker {identity} failed: {reason}")]
    WorkerFailed { identity: String, reason: String },

    /// The worker panicked inside `run_to_completion`.
    #[error("worker {identity} panicked")]
    WorkerPanicked { identity: String },

    /// No worker handle is registered under this identity.
    #[error("worker {0} is not registered")]
    NotRegistered(String),

    /// A worker handle is already registered under this identity.
    #[error("worker {0} is already registered")]
    AlreadyRegistered(String),
}

pub type Result<T> = std::result::Result<T, MessagingError>;

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::InvalidRequest(err.to_string())
    }
}
