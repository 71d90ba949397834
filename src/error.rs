//! Error types for BaliFeed.

use thiserror::Error;

use crate::push::PushError;
use crate::store::StoreError;

/// Common error type for BaliFeed.
#[derive(Error, Debug)]
pub enum AppError {
    /// Document store error.
    ///
    /// Wraps errors from any [`crate::store::DocumentStore`] backend.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Push gateway error.
    #[error("push error: {0}")]
    Push(#[from] PushError),

    /// Event payload could not be decoded.
    #[error("malformed payload: {0}")]
    Decode(String),

    /// A referenced document does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The recipient has no device tokens to deliver to.
    #[error("no destination: user {0} has no device tokens")]
    NoDestination(String),

    /// Validation error for an inbound payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Whether redelivering the event could succeed.
    ///
    /// Only infrastructure failures are transient. Missing references,
    /// malformed payloads and empty token sets will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Store(e) => e.is_transient(),
            AppError::Push(e) => matches!(e, PushError::Unavailable(_)),
            AppError::Io(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Decode(e.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Store(StoreError::from(e))
    }
}

/// Result type alias for BaliFeed operations.
pub type Result<T> = std::result::Result<T, AppError>;
