//! Error types for broker operations

use hops_core::CoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur talking to the broker
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The subject already holds its one permitted message
    #[error("maximum messages per subject exceeded: {subject}")]
    Duplicate { subject: String },

    /// No message or object under this key
    #[error("not found: {key}")]
    NotFound { key: String },

    /// The ordered read went past the message it was looking for
    #[error("unable to find original message with stream sequence {stream_seq}")]
    MissingOriginal { stream_seq: u64 },

    /// A read did not finish before its deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The broker has shut down
    #[error("broker connection closed")]
    Closed,

    /// Any other I/O failure, worth retrying
    #[error("broker error: {0}")]
    Transient(String),

    /// A stored subject could not be parsed
    #[error(transparent)]
    Subject(#[from] CoreError),

    /// JSON encoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BrokerError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, BrokerError::Duplicate { .. })
    }
}

/// Why a sequence handler could not process a message
#[derive(Debug, Error)]
pub enum SequenceError {
    /// Retrying will not help; the message is acknowledged
    #[error("{0}")]
    Fatal(String),

    /// The message is redelivered after a delay
    #[error("{0}")]
    Retry(String),
}
