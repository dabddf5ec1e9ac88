//! Error types for wire level operations

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while parsing subjects or building messages
#[derive(Debug, Error)]
pub enum CoreError {
    /// Subject has the wrong shape
    #[error("invalid message subject ({reason}): {subject}")]
    InvalidSubject { subject: String, reason: String },

    /// Subject names a channel hops does not know
    #[error("invalid message subject (unknown channel {channel}): {subject}")]
    UnknownChannel { channel: String, subject: String },

    /// Source event is missing or malformed
    #[error("unable to parse source event: {reason}")]
    InvalidSourceEvent { reason: String },

    /// JSON encoding or decoding failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
