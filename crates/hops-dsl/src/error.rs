//! Error types for loading automations

use std::path::PathBuf;
use thiserror::Error;

use crate::diagnostics::Diagnostics;

/// Result type for automation loading
pub type DslResult<T> = Result<T, DslError>;

/// Errors that can occur while loading automations
#[derive(Debug, Error)]
pub enum DslError {
    /// Failed to read a file or directory
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The automations directory holds no automation files
    #[error("no automations have been defined in {path}")]
    NoAutomations { path: PathBuf },

    /// Decoding produced error diagnostics
    #[error("automations are invalid: {0}")]
    Invalid(Diagnostics),

    /// No task with this name is declared
    #[error("task '{name}' not found")]
    TaskNotFound { name: String },

    /// Stored file set could not be decoded
    #[error("invalid stored files: {reason}")]
    InvalidStoredFiles { reason: String },

    /// JSON encoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
