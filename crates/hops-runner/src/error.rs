//! Error types for the runner

use hops_broker::{BrokerError, SequenceError};
use hops_dsl::DslError;
use hops_expression::EvalError;
use std::time::Duration;
use thiserror::Error;

/// Result type for runner operations
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while running sequences
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Automations could not be read, parsed or validated
    #[error("failed to load automations: {0}")]
    ConfigLoad(#[from] DslError),

    /// The source event cannot be handled; retrying will not help
    #[error("unable to handle event: {0}")]
    EventFatal(String),

    /// Stored automations do not hash to the key they were stored under
    #[error("stored automations hash mismatch: expected {expected}, found {found}")]
    Integrity { expected: String, found: String },

    /// An expression failed outside any block that could skip it
    #[error("evaluation failed: {0}")]
    Eval(#[from] EvalError),

    #[error("broker error: {0}")]
    Broker(BrokerError),

    /// A broker read took longer than allowed
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The file watcher could not be set up
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl From<BrokerError> for RunnerError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Timeout(after) => RunnerError::Timeout(after),
            other => RunnerError::Broker(other),
        }
    }
}

impl From<RunnerError> for SequenceError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::EventFatal(_) => SequenceError::Fatal(err.to_string()),
            _ => SequenceError::Retry(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_event_errors_are_fatal() {
        let fatal: SequenceError = RunnerError::EventFatal("no hops.event".into()).into();
        assert!(matches!(fatal, SequenceError::Fatal(_)));

        let retry: SequenceError = RunnerError::Integrity {
            expected: "abc".into(),
            found: "def".into(),
        }
        .into();
        assert!(matches!(retry, SequenceError::Retry(_)));
    }

    #[test]
    fn test_broker_timeout_maps_to_timeout() {
        let err: RunnerError = BrokerError::Timeout(Duration::from_secs(5)).into();
        assert!(matches!(err, RunnerError::Timeout(_)));
    }
}
