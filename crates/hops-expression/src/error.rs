//! Error types for expression evaluation

use thiserror::Error;

/// Result type for expression evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors that can occur while evaluating an expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Variable is not defined in any enclosing scope
    #[error("unknown variable: {name}")]
    UnknownVariable { name: String },

    /// Function is not part of the library
    #[error("call to unknown function: {name}")]
    UnknownFunction { name: String },

    /// Object has no such attribute
    #[error("unsupported attribute: this object does not have an attribute named \"{name}\"")]
    UnsupportedAttribute { name: String },

    /// Index is out of range or of the wrong type
    #[error("invalid index: {message}")]
    InvalidIndex { message: String },

    /// Value has the wrong type for the operation
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Wrong number of arguments
    #[error("{function}: expected {expected} arguments, got {found}")]
    WrongArity {
        function: String,
        expected: String,
        found: usize,
    },

    /// A function rejected its arguments
    #[error("{function}: {message}")]
    InvalidArgument { function: String, message: String },

    /// Failed to render a template
    #[error("template error: {message}")]
    Template { message: String },

    /// Expression form that the evaluator does not support
    #[error("unsupported expression: {message}")]
    Unsupported { message: String },
}

impl EvalError {
    pub(crate) fn type_mismatch(expected: impl Into<String>, found: &serde_json::Value) -> Self {
        EvalError::TypeMismatch {
            expected: expected.into(),
            found: crate::value::type_name(found).to_string(),
        }
    }
}

impl From<minijinja::Error> for EvalError {
    fn from(err: minijinja::Error) -> Self {
        EvalError::Template {
            message: err.to_string(),
        }
    }
}
