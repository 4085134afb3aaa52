//! Error types shared by step descriptors and callable capabilities.

use thiserror::Error;

/// Reasons a raw step descriptor is rejected during normalization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("step descriptor must be a mapping")]
    NotAMapping,

    #[error("unsupported step kind {0}")]
    UnsupportedKind(String),

    #[error("Invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("request body must be a mapping")]
    BodyNotMapping,

    #[error("callable inputs must be a mapping or a template string")]
    InvalidCallableInputs,

    #[error("invalid step descriptor: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::Invalid(err.to_string())
    }
}

/// Failure raised by a callable step capability.
///
/// `Assertion` marks an unmet expectation and maps to a FAILED result.
/// `Failure` marks anything unexpected and maps to an ERROR result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallableError {
    #[error("{0}")]
    Assertion(String),

    #[error("{0}")]
    Failure(String),
}

impl CallableError {
    pub fn assertion(message: impl Into<String>) -> Self {
        CallableError::Assertion(message.into())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        CallableError::Failure(message.into())
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, CallableError::Assertion(_))
    }
}

impl From<anyhow::Error> for CallableError {
    fn from(err: anyhow::Error) -> Self {
        CallableError::Failure(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for CallableError {
    fn from(err: serde_json::Error) -> Self {
        CallableError::Failure(err.to_string())
    }
}
