//! Error types for the quality policy crate.

use thiserror::Error;

/// Result type alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors that can occur while analyzing code.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Rule evaluation failed: {rule} - {message}")]
    RuleEvaluationFailed { rule: String, message: String },

    #[error("Unsupported source file: {0}")]
    UnsupportedFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
