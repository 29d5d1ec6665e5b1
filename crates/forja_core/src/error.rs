//! Error types for the core module.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Invalid workflow state: {0}")]
    InvalidState(String),

    #[error("Node execution failed: {node} - {message}")]
    NodeExecutionFailed { node: String, message: String },

    #[error("Visit limit exceeded after {visits} node visits (limit {limit})")]
    VisitLimitExceeded { visits: usize, limit: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
