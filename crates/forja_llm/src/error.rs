//! Error types for the LLM gateway.

use thiserror::Error;

/// Result type alias for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// LLM gateway errors.
///
/// Transient provider failures are not errors: they come back as content
/// prefixed with `ERROR_API:` so that downstream gates fail normally.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM not configured: {0}")]
    NotConfigured(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("LLM provider rejected the credentials: {0}")]
    Unauthorized(String),

    #[error("Response does not match the schema: {0}")]
    Schema(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LlmError {
    /// Fatal errors abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured(_) | Self::ModelNotFound(_) | Self::Unauthorized(_)
        )
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
