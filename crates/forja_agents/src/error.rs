//! Error types for agents module.

use forja_core::{CoreError, NodeId};
use thiserror::Error;

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur during agent operations.
///
/// Only fatal LLM errors and local failures surface here. Collaborator errors
/// are logged by the agents and never abort a run.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] forja_llm::LlmError),

    #[error("Runner error: {0}")]
    Runner(#[from] forja_runner::RunnerError),

    #[error("Client error: {0}")]
    Client(#[from] forja_clients::ClientError),

    #[error("Policy error: {0}")]
    Policy(#[from] forja_policy::PolicyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Whether this error comes from a fatal LLM failure.
    pub fn is_llm_fatal(&self) -> bool {
        matches!(self, Self::Llm(e) if e.is_fatal())
    }

    /// Lower into the error type nodes return to the executor.
    pub fn into_core(self, node: NodeId) -> CoreError {
        match self {
            Self::Core(e) => e,
            other => CoreError::NodeExecutionFailed {
                node: node.display_name().to_string(),
                message: other.to_string(),
            },
        }
    }
}
