//! Errors raised by the CLI itself, mapped to exit codes in `main`.

use forja_core::Terminal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Workflow ended without success: {0}")]
    NonSuccess(Terminal),

    #[error("Quality gate rejected {0}")]
    GateFailed(String),
}
