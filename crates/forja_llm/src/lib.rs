//! # forja_llm
//!
//! The LLM gateway used by every Forja agent.
//!
//! This crate exposes a single call surface ([`LlmGateway`]) with an optional
//! JSON-schema constraint, a Gemini HTTP client with exponential-backoff
//! retries, and deterministic gateways for mock mode and tests.
//!
//! # Architecture
//!
//! - **Gateway**: Request type, prompt composition and the gateway trait
//! - **Gemini**: `generateContent` client; transient failures become `ERROR_API:` sentinels
//! - **Mock**: Canned answers keyed by role and a scripted gateway for tests
//! - **Prompts**: Role prompts as opaque constants
//! - **Schema**: The formal-requirements JSON schema and its validation
//!
//! # Example
//!
//! ```rust,ignore
//! use forja_llm::{gateway_from_settings, LlmRequest, Role};
//!
//! let llm = gateway_from_settings(&settings.llm)?;
//! let code = llm
//!     .call(&LlmRequest::new(Role::Developer, "Requisitos formales: ..."))
//!     .await?;
//! ```

pub mod error;
pub mod gateway;
pub mod gemini;
pub mod mock;
pub mod prompts;
pub mod schema;

pub use error::{LlmError, LlmResult};
pub use gateway::{
    gateway_from_settings, is_error_sentinel, LlmGateway, LlmRequest, API_ERROR_PREFIX,
    GENERAL_ERROR_PREFIX,
};
pub use gemini::GeminiClient;
pub use mock::{MockLlm, RecordedCall, ScriptedLlm};
pub use prompts::Role;
pub use schema::formal_requirements_schema;
