//! The single LLM call surface used by every agent.

use std::sync::Arc;

use async_trait::async_trait;
use forja_core::LlmSettings;
use serde_json::Value;
use tracing::info;

use crate::error::{LlmError, LlmResult};
use crate::gemini::GeminiClient;
use crate::mock::MockLlm;
use crate::prompts::Role;

/// Prefix of the sentinel returned when the provider could not be reached.
pub const API_ERROR_PREFIX: &str = "ERROR_API:";

/// Prefix of the sentinel returned when the provider answer could not be read.
pub const GENERAL_ERROR_PREFIX: &str = "ERROR_GENERAL:";

/// Whether an LLM answer is one of the error sentinels.
pub fn is_error_sentinel(text: &str) -> bool {
    let t = text.trim_start();
    t.starts_with(API_ERROR_PREFIX) || t.starts_with(GENERAL_ERROR_PREFIX)
}

/// One LLM invocation bound to a role.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub role: Role,
    pub role_prompt: String,
    pub context: String,
    /// JSON schema constraint; `Some` switches the provider into JSON mode.
    pub schema: Option<Value>,
}

impl LlmRequest {
    pub fn new(role: Role, context: impl Into<String>) -> Self {
        Self {
            role,
            role_prompt: role.prompt().to_string(),
            context: context.into(),
            schema: None,
        }
    }

    /// Append extra instructions to the role prompt.
    pub fn with_prompt_suffix(mut self, suffix: &str) -> Self {
        self.role_prompt.push_str(suffix);
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Full prompt text sent to the provider.
    pub fn compose_prompt(&self) -> String {
        let mut prompt = format!(
            "{}\n\n--- DATOS ACTUALES DEL PROYECTO ---\n{}\n\n--- TAREA ---\n",
            self.role_prompt, self.context
        );
        if self.schema.is_some() {
            prompt.push_str(
                "GENERA EL OUTPUT ÚNICAMENTE EN FORMATO JSON que se adhiera al esquema indicado. \
                 No añadas explicaciones ni texto adicional.",
            );
        } else {
            prompt.push_str(
                "Genera únicamente el bloque de texto solicitado en tu Output Esperado. \
                 No añadas explicaciones.",
            );
        }
        prompt
    }
}

/// Text-in/text-out oracle.
///
/// Implementations return `Ok` with either the model text or an error
/// sentinel (see [`is_error_sentinel`]). `Err` is reserved for fatal errors.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn call(&self, request: &LlmRequest) -> LlmResult<String>;
}

/// Build the gateway selected by the settings.
pub fn gateway_from_settings(settings: &LlmSettings) -> LlmResult<Arc<dyn LlmGateway>> {
    if settings.mock_mode {
        info!("LLM mock mode enabled: using canned responses");
        return Ok(Arc::new(MockLlm::new()));
    }
    if settings.api_key.is_empty() {
        return Err(LlmError::NotConfigured(
            "GEMINI_API_KEY is not set and LLM_MOCK_MODE is off".to_string(),
        ));
    }
    Ok(Arc::new(GeminiClient::from_settings(settings)?))
}
