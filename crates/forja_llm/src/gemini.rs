//! Gemini `generateContent` client with retries.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use forja_core::LlmSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LlmError, LlmResult};
use crate::gateway::{LlmGateway, LlmRequest, API_ERROR_PREFIX, GENERAL_ERROR_PREFIX};
use crate::schema::to_provider_schema;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// HTTP client for the Gemini API.
pub struct GeminiClient {
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    max_retries: u32,
    retry_base_delay: Duration,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn from_settings(settings: &LlmSettings) -> LlmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            max_retries: settings.max_api_retries.max(1),
            retry_base_delay: Duration::from_secs(settings.retry_base_delay_secs),
            base_url: BASE_URL.to_string(),
            client,
        })
    }

    /// Point the client at another endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(&self, request: &LlmRequest) -> GenerateRequest {
        let (response_mime_type, response_schema) = match &request.schema {
            Some(schema) => (
                Some("application/json".to_string()),
                Some(to_provider_schema(schema)),
            ),
            None => (None, None),
        };

        GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: request.compose_prompt(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
                response_mime_type,
                response_schema,
            },
        }
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * (1u32 << (attempt.saturating_sub(1)).min(16))
}

#[async_trait]
impl LlmGateway for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn call(&self, request: &LlmRequest) -> LlmResult<String> {
        let body = self.build_request(request);
        let started = Instant::now();
        info!("LLM call: role={} model={} json_mode={}", request.role, self.model, request.schema.is_some());

        let mut last_error = String::from("no attempt made");

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.retry_base_delay, attempt);
                warn!(
                    "Retrying LLM call for {} in {:?} (attempt {}/{})",
                    request.role,
                    delay,
                    attempt + 1,
                    self.max_retries
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = format!("Network error: {}", e);
                    continue;
                }
            };

            let status = response.status();

            if status.is_server_error() || status.as_u16() == 429 {
                let text = response.text().await.unwrap_or_default();
                last_error = format!("Gemini API error {}: {}", status, truncate(&text, 300));
                continue;
            }

            if status.as_u16() == 404 {
                return Err(LlmError::ModelNotFound(format!(
                    "model '{}' is not available ({})",
                    self.model, status
                )));
            }

            if status.as_u16() == 401 || status.as_u16() == 403 {
                let text = response.text().await.unwrap_or_default();
                return Err(LlmError::Unauthorized(truncate(&text, 300)));
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Ok(format!(
                    "{} Gemini API error {}: {}",
                    API_ERROR_PREFIX,
                    status,
                    truncate(&text, 300)
                ));
            }

            let parsed: GenerateResponse = match response.json().await {
                Ok(p) => p,
                Err(e) => return Ok(format!("{} {}", GENERAL_ERROR_PREFIX, e)),
            };

            let text = match parsed.text() {
                Some(t) => t,
                None => {
                    return Ok(format!(
                        "{} empty response (finish reason: {})",
                        GENERAL_ERROR_PREFIX,
                        parsed.finish_reason().unwrap_or("unknown")
                    ))
                }
            };

            info!(
                "LLM response: role={} duration_ms={} chars={}",
                request.role,
                started.elapsed().as_millis(),
                text.len()
            );
            debug!("LLM response body for {}: {}", request.role, truncate(&text, 500));
            return Ok(text);
        }

        warn!("LLM retries exhausted for {}: {}", request.role, last_error);
        Ok(format!(
            "{} No se pudo conectar con Gemini tras {} intentos. {}",
            API_ERROR_PREFIX, self.max_retries, last_error
        ))
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

// Gemini API types
#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

impl GenerateResponse {
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content.parts.iter().map(|p| p.text.as_str()).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn finish_reason(&self) -> Option<&str> {
        self.candidates.first()?.finish_reason.as_deref()
    }
}
