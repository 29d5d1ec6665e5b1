//! Shared HTTP plumbing for the REST clients.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::error::{ClientError, ClientResult};

/// Per-request timeout for collaborator calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum length of an error body carried into a [`ClientError`].
const MAX_ERROR_BODY_LEN: usize = 300;

pub fn build_client(timeout: Duration) -> ClientResult<Client> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("forja/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Truncate an error body on a character boundary.
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_LEN {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
        format!("{}... (truncated)", cut)
    }
}

/// Turn a non-2xx response into [`ClientError::Api`].
pub async fn check(service: &str, response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::api(service, status.as_u16(), truncate_body(&body)))
}

/// Check the status and decode the JSON body.
pub async fn json<T: DeserializeOwned>(service: &str, response: Response) -> ClientResult<T> {
    let response = check(service, response).await?;
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ClientError::invalid(service, e.to_string()))
}
