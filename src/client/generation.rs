// src/client/generation.rs
use backon::Retryable;
use log::{debug, error, warn};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::normalize::{NormalizedResponse, normalize};
use super::retry::RetryPolicy;
use super::{ClientError, truncate};
use crate::models::{GenerationRequest, UploadedImage};
use crate::prompts::CLIENT_PROMPT;
use crate::services::image_processor::strip_data_url_prefix;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const LOGGED_BODY_CHARS: usize = 500;

/// Called before each retry with the failure and the wait that follows it.
pub type RetryObserver = Arc<dyn Fn(&ClientError, Duration) + Send + Sync>;

/// Talks to the generation endpoint with retry and response normalization.
#[derive(Clone)]
pub struct DiagramClient {
    client: Client,
    endpoint: String,
    policy: RetryPolicy,
    prompt: Option<String>,
    on_retry: Option<RetryObserver>,
}

impl DiagramClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            policy: RetryPolicy::default(),
            prompt: Some(CLIENT_PROMPT.to_string()),
            on_retry: None,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_retry_observer(mut self, observer: RetryObserver) -> Self {
        self.on_retry = Some(observer);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn transform(
        &self,
        image: &UploadedImage,
        bearer: Option<&str>,
    ) -> Result<NormalizedResponse, ClientError> {
        let payload = GenerationRequest {
            image_data: strip_data_url_prefix(&image.data_url).to_string(),
            mime_type: image.mime_type.clone(),
            prompt: self.prompt.clone(),
        };

        let mut retries = 0u32;
        let result = (|| async { self.send_once(&payload, bearer).await })
            .retry(self.policy.backoff())
            .when(|e: &ClientError| self.policy.should_retry(e))
            .notify(|e: &ClientError, dur: Duration| {
                retries += 1;
                warn!(
                    "Generation attempt {} failed ({}); retrying in {:.2}s",
                    retries,
                    e,
                    dur.as_secs_f64()
                );
                if let Some(observer) = &self.on_retry {
                    observer(e, dur);
                }
            })
            .await;

        if let Err(err) = &result {
            error!("Generation failed after {} attempt(s): {}", retries + 1, err);
        }
        result
    }

    async fn send_once(
        &self,
        payload: &GenerationRequest,
        bearer: Option<&str>,
    ) -> Result<NormalizedResponse, ClientError> {
        let mut request = self.client.post(&self.endpoint).json(payload);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(ClientError::from_reqwest)?;

        debug!(
            "Generation endpoint answered {}: {}",
            status,
            truncate(&text, LOGGED_BODY_CHARS)
        );

        if status.is_success() {
            let body: Value = serde_json::from_str(&text)
                .map_err(|_| ClientError::InvalidResponseBody(truncate(&text, 200)))?;
            return Ok(normalize(&body));
        }

        if status == StatusCode::UNAUTHORIZED && bearer.is_some() {
            return Err(ClientError::SessionExpired);
        }

        if let Some(message) = content_blocked_message(&text) {
            return Err(ClientError::ContentBlocked(message));
        }

        Err(ClientError::Status {
            status: status.as_u16(),
            body: truncate(&text, LOGGED_BODY_CHARS),
        })
    }
}

fn content_blocked_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    if value.get("code").and_then(Value::as_str) != Some("content_blocked") {
        return None;
    }
    Some(
        value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("content blocked")
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_blocked_detection() {
        let body = r#"{"error":"API did not return an image.","code":"content_blocked"}"#;
        assert_eq!(
            content_blocked_message(body).as_deref(),
            Some("API did not return an image.")
        );
        assert_eq!(
            content_blocked_message(r#"{"error":"boom","code":"model_error"}"#),
            None
        );
        assert_eq!(content_blocked_message("Bad Gateway"), None);
    }

    #[test]
    fn test_default_prompt() {
        let client = DiagramClient::new("http://localhost/api/generate-diagram", DEFAULT_TIMEOUT)
            .unwrap();
        assert_eq!(client.prompt.as_deref(), Some(CLIENT_PROMPT));
        assert_eq!(client.policy, RetryPolicy::default());
        assert!(client.on_retry.is_none());
        assert!(client.with_prompt(None).prompt.is_none());
    }
}
