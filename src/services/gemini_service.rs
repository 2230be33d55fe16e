// src/services/gemini_service.rs
use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};

use crate::config::ModelBackend;
use crate::errors::DriveDiagramError;
use crate::models::{GenerationResponse, truncate};
use crate::prompts::{SYSTEM_PROMPT, USER_PROMPT};
use crate::services::vertex_auth::AccessTokenProvider;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Anything that can turn an uploaded image into a diagram.
#[async_trait]
pub trait DiagramModel: Send + Sync {
    /// `image_base64` carries no data URL prefix.
    async fn generate_diagram(
        &self,
        image_base64: &str,
        mime_type: &str,
    ) -> Result<GenerationResponse, DriveDiagramError>;
}

enum Credentials {
    ApiKey(String),
    ServiceAccount(AccessTokenProvider),
}

pub struct GeminiService {
    client: Client,
    model_id: String,
    endpoint: String,
    credentials: Credentials,
}

impl GeminiService {
    pub fn new(
        model_id: impl Into<String>,
        backend: ModelBackend,
        timeout: Duration,
    ) -> Result<Self, DriveDiagramError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DriveDiagramError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let model_id = model_id.into();

        let (endpoint, credentials) = match backend {
            ModelBackend::GeminiApi { api_key } => (
                format!("{}/v1beta/models/{}:generateContent", GEMINI_API_BASE, model_id),
                Credentials::ApiKey(api_key),
            ),
            ModelBackend::Vertex {
                key,
                project_id,
                location,
            } => {
                let host = if location == "global" {
                    "https://aiplatform.googleapis.com".to_string()
                } else {
                    format!("https://{}-aiplatform.googleapis.com", location)
                };
                (
                    format!(
                        "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
                        host, project_id, location, model_id
                    ),
                    Credentials::ServiceAccount(AccessTokenProvider::new(key, client.clone())),
                )
            }
        };

        Ok(Self {
            client,
            model_id,
            endpoint,
            credentials,
        })
    }

    /// Points the service at a different `generateContent` URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn request_body(image_base64: &str, mime_type: &str) -> serde_json::Value {
        json!({
            "systemInstruction": {
                "parts": [{ "text": SYSTEM_PROMPT }]
            },
            "contents": [{
                "role": "user",
                "parts": [
                    { "inlineData": { "data": image_base64, "mimeType": mime_type } },
                    { "text": USER_PROMPT }
                ]
            }],
            "generationConfig": {
                "temperature": 0.1,
                "topP": 0.1,
                "candidateCount": 1,
                "responseModalities": ["IMAGE", "TEXT"]
            }
        })
    }
}

#[async_trait]
impl DiagramModel for GeminiService {
    async fn generate_diagram(
        &self,
        image_base64: &str,
        mime_type: &str,
    ) -> Result<GenerationResponse, DriveDiagramError> {
        let start = Instant::now();

        let request = self
            .client
            .post(&self.endpoint)
            .json(&Self::request_body(image_base64, mime_type));

        let request = match &self.credentials {
            Credentials::ApiKey(key) => request.header("x-goog-api-key", key),
            Credentials::ServiceAccount(provider) => {
                request.bearer_auth(provider.access_token().await?)
            }
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DriveDiagramError::Model("Model request timed out".to_string())
            } else {
                DriveDiagramError::Model(format!("Model request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(
                "Model {} returned {}: {}",
                self.model_id,
                status,
                truncate(&error_text, 500)
            );
            return Err(DriveDiagramError::Model(format!(
                "{} ({})",
                upstream_message(&error_text),
                status.as_u16()
            )));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| DriveDiagramError::Model(format!("Failed to parse model response: {}", e)))?;

        let diagram = extract_diagram(result)?;

        info!(
            "Model {} produced a diagram in {} ms",
            self.model_id,
            start.elapsed().as_millis()
        );

        Ok(diagram)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Pulls the image and caption out of the first candidate.
pub fn extract_diagram(
    response: GenerateContentResponse,
) -> Result<GenerationResponse, DriveDiagramError> {
    let candidate = response.candidates.and_then(|c| c.into_iter().next());

    let mut image_url = None;
    let mut explanation = None;
    let mut finish_reason = None;

    if let Some(candidate) = candidate {
        finish_reason = candidate.finish_reason;
        let parts = candidate.content.and_then(|c| c.parts).unwrap_or_default();
        for part in parts {
            if let Some(InlineData {
                data: Some(data),
                mime_type,
            }) = part.inline_data
            {
                let mime_type = mime_type.unwrap_or_else(|| "image/png".to_string());
                image_url = Some(format!("data:{};base64,{}", mime_type, data));
            } else if let Some(text) = part.text {
                let text = text.trim();
                if !text.is_empty() {
                    explanation = Some(text.to_string());
                }
            }
        }
    }

    match image_url {
        Some(image_url) => Ok(GenerationResponse {
            image_url,
            explanation,
        }),
        None => {
            warn!(
                "Model returned no image (finish reason: {:?}, prompt feedback: {:?})",
                finish_reason, response.prompt_feedback
            );
            Err(DriveDiagramError::ContentBlocked)
        }
    }
}

/// Google error bodies look like `{"error": {"message": ...}}`.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(|m| truncate(m, 200)))
        .unwrap_or_else(|| "Upstream model error".to_string())
}
