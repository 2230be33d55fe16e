// src/models.rs
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Body accepted by the generation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Base64 payload without the `data:` prefix.
    #[serde(default)]
    pub image_data: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Canonical success shape of the generation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Image payload produced by Image Intake. Only ever held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub data_url: String,
    pub mime_type: String,
    pub width_px: u32,
    pub height_px: u32,
}

/// A generated diagram, either fresh from the model or read back from the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramResult {
    pub id: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub original_image_url: String,
    /// Epoch millis.
    pub created_at: i64,
}

/// Library save request. `id` is the client-side id, when the caller has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDiagram {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub original_image_url: String,
}

impl From<&DiagramResult> for NewDiagram {
    fn from(diagram: &DiagramResult) -> Self {
        Self {
            id: Some(diagram.id.clone()),
            image_url: diagram.image_url.clone(),
            explanation: diagram.explanation.clone(),
            original_image_url: diagram.original_image_url.clone(),
        }
    }
}

/// Row kept by the diagram stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDiagram {
    pub user_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    pub diagram: DiagramResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramListing {
    pub diagrams: Vec<DiagramResult>,
    pub count: usize,
}

/// Body of `GET /api/credits`. Keys stay snake_case on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub credits_remaining: i64,
    pub user_id: String,
}

/// Authenticated user as reported by the auth backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl AuthUser {
    pub fn display_name(&self) -> &str {
        self.user_metadata
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or("Instructor")
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// First `max_chars` characters, for log lines and error snippets.
pub fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
