//! Upstream model calls against a mock `generateContent` endpoint.

use std::time::Duration;

use drivediagram::config::ModelBackend;
use drivediagram::errors::DriveDiagramError;
use drivediagram::services::{DiagramModel, GeminiService};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const MODEL_PATH: &str = "/v1beta/models/test-model:generateContent";

fn service(server: &MockServer) -> GeminiService {
    GeminiService::new(
        "test-model",
        ModelBackend::GeminiApi {
            api_key: "test-api-key".to_string(),
        },
        Duration::from_secs(5),
    )
    .expect("Failed to create service")
    .with_endpoint(format!("{}{}", server.uri(), MODEL_PATH))
}

#[tokio::test]
async fn test_api_key_sent_as_header_not_query() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(header("x-goog-api-key", "test-api-key"))
        .and(header_exists("content-type"))
        .and(body_partial_json(json!({
            "contents": [{"parts": [{"inlineData": {"data": "QUJD", "mimeType": "image/png"}}]}],
            "generationConfig": {"temperature": 0.1, "responseModalities": ["IMAGE", "TEXT"]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Mini-roundabout, give way to the right."},
                    {"inlineData": {"mimeType": "image/png", "data": "DIAGRAM"}}
                ]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let diagram = service(&server)
        .generate_diagram("QUJD", "image/png")
        .await
        .unwrap();

    assert_eq!(diagram.image_url, "data:image/png;base64,DIAGRAM");
    assert_eq!(
        diagram.explanation.as_deref(),
        Some("Mini-roundabout, give way to the right.")
    );

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    assert!(requests[0].url.query().is_none());
}

#[tokio::test]
async fn test_last_inline_image_wins() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [
                    {"inlineData": {"mimeType": "image/png", "data": "DRAFT"}},
                    {"inlineData": {"mimeType": "image/webp", "data": "FINAL"}}
                ]}
            }]
        })))
        .mount(&server)
        .await;

    let diagram = service(&server)
        .generate_diagram("QUJD", "image/png")
        .await
        .unwrap();

    assert_eq!(diagram.image_url, "data:image/webp;base64,FINAL");
    assert_eq!(diagram.explanation, None);
}

#[tokio::test]
async fn test_text_only_reply_is_content_blocked() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "I can't draw that."}]}, "finishReason": "SAFETY"}]
        })))
        .mount(&server)
        .await;

    let err = service(&server)
        .generate_diagram("QUJD", "image/png")
        .await
        .unwrap_err();

    assert!(matches!(err, DriveDiagramError::ContentBlocked));
}

#[tokio::test]
async fn test_upstream_error_message_is_surfaced_without_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;

    let err = service(&server)
        .generate_diagram("QUJD", "image/png")
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, DriveDiagramError::Model(_)));
    assert!(message.starts_with("Gemini API Error:"));
    assert!(message.contains("Resource has been exhausted"));
    assert!(!message.contains("test-api-key"));
}
