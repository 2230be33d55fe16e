//! Generation client and guest-quota flow against a mock generation endpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use drivediagram::client::{
    ClientError, DiagramClient, GenerateOutcome, Generator, GuestQuota, MemoryStore, RetryPolicy,
};
use drivediagram::models::UploadedImage;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/api/generate-diagram";

fn upload() -> UploadedImage {
    UploadedImage {
        data_url: "data:image/png;base64,AAAA".to_string(),
        mime_type: "image/png".to_string(),
        width_px: 640,
        height_px: 480,
    }
}

fn client(server: &MockServer) -> DiagramClient {
    DiagramClient::new(format!("{}{}", server.uri(), ENDPOINT), Duration::from_secs(5))
        .expect("Failed to create client")
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
}

fn diagram_body() -> serde_json::Value {
    json!({
        "imageUrl": "data:image/png;base64,DIAGRAM",
        "explanation": "Four-way junction with a give-way line."
    })
}

fn generator(server: &MockServer, attempts_used: u32) -> Generator<Arc<MemoryStore>> {
    let quota = GuestQuota::new(Arc::new(MemoryStore::new()));
    for _ in 0..attempts_used {
        quota.increment();
    }
    Generator::new(client(server), quota)
}

#[tokio::test]
async fn test_retries_transient_failures_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(diagram_body()))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server).transform(&upload(), None).await.unwrap();

    assert_eq!(result.image_url, "data:image/png;base64,DIAGRAM");
    assert_eq!(result.explanation, "Four-way junction with a give-way line.");
}

#[tokio::test]
async fn test_gives_up_after_retry_budget() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(429))
        .expect(4)
        .mount(&server)
        .await;

    let err = client(&server).transform(&upload(), None).await.unwrap_err();

    assert!(matches!(err, ClientError::Status { status: 429, .. }));
}

#[tokio::test]
async fn test_retry_waits_grow_between_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(502))
        .expect(4)
        .mount(&server)
        .await;

    let waits: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));
    let recorded = waits.clone();
    let client = DiagramClient::new(format!("{}{}", server.uri(), ENDPOINT), Duration::from_secs(5))
        .expect("Failed to create client")
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(5)))
        .with_retry_observer(Arc::new(move |_err: &ClientError, wait: Duration| {
            recorded.lock().unwrap().push(wait);
        }));

    let err = client.transform(&upload(), None).await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 502, .. }));

    let waits = waits.lock().unwrap().clone();
    assert_eq!(waits.len(), 3);
    assert!(waits[0] >= Duration::from_millis(4));
    assert!(
        waits.windows(2).all(|pair| pair[0] < pair[1]),
        "waits did not grow: {:?}",
        waits
    );
}

#[tokio::test]
async fn test_rejected_session_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("authorization", "Bearer stale-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "Invalid token",
            "code": "unauthorized"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .transform(&upload(), Some("stale-token"))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::SessionExpired));
    assert!(err.user_message().contains("session has expired"));
}

#[tokio::test]
async fn test_guest_unauthorized_stays_a_status_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).transform(&upload(), None).await.unwrap_err();

    assert!(matches!(err, ClientError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_client_errors_fail_fast() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "Missing imageData or mimeType",
            "code": "validation_error"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).transform(&upload(), None).await.unwrap_err();

    assert!(matches!(err, ClientError::Status { status: 400, .. }));
    assert!(err.user_message().starts_with("Failed to transform image"));
}

#[tokio::test]
async fn test_content_blocked_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "API did not return an image. The content may have been blocked or the response was empty.",
            "code": "content_blocked"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).transform(&upload(), None).await.unwrap_err();

    assert!(matches!(err, ClientError::ContentBlocked(_)));
}

#[tokio::test]
async fn test_invalid_json_on_success_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).transform(&upload(), None).await.unwrap_err();

    match err {
        ClientError::InvalidResponseBody(snippet) => assert!(snippet.contains("<html>")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_sends_stripped_payload_and_bearer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("authorization", "Bearer session-token"))
        .and(body_partial_json(json!({
            "imageData": "AAAA",
            "mimeType": "image/png"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(diagram_body()))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .transform(&upload(), Some("session-token"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_envelope_response_is_normalized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"candidates": [{"content": {"parts": [{"text": "hello"}]}}]}
        })))
        .mount(&server)
        .await;

    let result = client(&server).transform(&upload(), None).await.unwrap();

    assert_eq!(result.image_url, "");
    assert_eq!(result.explanation, "hello");
}

#[tokio::test]
async fn test_exhausted_guest_is_blocked_before_any_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(diagram_body()))
        .expect(0)
        .mount(&server)
        .await;

    let generator = generator(&server, 3);
    let outcome = generator.generate(&upload(), None).await.unwrap();

    assert_eq!(
        outcome,
        GenerateOutcome::Blocked {
            attempts_used: 3,
            limit: 3
        }
    );
    assert_eq!(generator.quota().attempts(), 3);
}

#[tokio::test]
async fn test_guest_success_consumes_one_attempt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(diagram_body()))
        .expect(1)
        .mount(&server)
        .await;

    let generator = generator(&server, 2);
    let outcome = generator.generate(&upload(), None).await.unwrap();

    let GenerateOutcome::Generated(diagram) = outcome else {
        panic!("expected a diagram");
    };
    assert!(diagram.id.starts_with("diag_"));
    assert_eq!(diagram.id, format!("diag_{}", diagram.created_at));
    assert_eq!(diagram.original_image_url, "data:image/png;base64,AAAA");
    assert_eq!(diagram.image_url, "data:image/png;base64,DIAGRAM");
    assert_eq!(generator.quota().attempts(), 3);
    assert!(generator.quota().is_exhausted());
}

#[tokio::test]
async fn test_failed_generation_keeps_quota() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let generator = generator(&server, 1);
    assert!(generator.generate(&upload(), None).await.is_err());
    assert_eq!(generator.quota().attempts(), 1);
}

#[tokio::test]
async fn test_signed_in_user_bypasses_quota() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(diagram_body()))
        .expect(1)
        .mount(&server)
        .await;

    let generator = generator(&server, 3);
    let outcome = generator.generate(&upload(), Some("tok")).await.unwrap();

    assert!(matches!(outcome, GenerateOutcome::Generated(_)));
    assert_eq!(generator.quota().attempts(), 3);
}
