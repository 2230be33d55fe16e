// src/client/normalize.rs
use serde_json::Value;

use super::truncate;

const RAW_EXPLANATION_CHARS: usize = 1000;

const ENVELOPE_TEXT_PATHS: [&str; 5] = [
    "/output_text",
    "/text",
    "/candidates/0/content/parts/0/text",
    "/candidates/0/content/parts/0/stringValue",
    "/candidates/0/content/parts/0/rawText",
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedResponse {
    pub image_url: String,
    pub explanation: String,
}

/// Response layouts the generation endpoint has been seen to return,
/// tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `{imageUrl, explanation}`
    Direct,
    /// `{ok, result}` wrapping a raw model reply.
    Envelope,
    /// Anything else; the body is echoed back as text.
    Raw,
}

impl ResponseShape {
    pub const ORDER: [ResponseShape; 3] = [
        ResponseShape::Direct,
        ResponseShape::Envelope,
        ResponseShape::Raw,
    ];

    pub fn detect(body: &Value) -> ResponseShape {
        Self::ORDER
            .into_iter()
            .find(|shape| shape.matches(body))
            .unwrap_or(ResponseShape::Raw)
    }

    fn matches(self, body: &Value) -> bool {
        match self {
            ResponseShape::Direct => {
                is_truthy(body.get("imageUrl")) || is_truthy(body.get("explanation"))
            }
            ResponseShape::Envelope => is_truthy(body.get("ok")) && is_truthy(body.get("result")),
            ResponseShape::Raw => true,
        }
    }

    fn extract(self, body: &Value) -> NormalizedResponse {
        match self {
            ResponseShape::Direct => NormalizedResponse {
                image_url: as_text(body.get("imageUrl")),
                explanation: as_text(body.get("explanation")),
            },
            ResponseShape::Envelope => {
                let result = body.get("result").unwrap_or(&Value::Null);
                let explanation = ENVELOPE_TEXT_PATHS
                    .iter()
                    .map(|path| result.pointer(path))
                    .find(|v| is_truthy(*v))
                    .map(as_text)
                    .unwrap_or_else(|| truncate(&result.to_string(), RAW_EXPLANATION_CHARS));
                NormalizedResponse {
                    image_url: result
                        .get("imageUrl")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    explanation,
                }
            }
            ResponseShape::Raw => NormalizedResponse {
                image_url: String::new(),
                explanation: truncate(&body.to_string(), RAW_EXPLANATION_CHARS),
            },
        }
    }
}

/// Maps any 2xx JSON body onto `{image_url, explanation}`. Never fails.
pub fn normalize(body: &Value) -> NormalizedResponse {
    ResponseShape::detect(body).extract(body)
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_shape() {
        let body = json!({"imageUrl": "data:image/png;base64,AAA", "explanation": "A cycle"});
        assert_eq!(ResponseShape::detect(&body), ResponseShape::Direct);
        assert_eq!(
            normalize(&body),
            NormalizedResponse {
                image_url: "data:image/png;base64,AAA".to_string(),
                explanation: "A cycle".to_string(),
            }
        );
    }

    #[test]
    fn test_direct_shape_with_only_explanation() {
        let body = json!({"imageUrl": null, "explanation": "text only"});
        let normalized = normalize(&body);
        assert_eq!(normalized.image_url, "");
        assert_eq!(normalized.explanation, "text only");
    }

    #[test]
    fn test_envelope_with_candidate_text() {
        let body = json!({
            "ok": true,
            "result": {"candidates": [{"content": {"parts": [{"text": "hello"}]}}]}
        });
        assert_eq!(ResponseShape::detect(&body), ResponseShape::Envelope);
        assert_eq!(
            normalize(&body),
            NormalizedResponse {
                image_url: String::new(),
                explanation: "hello".to_string(),
            }
        );
    }

    #[test]
    fn test_envelope_prefers_output_text() {
        let body = json!({
            "ok": 1,
            "result": {
                "output_text": "first",
                "text": "second",
                "imageUrl": "https://cdn.example/img.png"
            }
        });
        let normalized = normalize(&body);
        assert_eq!(normalized.explanation, "first");
        assert_eq!(normalized.image_url, "https://cdn.example/img.png");
    }

    #[test]
    fn test_envelope_skips_empty_text() {
        let body = json!({
            "ok": true,
            "result": {"text": "", "candidates": [{"content": {"parts": [{"rawText": "raw"}]}}]}
        });
        assert_eq!(normalize(&body).explanation, "raw");
    }

    #[test]
    fn test_envelope_without_text_serializes_result() {
        let body = json!({"ok": true, "result": {"status": "queued"}});
        assert_eq!(normalize(&body).explanation, r#"{"status":"queued"}"#);
    }

    #[test]
    fn test_envelope_requires_ok() {
        let body = json!({"ok": false, "result": {"text": "ignored"}});
        assert_eq!(ResponseShape::detect(&body), ResponseShape::Raw);
    }

    #[test]
    fn test_raw_fallback_truncates() {
        let long = "x".repeat(5000);
        let body = json!({"message": long});
        let normalized = normalize(&body);
        assert_eq!(normalized.image_url, "");
        assert_eq!(normalized.explanation.chars().count(), 1000);
        assert!(normalized.explanation.starts_with(r#"{"message":"xxx"#));
    }

    #[test]
    fn test_raw_fallback_for_non_objects() {
        assert_eq!(normalize(&json!("plain")).explanation, "\"plain\"");
        assert_eq!(normalize(&json!([1, 2])).explanation, "[1,2]");
    }
}
