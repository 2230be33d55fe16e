// src/errors.rs
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

use crate::services::image_processor::IntakeError;

#[derive(Error, Debug)]
pub enum DriveDiagramError {
    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Gemini API Error: {0}")]
    Model(String),

    #[error("API did not return an image. The content may have been blocked or the response was empty.")]
    ContentBlocked,

    #[error("{0}")]
    Intake(#[from] IntakeError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid JSON in request body")]
    InvalidJson,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DriveDiagramError {
    /// Machine readable tag sent next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            DriveDiagramError::Redis(_) => "store_error",
            DriveDiagramError::Model(_) => "model_error",
            DriveDiagramError::ContentBlocked => "content_blocked",
            DriveDiagramError::Intake(IntakeError::InvalidType(_)) => "invalid_type",
            DriveDiagramError::Intake(IntakeError::TooLarge { .. }) => "too_large",
            DriveDiagramError::Intake(IntakeError::Decode(_)) => "invalid_image",
            DriveDiagramError::Serialization(_) => "serialization_error",
            DriveDiagramError::Validation(_) => "validation_error",
            DriveDiagramError::InvalidJson => "invalid_json",
            DriveDiagramError::MethodNotAllowed => "method_not_allowed",
            DriveDiagramError::Unauthorized(_) => "unauthorized",
            DriveDiagramError::Config(_) => "config_error",
        }
    }
}

impl ResponseError for DriveDiagramError {
    fn status_code(&self) -> StatusCode {
        match self {
            DriveDiagramError::Intake(_)
            | DriveDiagramError::Validation(_)
            | DriveDiagramError::InvalidJson => StatusCode::BAD_REQUEST,
            DriveDiagramError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DriveDiagramError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            DriveDiagramError::Redis(_)
            | DriveDiagramError::Model(_)
            | DriveDiagramError::ContentBlocked
            | DriveDiagramError::Serialization(_)
            | DriveDiagramError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Store and configuration details stay in the log.
        let message = match self {
            DriveDiagramError::Redis(_) | DriveDiagramError::Serialization(_) => {
                "Database error".to_string()
            }
            DriveDiagramError::Config(_) => "Server is not configured correctly".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": message,
            "code": self.code(),
        }))
    }
}
