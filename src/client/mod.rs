// src/client/mod.rs
//! The browser side of DriveDiagram: guest quota, generation client, auth and library.

pub mod auth;
pub mod generation;
pub mod generator;
pub mod kv_store;
pub mod library;
pub mod normalize;
pub mod quota;
pub mod retry;

use thiserror::Error;

use crate::services::image_processor::IntakeError;
pub(crate) use crate::models::truncate;

pub use auth::{AuthClient, AuthEvent, Session};
pub use generation::{DiagramClient, RetryObserver};
pub use generator::{GenerateOutcome, Generator};
pub use kv_store::{FileStore, KeyValueStore, MemoryStore};
pub use library::{LibraryClient, LibraryListing};
pub use normalize::{NormalizedResponse, normalize};
pub use quota::{GUEST_ATTEMPT_LIMIT, GuestQuota};
pub use retry::{RetryDecision, RetryPolicy};

const GENERATION_FAILED: &str = "Failed to transform image. The AI may be busy or the format isn't supported. Please try again.";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0}")]
    Intake(#[from] IntakeError),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid JSON from backend: {0}")]
    InvalidResponseBody(String),

    #[error("Content blocked: {0}")]
    ContentBlocked(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Storage error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Short, non-technical text for the person at the keyboard.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Intake(e) => e.to_string(),
            ClientError::ContentBlocked(_) => {
                "The AI did not return a diagram. The content may have been blocked; try a different image.".to_string()
            }
            ClientError::SessionExpired => "Your session has expired. Please sign in again.".to_string(),
            ClientError::Auth(message) => message.clone(),
            ClientError::Store(_) => "Could not access local storage.".to_string(),
            ClientError::Config(message) => message.clone(),
            ClientError::Transport(_)
            | ClientError::Timeout
            | ClientError::Status { .. }
            | ClientError::InvalidResponseBody(_) => GENERATION_FAILED.to_string(),
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}
