// src/services/session_verifier.rs
use async_trait::async_trait;
use log::{error, warn};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::SupabaseConfig;
use crate::errors::DriveDiagramError;
use crate::models::AuthUser;

/// Resolves a bearer token to the user it belongs to.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthUser, DriveDiagramError>;
}

/// Asks the Supabase auth server who owns the token.
pub struct SupabaseSessionVerifier {
    client: Client,
    config: SupabaseConfig,
}

impl SupabaseSessionVerifier {
    pub fn new(config: SupabaseConfig) -> Result<Self, DriveDiagramError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DriveDiagramError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SessionVerifier for SupabaseSessionVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, DriveDiagramError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.config.url))
            .header("apikey", &self.config.key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                error!("Auth server unreachable: {}", e);
                DriveDiagramError::Unauthorized("Could not verify session".to_string())
            })?;

        match response.status() {
            status if status.is_success() => response.json::<AuthUser>().await.map_err(|e| {
                error!("Unexpected auth server response: {}", e);
                DriveDiagramError::Unauthorized("Could not verify session".to_string())
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(DriveDiagramError::Unauthorized("Invalid token".to_string()))
            }
            status => {
                warn!("Auth server returned {}", status);
                Err(DriveDiagramError::Unauthorized(
                    "Could not verify session".to_string(),
                ))
            }
        }
    }
}

/// Fixed token table, for tests and local development.
#[derive(Debug, Default, Clone)]
pub struct StaticSessionVerifier {
    users: HashMap<String, AuthUser>,
}

impl StaticSessionVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        self.users.insert(
            token.into(),
            AuthUser {
                id: user_id,
                email: None,
                user_metadata: serde_json::Value::Null,
            },
        );
        self
    }
}

#[async_trait]
impl SessionVerifier for StaticSessionVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, DriveDiagramError> {
        self.users
            .get(token)
            .cloned()
            .ok_or_else(|| DriveDiagramError::Unauthorized("Invalid token".to_string()))
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
