// src/client/library.rs
use log::{error, info, warn};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use super::auth::AuthClient;
use super::kv_store::KeyValueStore;
use super::{ClientError, truncate};
use crate::models::{DiagramListing, DiagramResult, NewDiagram};
use crate::services::diagram_store::SaveOutcome;

pub const SLOW_LOAD_NOTICE: &str = "Your diagrams are taking too long to load. Please try again later.";
pub const SESSION_EXPIRED_NOTICE: &str = "Your session has expired. Please sign in again.";
pub const SIGNED_OUT_NOTICE: &str = "Sign in to see your saved diagrams.";
pub const LOAD_FAILED_NOTICE: &str = "Error loading diagrams. Please try again later.";

/// What the library view shows. Loading never fails outright.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryListing {
    pub diagrams: Vec<DiagramResult>,
    pub notice: Option<String>,
    pub session_expired: bool,
}

impl LibraryListing {
    fn notice(message: impl Into<String>) -> Self {
        Self {
            notice: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Client for the signed-in user's saved diagrams.
pub struct LibraryClient<S> {
    client: Client,
    base_url: String,
    auth: Arc<AuthClient<S>>,
}

impl<S: KeyValueStore> LibraryClient<S> {
    pub fn new(
        base_url: impl Into<String>,
        auth: Arc<AuthClient<S>>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub async fn list(&self) -> LibraryListing {
        let Some(token) = self.auth.access_token() else {
            return LibraryListing::notice(SIGNED_OUT_NOTICE);
        };

        let response = match self
            .client
            .get(self.url("/api/v1/diagrams"))
            .bearer_auth(&token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!("Library request timed out");
                return LibraryListing::notice(SLOW_LOAD_NOTICE);
            }
            Err(e) => {
                error!("Library request failed: {}", e);
                return LibraryListing::notice(LOAD_FAILED_NOTICE);
            }
        };

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                warn!("Library rejected the session; signing out");
                if let Err(e) = self.auth.clear_session() {
                    error!("Could not clear session: {}", e);
                }
                LibraryListing {
                    session_expired: true,
                    ..LibraryListing::notice(SESSION_EXPIRED_NOTICE)
                }
            }
            StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => {
                LibraryListing::notice(SLOW_LOAD_NOTICE)
            }
            status if status.is_success() => match response.json::<DiagramListing>().await {
                Ok(listing) => LibraryListing {
                    diagrams: listing.diagrams,
                    ..LibraryListing::default()
                },
                Err(e) if e.is_timeout() => LibraryListing::notice(SLOW_LOAD_NOTICE),
                Err(e) => {
                    error!("Unexpected library response: {}", e);
                    LibraryListing::notice(LOAD_FAILED_NOTICE)
                }
            },
            status => {
                let body = response.text().await.unwrap_or_default();
                error!("Library returned {}: {}", status, truncate(&body, 500));
                LibraryListing::notice(format!(
                    "Error loading diagrams: HTTP {}",
                    status.as_u16()
                ))
            }
        }
    }

    /// Saving the same generated diagram twice returns the first record.
    pub async fn save(&self, diagram: &DiagramResult) -> Result<SaveOutcome, ClientError> {
        let token = self.auth.access_token().ok_or(ClientError::SessionExpired)?;
        let response = self
            .client
            .post(self.url("/api/v1/diagrams"))
            .bearer_auth(&token)
            .json(&NewDiagram::from(diagram))
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.auth.clear_session()?;
            return Err(ClientError::SessionExpired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Saving diagram failed with {}: {}", status, truncate(&body, 500));
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let saved: DiagramResult = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponseBody(e.to_string()))?;
        if status == StatusCode::CREATED {
            info!("Saved diagram {} as {}", diagram.id, saved.id);
            Ok(SaveOutcome::Created(saved))
        } else {
            Ok(SaveOutcome::Existing(saved))
        }
    }

    pub async fn delete(&self, diagram_id: &str) -> Result<(), ClientError> {
        let token = self.auth.access_token().ok_or(ClientError::SessionExpired)?;
        let response = self
            .client
            .delete(self.url(&format!("/api/v1/diagrams/{}", diagram_id)))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                self.auth.clear_session()?;
                Err(ClientError::SessionExpired)
            }
            status if status.is_success() || status == StatusCode::NOT_FOUND => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ClientError::Status {
                    status: status.as_u16(),
                    body: truncate(&body, 500),
                })
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
