// src/client/auth.rs
use log::{error, info, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::broadcast;

use super::kv_store::KeyValueStore;
use super::{ClientError, truncate};
use crate::models::AuthUser;

const SESSION_KEY: &str = "driveDiagramSession";
const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(AuthUser),
    SignedOut,
    /// Arrived through a recovery link; the user should pick a new password.
    PasswordRecovery(AuthUser),
}

/// Client for the Supabase auth REST API. The current session lives in `S`.
pub struct AuthClient<S> {
    client: Client,
    base_url: String,
    anon_key: String,
    redirect_to: Option<String>,
    store: S,
    events: broadcast::Sender<AuthEvent>,
}

impl<S: KeyValueStore> AuthClient<S> {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        store: S,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let anon_key = anon_key.into();
        if !base_url.starts_with("http") || anon_key.trim().is_empty() {
            return Err(ClientError::Config(
                "Supabase is not configured. Set SUPABASE_URL and SUPABASE_ANON_KEY.".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            client,
            base_url,
            anon_key,
            redirect_to: None,
            store,
            events,
        })
    }

    /// Where password recovery links should land.
    pub fn with_redirect_to(mut self, url: impl Into<String>) -> Self {
        self.redirect_to = Some(url.into());
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> Option<Session> {
        let raw = match self.store.get(SESSION_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Could not read stored session: {}", e);
                return None;
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| warn!("Ignoring malformed stored session: {}", e))
            .ok()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session().map(|s| s.access_token)
    }

    /// Returns the new user. A session is stored only when the backend
    /// signs the user in straight away (no e-mail confirmation).
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthUser, ClientError> {
        let body = json!({
            "email": email,
            "password": password,
            "data": { "name": name },
        });
        let response = self
            .request(self.client.post(self.url("/auth/v1/signup")))
            .json(&body)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        let value: Value = read_json(response, "sign up").await?;

        if value.get("access_token").is_some() {
            let session = parse_session(value)?;
            let user = session.user.clone();
            self.store_session(&session)?;
            self.emit(AuthEvent::SignedIn(user.clone()));
            return Ok(user);
        }

        let user = value.get("user").cloned().unwrap_or(value);
        serde_json::from_value(user)
            .map_err(|e| ClientError::Auth(format!("Unexpected sign up response: {}", e)))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let response = self
            .request(self.client.post(self.url("/auth/v1/token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        let session = parse_session(read_json(response, "sign in").await?)?;

        self.store_session(&session)?;
        info!("Signed in as {}", session.user.id);
        self.emit(AuthEvent::SignedIn(session.user.clone()));
        Ok(session)
    }

    /// Revokes the session remotely when possible; the local session is
    /// cleared either way.
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        if let Some(session) = self.session() {
            let result = self
                .request(self.client.post(self.url("/auth/v1/logout")))
                .bearer_auth(&session.access_token)
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!("Logout returned {}", response.status()),
                Err(e) => warn!("Logout request failed: {}", e),
            }
        }
        self.clear_session()
    }

    /// Local-only sign-out, used when the backend has rejected the session.
    pub fn clear_session(&self) -> Result<(), ClientError> {
        self.store.remove(SESSION_KEY)?;
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    /// Drops the stored session when the server rejected its token, so the
    /// next call runs as a guest instead of repeating a dead bearer.
    pub fn forget_if_expired<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(ClientError::SessionExpired) = &result {
            warn!("Server rejected the stored session; signing out");
            if let Err(e) = self.clear_session() {
                error!("Failed to clear expired session: {}", e);
            }
        }
        result
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), ClientError> {
        let mut request = self.request(self.client.post(self.url("/auth/v1/recover")));
        if let Some(redirect_to) = &self.redirect_to {
            request = request.query(&[("redirect_to", redirect_to.as_str())]);
        }
        let response = request
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        ensure_success(response, "password reset").await?;
        Ok(())
    }

    /// Adopts the access token carried by a recovery link.
    pub async fn begin_password_recovery(&self, access_token: &str) -> Result<AuthUser, ClientError> {
        let user = self.fetch_user(access_token).await?;
        self.store_session(&Session {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: None,
            user: user.clone(),
        })?;
        self.emit(AuthEvent::PasswordRecovery(user.clone()));
        Ok(user)
    }

    pub async fn update_password(&self, new_password: &str) -> Result<AuthUser, ClientError> {
        let session = self.session().ok_or(ClientError::SessionExpired)?;
        let response = self
            .request(self.client.put(self.url("/auth/v1/user")))
            .bearer_auth(&session.access_token)
            .json(&json!({ "password": new_password }))
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.clear_session()?;
            return Err(ClientError::SessionExpired);
        }
        let user: AuthUser = serde_json::from_value(read_json(response, "password update").await?)
            .map_err(|e| ClientError::Auth(format!("Unexpected user response: {}", e)))?;
        info!("Password updated for {}", user.id);
        Ok(user)
    }

    /// Confirms the stored session with the backend. `None` when signed out.
    pub async fn current_user(&self) -> Result<Option<AuthUser>, ClientError> {
        let Some(session) = self.session() else {
            return Ok(None);
        };
        match self.fetch_user(&session.access_token).await {
            Ok(user) => Ok(Some(user)),
            Err(ClientError::SessionExpired) => {
                self.clear_session()?;
                Err(ClientError::SessionExpired)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_user(&self, access_token: &str) -> Result<AuthUser, ClientError> {
        let response = self
            .request(self.client.get(self.url("/auth/v1/user")))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(ClientError::SessionExpired);
        }
        serde_json::from_value(read_json(response, "user lookup").await?)
            .map_err(|e| ClientError::Auth(format!("Unexpected user response: {}", e)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.anon_key)
    }

    fn store_session(&self, session: &Session) -> Result<(), ClientError> {
        let raw = serde_json::to_string(session).map_err(|e| ClientError::Store(e.to_string()))?;
        self.store.set(SESSION_KEY, &raw)
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn parse_session(value: Value) -> Result<Session, ClientError> {
    serde_json::from_value(value)
        .map_err(|e| ClientError::Auth(format!("Unexpected session response: {}", e)))
}

async fn ensure_success(response: Response, action: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("Auth {} failed with {}: {}", action, status, truncate(&body, 500));
    Err(ClientError::Auth(error_message(&body).unwrap_or_else(|| {
        format!("Authentication request failed ({})", status.as_u16())
    })))
}

async fn read_json(response: Response, action: &str) -> Result<Value, ClientError> {
    ensure_success(response, action)
        .await?
        .json()
        .await
        .map_err(|e| ClientError::Auth(format!("Unexpected {} response: {}", action, e)))
}

/// Supabase reports errors under several keys depending on the endpoint.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
