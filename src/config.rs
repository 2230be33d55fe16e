// src/config.rs
use log::warn;
use std::path::PathBuf;

use crate::errors::DriveDiagramError;
use crate::prompts::DEFAULT_MODEL_ID;
use crate::services::vertex_auth::ServiceAccountKey;

const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum ModelBackend {
    /// Global Gemini API, authenticated with an API key.
    GeminiApi { api_key: String },
    /// Regional Vertex AI, authenticated with a service account.
    Vertex {
        key: ServiceAccountKey,
        project_id: String,
        location: String,
    },
}

impl ModelBackend {
    pub fn name(&self) -> &'static str {
        match self {
            ModelBackend::GeminiApi { .. } => "gemini-api",
            ModelBackend::Vertex { .. } => "vertex",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub model_id: String,
    pub backend: ModelBackend,
    pub supabase: SupabaseConfig,
    pub redis_url: Option<String>,
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub static_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, DriveDiagramError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DriveDiagramError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = match var("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| DriveDiagramError::Config(format!("PORT is not a valid port: {}", raw)))?,
            None => 8080,
        };

        let max_body_bytes = match var("MAX_BODY_BYTES") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                DriveDiagramError::Config(format!("MAX_BODY_BYTES is not a number: {}", raw))
            })?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        let model_id = var("VERTEX_MODEL_ID")
            .or_else(|| var("GEMINI_IMAGE_MODEL"))
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

        let backend = select_backend(
            &model_id,
            var("GEMINI_API_KEY").or_else(|| var("GOOGLE_API_KEY")),
            var("VERTEX_SERVICE_ACCOUNT_KEY"),
            var("VERTEX_PROJECT_ID"),
            var("VERTEX_LOCATION"),
            var("GEMINI_FORCE_GLOBAL").as_deref() == Some("1"),
        )?;

        let supabase = SupabaseConfig {
            url: var("SUPABASE_URL")
                .ok_or_else(|| DriveDiagramError::Config("Missing SUPABASE_URL".to_string()))?
                .trim_end_matches('/')
                .to_string(),
            key: var("SUPABASE_SERVICE_ROLE_KEY")
                .or_else(|| var("SUPABASE_ANON_KEY"))
                .ok_or_else(|| {
                    DriveDiagramError::Config(
                        "Missing SUPABASE_SERVICE_ROLE_KEY or SUPABASE_ANON_KEY".to_string(),
                    )
                })?,
        };

        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| vec!["*".to_string()]);

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            model_id,
            backend,
            supabase,
            redis_url: var("REDIS_URL"),
            allowed_origins,
            max_body_bytes,
            static_dir: var("STATIC_DIR").map(PathBuf::from),
        })
    }
}

fn select_backend(
    model_id: &str,
    api_key: Option<String>,
    service_account_json: Option<String>,
    project_id: Option<String>,
    location: Option<String>,
    force_global: bool,
) -> Result<ModelBackend, DriveDiagramError> {
    let prefers_global = force_global || model_id.contains("preview");

    match (api_key, service_account_json) {
        (Some(api_key), None) => Ok(ModelBackend::GeminiApi { api_key }),
        (Some(api_key), Some(_)) if prefers_global => Ok(ModelBackend::GeminiApi { api_key }),
        (_, Some(raw)) => {
            let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|_| {
                DriveDiagramError::Config("Invalid VERTEX_SERVICE_ACCOUNT_KEY JSON".to_string())
            })?;
            let location = location.ok_or_else(|| {
                DriveDiagramError::Config("Missing VERTEX_LOCATION environment variable".to_string())
            })?;
            let project_id = resolve_project_id(project_id, &key).ok_or_else(|| {
                DriveDiagramError::Config(
                    "Missing VERTEX_PROJECT_ID and project_id not found in service account JSON"
                        .to_string(),
                )
            })?;
            Ok(ModelBackend::Vertex {
                key,
                project_id,
                location,
            })
        }
        (None, None) => Err(DriveDiagramError::Config(
            "Missing model credentials: set GEMINI_API_KEY or VERTEX_SERVICE_ACCOUNT_KEY".to_string(),
        )),
    }
}

/// A service account e-mail is a common mistake for the project id.
fn resolve_project_id(configured: Option<String>, key: &ServiceAccountKey) -> Option<String> {
    match configured {
        Some(id) if id.contains('@') || id.ends_with(".iam.gserviceaccount.com") => {
            warn!("VERTEX_PROJECT_ID looks like a service account e-mail; using project_id from the key");
            key.project_id.clone()
        }
        Some(id) => Some(id),
        None => key.project_id.clone(),
    }
}
