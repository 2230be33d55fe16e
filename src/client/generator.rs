// src/client/generator.rs
use log::info;

use super::ClientError;
use super::generation::DiagramClient;
use super::kv_store::KeyValueStore;
use super::quota::GuestQuota;
use crate::models::{DiagramResult, UploadedImage, now_millis};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// Guest quota used up; no request was sent.
    Blocked { attempts_used: u32, limit: u32 },
    Generated(DiagramResult),
}

/// The generate-button flow: quota gate, remote call, result promotion.
pub struct Generator<S> {
    client: DiagramClient,
    quota: GuestQuota<S>,
}

impl<S: KeyValueStore> Generator<S> {
    pub fn new(client: DiagramClient, quota: GuestQuota<S>) -> Self {
        Self { client, quota }
    }

    pub fn quota(&self) -> &GuestQuota<S> {
        &self.quota
    }

    /// Guest mode when `access_token` is `None`.
    pub async fn generate(
        &self,
        image: &UploadedImage,
        access_token: Option<&str>,
    ) -> Result<GenerateOutcome, ClientError> {
        let guest = access_token.is_none();

        if guest && self.quota.is_exhausted() {
            let attempts_used = self.quota.attempts();
            info!("Guest quota exhausted ({} attempts)", attempts_used);
            return Ok(GenerateOutcome::Blocked {
                attempts_used,
                limit: self.quota.limit(),
            });
        }

        let response = self.client.transform(image, access_token).await?;

        let created_at = now_millis();
        let diagram = DiagramResult {
            id: format!("diag_{}", created_at),
            image_url: response.image_url,
            explanation: Some(response.explanation).filter(|e| !e.is_empty()),
            original_image_url: image.data_url.clone(),
            created_at,
        };

        if guest {
            let used = self.quota.increment();
            info!("Guest generation {} of {}", used, self.quota.limit());
        }

        Ok(GenerateOutcome::Generated(diagram))
    }
}
