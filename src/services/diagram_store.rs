// src/services/diagram_store.rs
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::DriveDiagramError;
use crate::models::{DiagramResult, NewDiagram, StoredDiagram, now_millis};

/// Page-size cap for library listings.
pub const LIBRARY_PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Created(DiagramResult),
    /// The diagram was already in the library; nothing was written.
    Existing(DiagramResult),
}

impl SaveOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, SaveOutcome::Created(_))
    }

    pub fn diagram(&self) -> &DiagramResult {
        match self {
            SaveOutcome::Created(d) | SaveOutcome::Existing(d) => d,
        }
    }

    pub fn into_diagram(self) -> DiagramResult {
        match self {
            SaveOutcome::Created(d) | SaveOutcome::Existing(d) => d,
        }
    }
}

/// Per-user diagram records.
///
/// The store assigns the durable id. A client id passed with a save is kept
/// as an alias, so saving the same diagram again (by durable id or by alias)
/// returns the existing record.
#[async_trait]
pub trait DiagramStore: Send + Sync {
    /// Newest first, at most `limit` entries.
    async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<DiagramResult>, DriveDiagramError>;

    async fn save(&self, user_id: &str, diagram: NewDiagram) -> Result<SaveOutcome, DriveDiagramError>;

    /// Deleting an unknown id succeeds.
    async fn delete(&self, user_id: &str, id: &str) -> Result<(), DriveDiagramError>;
}

pub(crate) fn new_record(user_id: &str, diagram: NewDiagram) -> Result<StoredDiagram, DriveDiagramError> {
    if diagram.image_url.trim().is_empty() {
        return Err(DriveDiagramError::Validation(
            "imageUrl must not be empty".to_string(),
        ));
    }

    Ok(StoredDiagram {
        user_id: user_id.to_string(),
        client_id: diagram.id,
        diagram: DiagramResult {
            id: Uuid::new_v4().to_string(),
            image_url: diagram.image_url,
            explanation: diagram.explanation,
            original_image_url: diagram.original_image_url,
            created_at: now_millis(),
        },
    })
}

/// In-process store used when no Redis is configured, and in tests.
#[derive(Debug, Default)]
pub struct MemoryDiagramStore {
    records: RwLock<HashMap<String, Vec<StoredDiagram>>>,
}

impl MemoryDiagramStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DiagramStore for MemoryDiagramStore {
    async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<DiagramResult>, DriveDiagramError> {
        let records = self.records.read().await;
        let mut diagrams: Vec<DiagramResult> = records
            .get(user_id)
            .map(|rows| rows.iter().rev().map(|r| r.diagram.clone()).collect())
            .unwrap_or_default();

        // Stable sort keeps later inserts first on equal timestamps.
        diagrams.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        diagrams.truncate(limit);
        Ok(diagrams)
    }

    async fn save(&self, user_id: &str, diagram: NewDiagram) -> Result<SaveOutcome, DriveDiagramError> {
        let mut records = self.records.write().await;
        let rows = records.entry(user_id.to_string()).or_default();

        if let Some(client_id) = diagram.id.as_deref() {
            let existing = rows
                .iter()
                .find(|r| r.diagram.id == client_id || r.client_id.as_deref() == Some(client_id));
            if let Some(existing) = existing {
                return Ok(SaveOutcome::Existing(existing.diagram.clone()));
            }
        }

        let record = new_record(user_id, diagram)?;
        let saved = record.diagram.clone();
        rows.push(record);
        Ok(SaveOutcome::Created(saved))
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), DriveDiagramError> {
        let mut records = self.records.write().await;
        if let Some(rows) = records.get_mut(user_id) {
            rows.retain(|r| r.diagram.id != id);
        }
        Ok(())
    }
}
