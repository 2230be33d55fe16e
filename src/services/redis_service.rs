// src/services/redis_service.rs
use async_trait::async_trait;
use log::warn;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::errors::DriveDiagramError;
use crate::models::{DiagramResult, NewDiagram, StoredDiagram};
use crate::services::credit_store::CreditStore;
use crate::services::diagram_store::{DiagramStore, SaveOutcome, new_record};

fn diagram_key(id: &str) -> String {
    format!("diagram:{}", id)
}

fn index_key(user_id: &str) -> String {
    format!("user:{}:diagrams", user_id)
}

fn alias_key(user_id: &str) -> String {
    format!("user:{}:aliases", user_id)
}

fn credits_key(user_id: &str) -> String {
    format!("user:{}:credits", user_id)
}

fn redis_err(e: redis::RedisError) -> DriveDiagramError {
    DriveDiagramError::Redis(e.to_string())
}

/// Library store backed by Redis.
///
/// Each diagram is a JSON string under `diagram:{id}`; a per-user sorted set
/// scored by creation time gives the listing order and ownership, and a
/// per-user hash maps client ids to durable ids.
pub struct RedisDiagramStore {
    conn: ConnectionManager,
}

impl RedisDiagramStore {
    pub async fn new(redis_url: &str) -> Result<Self, DriveDiagramError> {
        let client = Client::open(redis_url).map_err(redis_err)?;
        let mut conn = ConnectionManager::new(client).await.map_err(redis_err)?;

        // Test connection
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(redis_err)?;

        Ok(Self { conn })
    }

    async fn load(&self, id: &str) -> Result<Option<StoredDiagram>, DriveDiagramError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(diagram_key(id)).await.map_err(redis_err)?;

        value
            .map(|v| {
                serde_json::from_str(&v).map_err(|e| DriveDiagramError::Serialization(e.to_string()))
            })
            .transpose()
    }

    async fn find_existing(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> Result<Option<DiagramResult>, DriveDiagramError> {
        let mut conn = self.conn.clone();

        let owned: Option<f64> = conn
            .zscore(index_key(user_id), client_id)
            .await
            .map_err(redis_err)?;
        let durable_id = match owned {
            Some(_) => Some(client_id.to_string()),
            None => conn
                .hget(alias_key(user_id), client_id)
                .await
                .map_err(redis_err)?,
        };

        let Some(durable_id) = durable_id else {
            return Ok(None);
        };

        match self.load(&durable_id).await? {
            Some(record) => Ok(Some(record.diagram)),
            None => {
                warn!("Dangling library alias {} for user {}", client_id, user_id);
                conn.hdel::<_, _, ()>(alias_key(user_id), client_id)
                    .await
                    .map_err(redis_err)?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl DiagramStore for RedisDiagramStore {
    async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<DiagramResult>, DriveDiagramError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrevrange(index_key(user_id), 0, limit as isize - 1)
            .await
            .map_err(redis_err)?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.get(diagram_key(id));
        }
        let values: Vec<Option<String>> = pipe.query_async(&mut conn).await.map_err(redis_err)?;

        let mut diagrams = Vec::with_capacity(values.len());
        for (id, value) in ids.iter().zip(values) {
            match value {
                Some(v) => {
                    let record: StoredDiagram = serde_json::from_str(&v)
                        .map_err(|e| DriveDiagramError::Serialization(e.to_string()))?;
                    diagrams.push(record.diagram);
                }
                None => warn!("Library index for {} points at missing diagram {}", user_id, id),
            }
        }

        Ok(diagrams)
    }

    async fn save(&self, user_id: &str, diagram: NewDiagram) -> Result<SaveOutcome, DriveDiagramError> {
        if let Some(client_id) = diagram.id.as_deref() {
            if let Some(existing) = self.find_existing(user_id, client_id).await? {
                return Ok(SaveOutcome::Existing(existing));
            }
        }

        let record = new_record(user_id, diagram)?;
        let value = serde_json::to_string(&record)
            .map_err(|e| DriveDiagramError::Serialization(e.to_string()))?;
        let id = record.diagram.id.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(diagram_key(&id), value)
            .ignore()
            .zadd(index_key(user_id), &id, record.diagram.created_at)
            .ignore();
        if let Some(client_id) = record.client_id.as_deref() {
            pipe.hset(alias_key(user_id), client_id, &id).ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_err)?;

        Ok(SaveOutcome::Created(record.diagram))
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), DriveDiagramError> {
        let mut conn = self.conn.clone();

        let owned: Option<f64> = conn
            .zscore(index_key(user_id), id)
            .await
            .map_err(redis_err)?;
        if owned.is_none() {
            return Ok(());
        }

        let client_id = self.load(id).await?.and_then(|r| r.client_id);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(index_key(user_id), id)
            .ignore()
            .del(diagram_key(id))
            .ignore();
        if let Some(client_id) = client_id {
            pipe.hdel(alias_key(user_id), client_id).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_err)?;

        Ok(())
    }
}

/// Balances live as plain integers under `user:{uid}:credits`, written by
/// whatever grants credits.
#[async_trait]
impl CreditStore for RedisDiagramStore {
    async fn credits_remaining(&self, user_id: &str) -> Result<i64, DriveDiagramError> {
        let mut conn = self.conn.clone();
        let credits: Option<i64> = conn.get(credits_key(user_id)).await.map_err(redis_err)?;
        Ok(credits.unwrap_or(0))
    }
}
