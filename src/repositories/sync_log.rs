//! # Sync Log Repository
//!
//! Append-only writer for the sync audit trail. Payload snapshots are
//! size-bounded before insert so a pathological webhook or API response
//! cannot bloat the log table.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set};
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::sync_log::{ActiveModel, Column, Entity, Model};

/// Upper bound on a stored payload snapshot, in serialized bytes.
const MAX_PAYLOAD_BYTES: usize = 4096;

/// One log entry ready to be appended.
#[derive(Debug, Default)]
pub struct NewSyncLog {
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub direction: String,
    pub service: String,
    pub action: String,
    pub status: String,
    pub request_data: Option<JsonValue>,
    pub response_data: Option<JsonValue>,
    pub error_message: Option<String>,
    pub duration_ms: i64,
}

/// Repository for the append-only sync log.
pub struct SyncLogRepository {
    db: DatabaseConnection,
}

impl SyncLogRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Append one entry. Entries are never updated or deleted.
    pub async fn record(&self, entry: NewSyncLog) -> Result<Model, EngineError> {
        let row = ActiveModel {
            id: Set(Uuid::new_v4()),
            entity_type: Set(entry.entity_type),
            entity_id: Set(entry.entity_id),
            direction: Set(entry.direction),
            service: Set(entry.service),
            action: Set(entry.action),
            status: Set(entry.status),
            request_data: Set(entry.request_data.map(bound_payload)),
            response_data: Set(entry.response_data.map(bound_payload)),
            error_message: Set(entry.error_message),
            duration_ms: Set(entry.duration_ms),
            synced_at: Set(Utc::now().fixed_offset()),
        };

        let inserted = row.insert(&self.db).await?;
        Ok(inserted)
    }

    /// List entries for the operational endpoint, newest first.
    pub async fn list(
        &self,
        service: Option<&str>,
        direction: Option<&str>,
        limit: u64,
    ) -> Result<Vec<Model>, EngineError> {
        let mut query = Entity::find();
        if let Some(service) = service {
            query = query.filter(Column::Service.eq(service));
        }
        if let Some(direction) = direction {
            query = query.filter(Column::Direction.eq(direction));
        }
        let entries = query
            .order_by_desc(Column::SyncedAt)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(entries)
    }
}

/// Replace oversized payloads with a truncation marker carrying a
/// UTF-8 safe preview of the original.
fn bound_payload(payload: JsonValue) -> JsonValue {
    let serialized = payload.to_string();
    if serialized.len() <= MAX_PAYLOAD_BYTES {
        return payload;
    }

    let mut end = MAX_PAYLOAD_BYTES;
    while end > 0 && !serialized.is_char_boundary(end) {
        end -= 1;
    }

    json!({
        "truncated": true,
        "original_bytes": serialized.len(),
        "preview": &serialized[..end],
    })
}
