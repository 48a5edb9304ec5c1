//! SyncJob entity model
//!
//! This module contains the SeaORM entity model for the sync_jobs table:
//! one row per queued unit of outbound synchronization work. At most one
//! pending row may exist per `(entity_type, entity_id, service)` tuple;
//! the repository enforces coalescing on enqueue.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Sync actions a job can carry.
pub const ACTION_CREATE: &str = "create";
pub const ACTION_UPDATE: &str = "update";
pub const ACTION_DELETE: &str = "delete";

/// Queue states a sync job moves through.
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    /// Unique identifier for the sync job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Local entity kind (e.g. project, inventory_item, time_entry)
    pub entity_type: String,

    /// Local entity identifier
    pub entity_id: i64,

    /// Target service slug
    pub service: String,

    /// Sync action: create, update or delete
    pub action: String,

    /// Scheduling priority; lower values are more urgent
    pub priority: i16,

    /// Optional opaque snapshot of the entity at enqueue time
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Option<JsonValue>,

    /// Current status: pending, processing, completed or failed
    pub status: String,

    /// Number of processing attempts made so far
    pub attempts: i32,

    /// Message from the most recent failure
    pub error_message: Option<String>,

    /// Timestamp when processing last started
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job completed successfully
    pub completed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
