//! SyncLogEntry entity model
//!
//! Append-only audit record of one sync attempt, inbound or outbound.
//! Rows are write-once; the engine never mutates or deletes them.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub const DIRECTION_INBOUND: &str = "inbound";
pub const DIRECTION_OUTBOUND: &str = "outbound";

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "sync_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Local entity kind; absent for webhook-only entries
    pub entity_type: Option<String>,

    /// Local entity identifier; absent for webhook-only entries
    pub entity_id: Option<i64>,

    /// inbound or outbound
    pub direction: String,

    /// Service slug
    pub service: String,

    /// Action or event name that triggered the attempt
    pub action: String,

    /// success or error
    pub status: String,

    /// Size-bounded snapshot of what was sent or received
    #[sea_orm(column_type = "JsonBinary")]
    pub request_data: Option<JsonValue>,

    /// Size-bounded snapshot of the response
    #[sea_orm(column_type = "JsonBinary")]
    pub response_data: Option<JsonValue>,

    pub error_message: Option<String>,

    pub duration_ms: i64,

    pub synced_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
