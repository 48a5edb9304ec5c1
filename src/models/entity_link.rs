//! EntityLink entity model
//!
//! Maps a local entity to the remote identifier each service knows it by.
//! Webhook handlers resolve inbound events through this table, and the
//! `local_state` column carries the one piece of local state inbound
//! events are allowed to update directly.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "entity_links")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub entity_type: String,

    pub entity_id: i64,

    /// Service slug; `(service, remote_id)` is unique
    pub service: String,

    /// Identifier the remote service uses for this entity
    pub remote_id: String,

    /// Local state mirror updated by inbound events (e.g. "approved")
    pub local_state: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
