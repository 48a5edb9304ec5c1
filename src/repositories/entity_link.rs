//! # Entity Link Repository
//!
//! Maintains the mapping between local entities and the identifiers each
//! remote service assigned them. Outbound updates and deletes resolve
//! their remote target here, and inbound webhooks resolve the reverse
//! direction through `(service, remote_id)`.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::entity_link::{ActiveModel, Column, Entity, Model};
use crate::services::ServiceId;

/// Repository for entity-to-remote-id links.
pub struct EntityLinkRepository {
    db: DatabaseConnection,
}

impl EntityLinkRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create or refresh the link for a local entity on one service.
    ///
    /// A repeated create against the same service replaces the stored
    /// remote id rather than growing a second row.
    pub async fn link(
        &self,
        entity_type: &str,
        entity_id: i64,
        service: ServiceId,
        remote_id: &str,
    ) -> Result<Model, EngineError> {
        let now = Utc::now().fixed_offset();

        if let Some(existing) = self.find(entity_type, entity_id, service).await? {
            let mut active: ActiveModel = existing.into();
            active.remote_id = Set(remote_id.to_string());
            active.updated_at = Set(now);
            let updated = active.update(&self.db).await?;
            return Ok(updated);
        }

        let row = ActiveModel {
            id: Set(Uuid::new_v4()),
            entity_type: Set(entity_type.to_string()),
            entity_id: Set(entity_id),
            service: Set(service.as_str().to_string()),
            remote_id: Set(remote_id.to_string()),
            local_state: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = row.insert(&self.db).await?;
        Ok(inserted)
    }

    /// Look up a link by local identity.
    pub async fn find(
        &self,
        entity_type: &str,
        entity_id: i64,
        service: ServiceId,
    ) -> Result<Option<Model>, EngineError> {
        let link = Entity::find()
            .filter(Column::EntityType.eq(entity_type))
            .filter(Column::EntityId.eq(entity_id))
            .filter(Column::Service.eq(service.as_str()))
            .one(&self.db)
            .await?;
        Ok(link)
    }

    /// Look up a link by the identifier a service reported in a webhook.
    pub async fn find_by_remote(
        &self,
        service: ServiceId,
        remote_id: &str,
    ) -> Result<Option<Model>, EngineError> {
        let link = Entity::find()
            .filter(Column::Service.eq(service.as_str()))
            .filter(Column::RemoteId.eq(remote_id))
            .one(&self.db)
            .await?;
        Ok(link)
    }

    /// Record the local state an inbound event carried (e.g. approval).
    pub async fn set_local_state(&self, link_id: Uuid, state: &str) -> Result<(), EngineError> {
        let Some(existing) = Entity::find_by_id(link_id).one(&self.db).await? else {
            return Ok(());
        };

        let mut active: ActiveModel = existing.into();
        active.local_state = Set(Some(state.to_string()));
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await?;
        Ok(())
    }

    /// Remove the link after a successful remote delete.
    pub async fn unlink(
        &self,
        entity_type: &str,
        entity_id: i64,
        service: ServiceId,
    ) -> Result<(), EngineError> {
        if let Some(existing) = self.find(entity_type, entity_id, service).await? {
            existing.delete(&self.db).await?;
        }
        Ok(())
    }
}
