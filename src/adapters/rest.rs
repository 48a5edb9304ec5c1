//! Generic REST adapter shared by services whose APIs accept the local
//! entity snapshot as-is. Only the resource path differs per service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

use crate::api_client::ApiClient;
use crate::error::EngineError;
use crate::models::sync_job::{self, ACTION_CREATE, ACTION_DELETE, ACTION_UPDATE};
use crate::repositories::EntityLinkRepository;
use crate::services::ServiceId;

use super::{ServiceAdapter, extract_remote_id};

/// REST resource path for a local entity type on a service, or `None`
/// when the service does not sync that entity.
pub fn resource_for(service: ServiceId, entity_type: &str) -> Option<&'static str> {
    match (service, entity_type) {
        (ServiceId::Fsm, "project") => Some("work-orders"),
        (ServiceId::Fsm, "time_entry") => Some("service-appointments"),
        (ServiceId::Books, "inventory_item") => Some("items"),
        (ServiceId::Books, "project") => Some("projects"),
        (ServiceId::People, "time_entry") => Some("timesheets"),
        (ServiceId::Desk, "project") => Some("tickets"),
        (ServiceId::Quoting, "project") => Some("quotes"),
        _ => None,
    }
}

pub struct RestAdapter {
    service: ServiceId,
    client: ApiClient,
    links: Arc<EntityLinkRepository>,
}

impl RestAdapter {
    pub fn new(service: ServiceId, client: ApiClient, links: Arc<EntityLinkRepository>) -> Self {
        Self {
            service,
            client,
            links,
        }
    }
}

#[async_trait]
impl ServiceAdapter for RestAdapter {
    fn service(&self) -> ServiceId {
        self.service
    }

    async fn push(&self, job: &sync_job::Model) -> Result<JsonValue, EngineError> {
        let resource = resource_for(self.service, &job.entity_type)
            .ok_or_else(|| EngineError::UnknownEntityType(job.entity_type.clone()))?;

        let payload = job.payload.clone().unwrap_or_else(|| json!({}));

        match job.action.as_str() {
            ACTION_CREATE => {
                let response = self.client.post(resource, payload).await?;
                let id_field = self.service.profile().record_id_field;
                if let Some(remote_id) = extract_remote_id(&response.data, id_field) {
                    self.links
                        .link(&job.entity_type, job.entity_id, self.service, &remote_id)
                        .await?;
                } else {
                    tracing::warn!(
                        job_id = %job.id,
                        service = self.service.as_str(),
                        "create succeeded but response carried no record id"
                    );
                }
                Ok(response.data)
            }
            ACTION_UPDATE => {
                let link = self
                    .links
                    .find(&job.entity_type, job.entity_id, self.service)
                    .await?
                    .ok_or(EngineError::EntityNotFound {
                        entity_type: job.entity_type.clone(),
                        entity_id: job.entity_id,
                    })?;
                let response = self
                    .client
                    .put(&format!("{resource}/{}", link.remote_id), payload)
                    .await?;
                Ok(response.data)
            }
            ACTION_DELETE => {
                let link = self
                    .links
                    .find(&job.entity_type, job.entity_id, self.service)
                    .await?
                    .ok_or(EngineError::EntityNotFound {
                        entity_type: job.entity_type.clone(),
                        entity_id: job.entity_id,
                    })?;
                let response = self
                    .client
                    .delete(&format!("{resource}/{}", link.remote_id))
                    .await?;
                self.links
                    .unlink(&job.entity_type, job.entity_id, self.service)
                    .await?;
                Ok(response.data)
            }
            other => Err(EngineError::MalformedPayload(format!(
                "unsupported sync action: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_table_covers_synced_entities() {
        assert_eq!(resource_for(ServiceId::Fsm, "project"), Some("work-orders"));
        assert_eq!(resource_for(ServiceId::Books, "inventory_item"), Some("items"));
        assert_eq!(resource_for(ServiceId::People, "time_entry"), Some("timesheets"));
        assert_eq!(resource_for(ServiceId::Quoting, "project"), Some("quotes"));
    }

    #[test]
    fn unsupported_combinations_are_none() {
        assert_eq!(resource_for(ServiceId::People, "inventory_item"), None);
        assert_eq!(resource_for(ServiceId::Desk, "time_entry"), None);
    }
}
