//! CRM adapter. Projects map onto CRM deals with an explicit field
//! translation, since the CRM's record schema does not mirror the local
//! one the way the other services do.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

use crate::api_client::ApiClient;
use crate::error::EngineError;
use crate::models::sync_job::{self, ACTION_CREATE, ACTION_DELETE, ACTION_UPDATE};
use crate::repositories::EntityLinkRepository;
use crate::services::ServiceId;

use super::{ServiceAdapter, extract_remote_id};

pub struct CrmAdapter {
    client: ApiClient,
    links: Arc<EntityLinkRepository>,
}

impl CrmAdapter {
    pub fn new(client: ApiClient, links: Arc<EntityLinkRepository>) -> Self {
        Self {
            client,
            links,
        }
    }

    /// Translate a local project snapshot into CRM deal fields.
    fn map_project(payload: &JsonValue) -> JsonValue {
        let mut deal = serde_json::Map::new();
        if let Some(name) = payload.get("name").and_then(JsonValue::as_str) {
            deal.insert("Deal_Name".into(), json!(name));
        }
        if let Some(description) = payload.get("description").and_then(JsonValue::as_str) {
            deal.insert("Description".into(), json!(description));
        }
        if let Some(status) = payload.get("status").and_then(JsonValue::as_str) {
            deal.insert("Stage".into(), json!(map_stage(status)));
        }
        if let Some(amount) = payload.get("budget").and_then(JsonValue::as_f64) {
            deal.insert("Amount".into(), json!(amount));
        }
        json!({"data": [JsonValue::Object(deal)]})
    }
}

/// Local project statuses expressed in the CRM's pipeline vocabulary.
fn map_stage(status: &str) -> &'static str {
    match status {
        "draft" => "Qualification",
        "active" => "Negotiation",
        "completed" => "Closed Won",
        "cancelled" => "Closed Lost",
        _ => "Qualification",
    }
}

#[async_trait]
impl ServiceAdapter for CrmAdapter {
    fn service(&self) -> ServiceId {
        ServiceId::Crm
    }

    async fn push(&self, job: &sync_job::Model) -> Result<JsonValue, EngineError> {
        if job.entity_type != "project" {
            return Err(EngineError::UnknownEntityType(job.entity_type.clone()));
        }

        let payload = job.payload.clone().unwrap_or(JsonValue::Null);

        match job.action.as_str() {
            ACTION_CREATE => {
                let body = Self::map_project(&payload);
                let response = self.client.post("deals", body).await?;
                let id_field = ServiceId::Crm.profile().record_id_field;
                if let Some(remote_id) = extract_remote_id(&response.data, id_field) {
                    self.links
                        .link(&job.entity_type, job.entity_id, ServiceId::Crm, &remote_id)
                        .await?;
                } else {
                    tracing::warn!(
                        job_id = %job.id,
                        "CRM create succeeded but response carried no record id"
                    );
                }
                Ok(response.data)
            }
            ACTION_UPDATE => {
                let link = self
                    .links
                    .find(&job.entity_type, job.entity_id, ServiceId::Crm)
                    .await?
                    .ok_or(EngineError::EntityNotFound {
                        entity_type: job.entity_type.clone(),
                        entity_id: job.entity_id,
                    })?;
                let body = Self::map_project(&payload);
                let response = self
                    .client
                    .put(&format!("deals/{}", link.remote_id), body)
                    .await?;
                Ok(response.data)
            }
            ACTION_DELETE => {
                let link = self
                    .links
                    .find(&job.entity_type, job.entity_id, ServiceId::Crm)
                    .await?
                    .ok_or(EngineError::EntityNotFound {
                        entity_type: job.entity_type.clone(),
                        entity_id: job.entity_id,
                    })?;
                let response = self
                    .client
                    .delete(&format!("deals/{}", link.remote_id))
                    .await?;
                self.links
                    .unlink(&job.entity_type, job.entity_id, ServiceId::Crm)
                    .await?;
                Ok(response.data)
            }
            other => Err(EngineError::MalformedPayload(format!(
                "unsupported sync action: {other}"
            ))),
        }
    }
}
