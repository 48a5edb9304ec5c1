//! # Service Adapters
//!
//! One adapter per connected service translates a queued sync job into
//! the service's REST vocabulary. The CRM gets a field-mapping adapter;
//! everything else shares the generic passthrough adapter with a
//! per-service resource table.

pub mod crm;
pub mod registry;
pub mod rest;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::EngineError;
use crate::models::sync_job;
use crate::services::ServiceId;

pub use registry::AdapterRegistry;

/// Pushes one outbound sync job to a remote service.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn service(&self) -> ServiceId;

    /// Execute the job against the remote API, returning the response
    /// body for the sync log.
    async fn push(&self, job: &sync_job::Model) -> Result<JsonValue, EngineError>;
}

/// Pull the remote identifier out of a create response.
///
/// Checks the service's documented id field at the top level, then under
/// the common `data` wrapper (object or first array element). Numeric
/// ids are stringified.
pub(crate) fn extract_remote_id(body: &JsonValue, id_field: &str) -> Option<String> {
    fn id_at<'a>(value: &'a JsonValue, field: &str) -> Option<&'a JsonValue> {
        let id = value.get(field)?;
        (!id.is_null()).then_some(id)
    }

    let candidate = id_at(body, id_field)
        .or_else(|| {
            let data = body.get("data")?;
            id_at(data, id_field).or_else(|| id_at(data.get(0)?, id_field))
        })
        .or_else(|| id_at(body.get("data")?.get(0)?.get("details")?, id_field))?;

    match candidate {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_top_level_id() {
        let body = json!({"id": "rec_123"});
        assert_eq!(extract_remote_id(&body, "id"), Some("rec_123".into()));
    }

    #[test]
    fn reads_wrapped_and_numeric_ids() {
        let body = json!({"data": {"id": 987}});
        assert_eq!(extract_remote_id(&body, "id"), Some("987".into()));

        let body = json!({"data": [{"id": "first"}, {"id": "second"}]});
        assert_eq!(extract_remote_id(&body, "id"), Some("first".into()));
    }

    #[test]
    fn reads_details_envelope() {
        let body = json!({"data": [{"code": "SUCCESS", "details": {"id": "487687600000012345"}}]});
        assert_eq!(
            extract_remote_id(&body, "id"),
            Some("487687600000012345".into())
        );
    }

    #[test]
    fn missing_id_is_none() {
        assert_eq!(extract_remote_id(&json!({"ok": true}), "id"), None);
        assert_eq!(extract_remote_id(&JsonValue::Null, "id"), None);
    }
}
