//! # Webhook Receiver
//!
//! Inbound event handling for all connected services. Signatures are
//! verified with a constant-time HMAC-SHA256 comparison over the raw
//! body before any parsing happens, and every call leaves exactly one
//! inbound entry in the sync log regardless of outcome.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use hmac::{Hmac, Mac};
use serde_json::Value as JsonValue;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{EngineError, WebhookResponse};
use crate::models::sync_log::{DIRECTION_INBOUND, STATUS_ERROR, STATUS_SUCCESS};
use crate::repositories::NewSyncLog;
use crate::server::AppState;
use crate::services::ServiceId;

type HmacSha256 = Hmac<Sha256>;

/// Priority assigned to jobs spawned from inbound events.
const WEBHOOK_JOB_PRIORITY: i16 = 1;

/// Verify a hex-encoded HMAC-SHA256 signature over the raw body.
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    signature_hex: &str,
) -> Result<(), EngineError> {
    let provided = hex::decode(signature_hex.trim()).map_err(|_| EngineError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| EngineError::InvalidSignature)?;
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    if expected.ct_eq(provided.as_slice()).into() {
        Ok(())
    } else {
        Err(EngineError::InvalidSignature)
    }
}

/// What the receiver does when a known event arrives.
#[derive(Debug, Clone, Copy)]
enum WebhookAction {
    /// Queue an urgent sync job for the linked entity.
    EnqueueSync {
        entity_type: &'static str,
        action: &'static str,
    },
    /// Mirror a remote decision onto the entity link directly.
    UpdateLocalState { state: &'static str },
}

struct WebhookRoute {
    event: &'static str,
    action: WebhookAction,
}

/// Event routing table per service. Events absent here are acknowledged
/// and ignored so providers never see retry storms for event types we
/// do not care about.
fn routes(service: ServiceId) -> &'static [WebhookRoute] {
    use WebhookAction::*;
    match service {
        ServiceId::Crm => &[
            WebhookRoute {
                event: "deal.updated",
                action: EnqueueSync {
                    entity_type: "project",
                    action: "update",
                },
            },
            WebhookRoute {
                event: "deal.deleted",
                action: EnqueueSync {
                    entity_type: "project",
                    action: "delete",
                },
            },
        ],
        ServiceId::Fsm => &[
            WebhookRoute {
                event: "workorder.completed",
                action: EnqueueSync {
                    entity_type: "project",
                    action: "update",
                },
            },
            WebhookRoute {
                event: "appointment.updated",
                action: EnqueueSync {
                    entity_type: "time_entry",
                    action: "update",
                },
            },
        ],
        ServiceId::Books => &[
            WebhookRoute {
                event: "invoice.paid",
                action: EnqueueSync {
                    entity_type: "project",
                    action: "update",
                },
            },
            WebhookRoute {
                event: "item.updated",
                action: EnqueueSync {
                    entity_type: "inventory_item",
                    action: "update",
                },
            },
        ],
        ServiceId::People => &[
            WebhookRoute {
                event: "timesheet.approved",
                action: UpdateLocalState { state: "approved" },
            },
            WebhookRoute {
                event: "timesheet.rejected",
                action: UpdateLocalState { state: "rejected" },
            },
        ],
        ServiceId::Desk => &[
            WebhookRoute {
                event: "ticket.updated",
                action: EnqueueSync {
                    entity_type: "project",
                    action: "update",
                },
            },
            WebhookRoute {
                event: "ticket.closed",
                action: EnqueueSync {
                    entity_type: "project",
                    action: "update",
                },
            },
        ],
        ServiceId::Quoting => &[
            WebhookRoute {
                event: "quote.accepted",
                action: UpdateLocalState { state: "quote_accepted" },
            },
            WebhookRoute {
                event: "quote.declined",
                action: UpdateLocalState { state: "quote_declined" },
            },
        ],
    }
}

/// POST /webhooks/{service}
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(service): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    let Ok(service) = service.parse::<ServiceId>() else {
        return (
            StatusCode::NOT_FOUND,
            Json(WebhookResponse::failure("unknown service")),
        );
    };

    metrics::counter!("webhooks_received_total", "service" => service.as_str()).increment(1);

    let (status, response, log) = handle_event(&state, service, &headers, &body).await;

    if let Err(err) = state.logs.record(log).await {
        tracing::error!(service = service.as_str(), error = %err, "failed to append webhook log entry");
    }

    (status, Json(response))
}

/// Process one inbound event and describe the log entry it produced.
async fn handle_event(
    state: &AppState,
    service: ServiceId,
    headers: &HeaderMap,
    body: &Bytes,
) -> (StatusCode, WebhookResponse, NewSyncLog) {
    let mut log = NewSyncLog {
        direction: DIRECTION_INBOUND.to_string(),
        service: service.as_str().to_string(),
        action: "unknown".to_string(),
        status: STATUS_ERROR.to_string(),
        ..NewSyncLog::default()
    };

    // Signature first: nothing in the body is trusted until it checks out.
    if let Some(secret) = state.config.webhook_secret(service) {
        let signature = headers
            .get(service.profile().signature_header)
            .and_then(|v| v.to_str().ok());

        let verified = match signature {
            Some(signature) => verify_signature(secret, body, signature).is_ok(),
            None => false,
        };

        if !verified {
            tracing::warn!(service = service.as_str(), "webhook signature rejected");
            metrics::counter!("webhooks_rejected_total", "service" => service.as_str())
                .increment(1);
            log.error_message = Some("invalid signature".to_string());
            return (
                StatusCode::UNAUTHORIZED,
                WebhookResponse::failure("invalid signature"),
                log,
            );
        }
    } else {
        tracing::debug!(
            service = service.as_str(),
            "no webhook secret configured, skipping signature verification"
        );
    }

    let payload: JsonValue = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(err) => {
            log.error_message = Some(format!("malformed payload: {err}"));
            return (
                StatusCode::BAD_REQUEST,
                WebhookResponse::failure("malformed payload"),
                log,
            );
        }
    };
    log.request_data = Some(payload.clone());
    log.status = STATUS_SUCCESS.to_string();

    let profile = service.profile();
    let Some(event) = payload.get(profile.event_field).and_then(JsonValue::as_str) else {
        log.action = "missing_event".to_string();
        return (
            StatusCode::OK,
            WebhookResponse::ok("ignored: no event field"),
            log,
        );
    };
    log.action = event.to_string();

    let Some(route) = routes(service).iter().find(|r| r.event == event) else {
        return (
            StatusCode::OK,
            WebhookResponse::ok("ignored: unhandled event"),
            log,
        );
    };

    let record_id = payload
        .get(profile.record_id_field)
        .or_else(|| payload.get("data")?.get(profile.record_id_field))
        .and_then(|id| match id {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        });

    let Some(record_id) = record_id else {
        log.status = STATUS_ERROR.to_string();
        log.error_message = Some("payload missing record id".to_string());
        return (
            StatusCode::BAD_REQUEST,
            WebhookResponse::failure("payload missing record id"),
            log,
        );
    };

    let link = match state.links.find_by_remote(service, &record_id).await {
        Ok(link) => link,
        Err(err) => return internal_error(err, log),
    };

    let Some(link) = link else {
        tracing::debug!(
            service = service.as_str(),
            remote_id = %record_id,
            "webhook references an unmapped record"
        );
        return (
            StatusCode::OK,
            WebhookResponse::ok("skipped: record not linked"),
            log,
        );
    };

    log.entity_type = Some(link.entity_type.clone());
    log.entity_id = Some(link.entity_id);

    match route.action {
        WebhookAction::EnqueueSync {
            entity_type,
            action,
        } => {
            let result = state
                .jobs
                .enqueue(
                    entity_type,
                    link.entity_id,
                    service,
                    action,
                    WEBHOOK_JOB_PRIORITY,
                    Some(payload),
                )
                .await;
            match result {
                Ok(job) => (
                    StatusCode::OK,
                    WebhookResponse::ok_with_data(
                        "processed: sync queued",
                        serde_json::json!({"job_id": job.id}),
                    ),
                    log,
                ),
                Err(err) => internal_error(err, log),
            }
        }
        WebhookAction::UpdateLocalState { state: new_state } => {
            match state.links.set_local_state(link.id, new_state).await {
                Ok(()) => (
                    StatusCode::OK,
                    WebhookResponse::ok_with_data(
                        "processed: local state updated",
                        serde_json::json!({"local_state": new_state}),
                    ),
                    log,
                ),
                Err(err) => internal_error(err, log),
            }
        }
    }
}

fn internal_error(
    err: EngineError,
    mut log: NewSyncLog,
) -> (StatusCode, WebhookResponse, NewSyncLog) {
    tracing::error!(error = %err, "webhook handler failed");
    log.status = STATUS_ERROR.to_string();
    log.error_message = Some(err.to_string());
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        WebhookResponse::failure("internal error"),
        log,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"event":"timesheet.approved"}"#;
        let signature = sign("topsecret", body);
        assert!(verify_signature("topsecret", body, &signature).is_ok());
    }

    #[test]
    fn tampered_body_fails() {
        let signature = sign("topsecret", b"original");
        assert!(verify_signature("topsecret", b"tampered", &signature).is_err());
    }

    #[test]
    fn wrong_secret_fails() {
        let body = b"payload";
        let signature = sign("secret-a", body);
        assert!(verify_signature("secret-b", body, &signature).is_err());
    }

    #[test]
    fn non_hex_signature_fails() {
        assert!(verify_signature("secret", b"payload", "not-hex!").is_err());
    }

    #[test]
    fn every_service_has_routes() {
        for service in ServiceId::ALL {
            assert!(!routes(service).is_empty());
        }
    }
}
