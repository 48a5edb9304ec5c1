//! # Error Handling
//!
//! Unified error taxonomy for the sync engine. Components return
//! [`EngineError`] values; the webhook receiver renders them as the
//! `{success, message}` JSON envelope with an appropriate HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::services::ServiceId;

/// Error taxonomy for the sync engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("service {0} is not authenticated")]
    NotAuthenticated(ServiceId),

    #[error("rate limit exceeded for service {service}")]
    RateLimitExceeded { service: ServiceId },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote API error from {service} (status {status}): {message}")]
    RemoteApi {
        service: ServiceId,
        status: u16,
        message: String,
    },

    #[error("webhook signature verification failed")]
    InvalidSignature,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("no local entity for {entity_type} #{entity_id}")]
    EntityNotFound {
        entity_type: String,
        entity_id: i64,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl EngineError {
    /// HTTP status used when this error surfaces through the webhook
    /// receiver or the operational endpoints.
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::InvalidSignature => StatusCode::UNAUTHORIZED,
            EngineError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            EngineError::UnknownEntityType(_) => StatusCode::BAD_REQUEST,
            EngineError::EntityNotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            EngineError::NotAuthenticated(_) => StatusCode::BAD_GATEWAY,
            EngineError::RemoteApi { .. } => StatusCode::BAD_GATEWAY,
            EngineError::Transport(_) => StatusCode::BAD_GATEWAY,
            EngineError::Crypto(_) | EngineError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether a sync job that failed with this error is worth retrying.
    ///
    /// Client-side protocol errors (4xx other than 401/429) will fail the
    /// same way again; everything transient stays retryable and the queue
    /// attempt cap bounds the damage.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Transport(_) => true,
            EngineError::RateLimitExceeded { .. } => true,
            EngineError::NotAuthenticated(_) => true,
            EngineError::Database(_) => true,
            EngineError::RemoteApi { status, .. } => {
                *status == 401 || *status == 429 || *status >= 500
            }
            EngineError::InvalidSignature
            | EngineError::MalformedPayload(_)
            | EngineError::UnknownEntityType(_)
            | EngineError::EntityNotFound { .. }
            | EngineError::Crypto(_) => false,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            EngineError::Transport(format!("request timed out: {}", error))
        } else {
            EngineError::Transport(error.to_string())
        }
    }
}

/// JSON envelope returned by every webhook and operational endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl WebhookResponse {
    pub fn ok<S: Into<String>>(message: S) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with_data<S: Into<String>>(message: S, data: JsonValue) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the logs, not in the response body.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error surfaced to HTTP response");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        (status, axum::Json(WebhookResponse::failure(message))).into_response()
    }
}
