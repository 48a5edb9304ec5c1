//! # HTTP Server
//!
//! Axum application exposing the webhook receiver, OAuth connect flow
//! and the operational read endpoints over queue and log state.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::EngineError;
use crate::repositories::{
    CredentialRepository, EntityLinkRepository, SyncJobRepository, SyncLogRepository,
};
use crate::services::ServiceId;
use crate::token_manager::{TokenManager, generate_state};
use crate::webhooks::receive_webhook;

const DEFAULT_LIST_LIMIT: u64 = 50;
const MAX_LIST_LIMIT: u64 = 200;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub jobs: Arc<SyncJobRepository>,
    pub logs: Arc<SyncLogRepository>,
    pub links: Arc<EntityLinkRepository>,
    pub credentials: Arc<CredentialRepository>,
    pub tokens: Arc<TokenManager>,
}

/// Build the application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/{service}", post(receive_webhook))
        .route("/oauth/{service}/authorize", get(oauth_authorize))
        .route("/oauth/{service}/callback", get(oauth_callback))
        .route("/sync/jobs", get(list_jobs))
        .route("/sync/logs", get(list_logs))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the shutdown token fires.
pub async fn run_server(
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error> {
    let addr = state.config.bind_addr()?;
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<JsonValue>) {
    match crate::db::health_check(&state.db).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(err) => {
            tracing::error!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "degraded", "database": "unreachable"})),
            )
        }
    }
}

/// Start the OAuth consent flow for a service.
async fn oauth_authorize(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<JsonValue>, EngineError> {
    let service = parse_service(&service)?;
    let oauth_state = generate_state();
    let url = state.tokens.authorize_url(service, &oauth_state).await?;
    Ok(Json(json!({"url": url, "state": oauth_state})))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: String,
}

/// Complete the OAuth consent flow with the provider's code.
async fn oauth_callback(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<JsonValue>, EngineError> {
    let service = parse_service(&service)?;
    state.tokens.exchange_code(service, &query.code).await?;
    Ok(Json(
        json!({"success": true, "message": "service connected"}),
    ))
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    status: Option<String>,
    limit: Option<u64>,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<JsonValue>, EngineError> {
    let limit = clamp_limit(query.limit);
    let jobs = state.jobs.list(query.status.as_deref(), limit).await?;
    Ok(Json(json!({"jobs": jobs})))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    service: Option<String>,
    direction: Option<String>,
    limit: Option<u64>,
}

async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<JsonValue>, EngineError> {
    let limit = clamp_limit(query.limit);
    let logs = state
        .logs
        .list(query.service.as_deref(), query.direction.as_deref(), limit)
        .await?;
    Ok(Json(json!({"logs": logs})))
}

fn parse_service(slug: &str) -> Result<ServiceId, EngineError> {
    slug.parse::<ServiceId>()
        .map_err(|err| EngineError::MalformedPayload(err.to_string()))
}

fn clamp_limit(limit: Option<u64>) -> u64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
}
