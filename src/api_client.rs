//! # API Client
//!
//! Authenticated HTTP client for one service. Every request goes through
//! the rate limiter and token manager; a single 401 triggers one token
//! refresh and one retry before the error surfaces.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::config::AppConfig;
use crate::error::EngineError;
use crate::rate_limit::RateLimiter;
use crate::services::ServiceId;
use crate::token_manager::TokenManager;

const API_HTTP_TIMEOUT_SECS: u64 = 30;

/// Successful response from a service API.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub data: JsonValue,
    pub duration_ms: i64,
}

/// Rate-limited, token-bearing client bound to a single service.
pub struct ApiClient {
    service: ServiceId,
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    rate_limiter: Arc<RateLimiter>,
    config: Arc<AppConfig>,
}

impl ApiClient {
    pub fn new(
        service: ServiceId,
        tokens: Arc<TokenManager>,
        rate_limiter: Arc<RateLimiter>,
        config: Arc<AppConfig>,
    ) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            service,
            http,
            tokens,
            rate_limiter,
            config,
        })
    }

    pub fn service(&self) -> ServiceId {
        self.service
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, EngineError> {
        self.execute(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: JsonValue) -> Result<ApiResponse, EngineError> {
        self.execute(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: JsonValue) -> Result<ApiResponse, EngineError> {
        self.execute(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, EngineError> {
        self.execute(Method::DELETE, path, None).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<JsonValue>,
    ) -> Result<ApiResponse, EngineError> {
        let url = self.build_url(path);
        let started = Instant::now();
        let mut refreshed = false;

        loop {
            // The post-refresh retry is an outbound request too, so it
            // has to pass the window check on its own.
            if !self.rate_limiter.check(self.service) {
                metrics::counter!("api_rate_limited_total", "service" => self.service.as_str())
                    .increment(1);
                return Err(EngineError::RateLimitExceeded {
                    service: self.service,
                });
            }

            let token = self.tokens.get_access_token(self.service).await?;

            let mut request = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&token);
            if let Some(body) = &body {
                request = request.json(body);
            }

            // Dispatch counts against the window whether or not the
            // remote ever answers.
            self.rate_limiter.record(self.service);
            let response = request.send().await?;
            let status = response.status();

            if status.as_u16() == 401 && !refreshed {
                tracing::debug!(
                    service = self.service.as_str(),
                    path,
                    "got 401, refreshing token and retrying once"
                );
                if !self.tokens.refresh_token(self.service).await? {
                    return Err(EngineError::NotAuthenticated(self.service));
                }
                refreshed = true;
                continue;
            }

            let duration_ms = started.elapsed().as_millis() as i64;
            let data: JsonValue = response.json().await.unwrap_or(JsonValue::Null);

            if status.is_success() {
                return Ok(ApiResponse {
                    status: status.as_u16(),
                    data,
                    duration_ms,
                });
            }

            return Err(EngineError::RemoteApi {
                service: self.service,
                status: status.as_u16(),
                message: extract_error_message(&data, status.as_u16()),
            });
        }
    }

    fn build_url(&self, path: &str) -> String {
        let base = self.config.api_base(self.service);
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Pull the most useful human-readable message out of an error body.
///
/// Services disagree on their error envelope, so this walks the common
/// shapes in order: a top-level `message`, an `error` string or object,
/// then `code` plus `details`.
fn extract_error_message(body: &JsonValue, status: u16) -> String {
    if let Some(message) = body.get("message").and_then(JsonValue::as_str) {
        return message.to_string();
    }

    if let Some(error) = body.get("error") {
        if let Some(text) = error.as_str() {
            return text.to_string();
        }
        if let Some(nested) = error.get("message").and_then(JsonValue::as_str) {
            return nested.to_string();
        }
    }

    if let Some(code) = body.get("code") {
        let details = body
            .get("details")
            .and_then(JsonValue::as_str)
            .unwrap_or("");
        if details.is_empty() {
            return format!("error code {code}");
        }
        return format!("error code {code}: {details}");
    }

    format!("request failed with status {status}")
}
