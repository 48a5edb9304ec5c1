//! # Token Manager
//!
//! OAuth2 token lifecycle for every connected service: authorization URL
//! construction, code exchange, transparent refresh and revocation.
//! Tokens are handed out decrypted but are never logged or serialized.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use url::Url;

use crate::config::AppConfig;
use crate::error::EngineError;
use crate::repositories::CredentialRepository;
use crate::services::ServiceId;

/// Tokens expiring within this window are refreshed ahead of use.
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 300;

/// Timeout for calls against the services' OAuth endpoints.
const OAUTH_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
}

/// Manages OAuth2 credentials and token freshness per service.
pub struct TokenManager {
    http: reqwest::Client,
    credentials: Arc<CredentialRepository>,
    config: Arc<AppConfig>,
}

impl TokenManager {
    pub fn new(
        credentials: Arc<CredentialRepository>,
        config: Arc<AppConfig>,
    ) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(OAUTH_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            credentials,
            config,
        })
    }

    /// Return a usable access token for `service`, refreshing if the
    /// stored one is expired or inside the expiry buffer.
    pub async fn get_access_token(&self, service: ServiceId) -> Result<String, EngineError> {
        let credential = self
            .credentials
            .find(service)
            .await?
            .ok_or(EngineError::NotAuthenticated(service))?;

        let fresh = credential.access_token_expires_at.is_some_and(|expires| {
            expires.with_timezone(&Utc) - Utc::now() > Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS)
        });

        if fresh {
            if let Some(token) = self.credentials.decrypt_access_token(&credential)? {
                return Ok(token);
            }
        }

        if !self.refresh_token(service).await? {
            return Err(EngineError::NotAuthenticated(service));
        }

        let refreshed = self
            .credentials
            .find(service)
            .await?
            .ok_or(EngineError::NotAuthenticated(service))?;
        self.credentials
            .decrypt_access_token(&refreshed)?
            .ok_or(EngineError::NotAuthenticated(service))
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Returns `Ok(false)` on any failure without touching stored state,
    /// so a transient outage at the provider never destroys a working
    /// credential row.
    pub async fn refresh_token(&self, service: ServiceId) -> Result<bool, EngineError> {
        let Some(credential) = self.credentials.find(service).await? else {
            tracing::debug!(service = service.as_str(), "no credential row to refresh");
            return Ok(false);
        };
        let Some(refresh_token) = self.credentials.decrypt_refresh_token(&credential)? else {
            tracing::debug!(service = service.as_str(), "no refresh token stored");
            return Ok(false);
        };
        let client_secret = self.credentials.decrypt_client_secret(&credential)?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];

        let response = match self
            .http
            .post(self.token_endpoint(service))
            .form(&params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(service = service.as_str(), error = %err, "token refresh transport failure");
                metrics::counter!("oauth_refresh_failures_total").increment(1);
                return Ok(false);
            }
        };

        let status = response.status();
        let body: TokenResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(service = service.as_str(), error = %err, "token refresh returned unparseable body");
                metrics::counter!("oauth_refresh_failures_total").increment(1);
                return Ok(false);
            }
        };

        if !status.is_success() || body.error.is_some() {
            tracing::warn!(
                service = service.as_str(),
                status = status.as_u16(),
                error = body.error.as_deref().unwrap_or("unknown"),
                "token refresh rejected by provider"
            );
            metrics::counter!("oauth_refresh_failures_total").increment(1);
            return Ok(false);
        }

        let Some(access_token) = body.access_token else {
            tracing::warn!(service = service.as_str(), "token refresh response missing access_token");
            metrics::counter!("oauth_refresh_failures_total").increment(1);
            return Ok(false);
        };

        self.credentials
            .store_tokens(
                service,
                &access_token,
                body.refresh_token.as_deref(),
                body.expires_in.unwrap_or(3600),
            )
            .await?;

        tracing::info!(service = service.as_str(), "access token refreshed");
        metrics::counter!("oauth_refresh_success_total").increment(1);
        Ok(true)
    }

    /// Persist a token pair obtained outside the refresh path.
    pub async fn store_tokens(
        &self,
        service: ServiceId,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: i64,
    ) -> Result<(), EngineError> {
        self.credentials
            .store_tokens(service, access_token, refresh_token, expires_in_secs)
            .await?;
        Ok(())
    }

    /// Forget the stored tokens, keeping the client registration.
    pub async fn revoke(&self, service: ServiceId) -> Result<(), EngineError> {
        self.credentials.clear_tokens(service).await?;
        tracing::info!(service = service.as_str(), "tokens revoked");
        Ok(())
    }

    /// Whether the service has any token material to work with.
    pub async fn is_authenticated(&self, service: ServiceId) -> Result<bool, EngineError> {
        let Some(credential) = self.credentials.find(service).await? else {
            return Ok(false);
        };
        Ok(credential.access_token_ciphertext.is_some()
            || credential.refresh_token_ciphertext.is_some())
    }

    /// Build the browser authorization URL for the consent step.
    pub async fn authorize_url(
        &self,
        service: ServiceId,
        state: &str,
    ) -> Result<String, EngineError> {
        let credential = self
            .credentials
            .find(service)
            .await?
            .ok_or(EngineError::NotAuthenticated(service))?;

        let endpoint = service.authorize_endpoint(&self.config.auth_base(service));
        let mut url = Url::parse(&endpoint)
            .map_err(|err| EngineError::Transport(format!("bad authorize endpoint: {err}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &credential.client_id);
            query.append_pair("scope", service.profile().oauth_scope);
            query.append_pair("state", state);
            query.append_pair("access_type", "offline");
            if let Some(redirect_uri) = &self.config.oauth_redirect_uri {
                query.append_pair("redirect_uri", redirect_uri);
            }
        }

        Ok(url.to_string())
    }

    /// Exchange an authorization code for the initial token pair.
    pub async fn exchange_code(&self, service: ServiceId, code: &str) -> Result<(), EngineError> {
        let credential = self
            .credentials
            .find(service)
            .await?
            .ok_or(EngineError::NotAuthenticated(service))?;
        let client_secret = self.credentials.decrypt_client_secret(&credential)?;

        let redirect_uri = self.config.oauth_redirect_uri.clone().unwrap_or_default();
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(self.token_endpoint(service))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|err| EngineError::Transport(format!("token response unparseable: {err}")))?;

        if !status.is_success() || body.error.is_some() {
            return Err(EngineError::RemoteApi {
                service,
                status: status.as_u16(),
                message: body
                    .error
                    .unwrap_or_else(|| "authorization code exchange failed".to_string()),
            });
        }

        let access_token = body.access_token.ok_or(EngineError::RemoteApi {
            service,
            status: status.as_u16(),
            message: "token response missing access_token".to_string(),
        })?;

        self.credentials
            .store_tokens(
                service,
                &access_token,
                body.refresh_token.as_deref(),
                body.expires_in.unwrap_or(3600),
            )
            .await?;

        tracing::info!(service = service.as_str(), "authorization code exchanged");
        Ok(())
    }

    fn token_endpoint(&self, service: ServiceId) -> String {
        service.token_endpoint(&self.config.auth_base(service))
    }
}

/// Random state parameter for the OAuth consent redirect.
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
