//! Test utilities: in-memory database setup and a fully wired engine
//! harness for integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use sha2::Sha256;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

use syncbridge::adapters::AdapterRegistry;
use syncbridge::config::{AppConfig, ServiceConfig};
use syncbridge::crypto::CryptoKey;
use syncbridge::rate_limit::RateLimiter;
use syncbridge::repositories::{
    CredentialRepository, EntityLinkRepository, SyncJobRepository, SyncLogRepository,
};
use syncbridge::server::{AppState, create_app};
use syncbridge::services::ServiceId;
use syncbridge::token_manager::TokenManager;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Baseline configuration with a fixed test crypto key.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    AppConfig {
        crypto_key: Some(vec![7u8; 32]),
        ..AppConfig::default()
    }
}

/// Point one service's API and OAuth hosts at a mock server.
#[allow(dead_code)]
pub fn override_service(config: &mut AppConfig, service: ServiceId, entry: ServiceConfig) {
    config.services.insert(service.as_str().to_string(), entry);
}

/// Everything the engine wires at startup, built against a test database.
#[allow(dead_code)]
pub struct TestEngine {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub credentials: Arc<CredentialRepository>,
    pub jobs: Arc<SyncJobRepository>,
    pub logs: Arc<SyncLogRepository>,
    pub links: Arc<EntityLinkRepository>,
    pub tokens: Arc<TokenManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub adapters: Arc<AdapterRegistry>,
}

#[allow(dead_code)]
pub async fn build_engine(config: AppConfig) -> Result<TestEngine> {
    let db = setup_test_db().await?;
    let config = Arc::new(config);

    let key_bytes = config.crypto_key.clone().context("test config needs a crypto key")?;
    let key = CryptoKey::new(key_bytes)?;

    let credentials = Arc::new(CredentialRepository::new(db.clone(), key));
    let jobs = Arc::new(SyncJobRepository::new(db.clone()));
    let logs = Arc::new(SyncLogRepository::new(db.clone()));
    let links = Arc::new(EntityLinkRepository::new(db.clone()));
    let tokens = Arc::new(TokenManager::new(
        Arc::clone(&credentials),
        Arc::clone(&config),
    )?);

    let mut limits = HashMap::new();
    for service in ServiceId::ALL {
        limits.insert(service, config.rate_limit_per_minute(service));
    }
    let rate_limiter = Arc::new(RateLimiter::new(limits));

    let adapters = Arc::new(AdapterRegistry::build(
        Arc::clone(&tokens),
        Arc::clone(&rate_limiter),
        Arc::clone(&links),
        Arc::clone(&config),
    )?);

    Ok(TestEngine {
        db,
        config,
        credentials,
        jobs,
        logs,
        links,
        tokens,
        rate_limiter,
        adapters,
    })
}

/// Register a client and store a valid token pair for a service.
#[allow(dead_code)]
pub async fn seed_tokens(
    engine: &TestEngine,
    service: ServiceId,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in_secs: i64,
) -> Result<()> {
    engine
        .credentials
        .upsert_client(service, "test-client-id", "test-client-secret")
        .await?;
    engine
        .credentials
        .store_tokens(service, access_token, refresh_token, expires_in_secs)
        .await?;
    Ok(())
}

#[allow(dead_code)]
pub fn app_state(engine: &TestEngine) -> AppState {
    AppState {
        db: engine.db.clone(),
        config: Arc::clone(&engine.config),
        jobs: Arc::clone(&engine.jobs),
        logs: Arc::clone(&engine.logs),
        links: Arc::clone(&engine.links),
        credentials: Arc::clone(&engine.credentials),
        tokens: Arc::clone(&engine.tokens),
    }
}

/// Hex HMAC-SHA256 over a webhook body, as the services would send it.
#[allow(dead_code)]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[allow(dead_code)]
pub struct TestServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl Drop for TestServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Spawn the application on a random local port.
#[allow(dead_code)]
pub async fn spawn_app(engine: &TestEngine) -> Result<(String, TestServerHandle)> {
    let app = create_app(app_state(engine));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server_url = format!("http://{}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .context("axum server error")
    });

    Ok((
        server_url,
        TestServerHandle {
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(join_handle),
        },
    ))
}
