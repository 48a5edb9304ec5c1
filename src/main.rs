use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use migration::{Migrator, MigratorTrait};
use tokio_util::sync::CancellationToken;

use syncbridge::adapters::AdapterRegistry;
use syncbridge::config::ConfigLoader;
use syncbridge::crypto::CryptoKey;
use syncbridge::db::init_pool;
use syncbridge::rate_limit::RateLimiter;
use syncbridge::repositories::{
    CredentialRepository, EntityLinkRepository, SyncJobRepository, SyncLogRepository,
};
use syncbridge::server::{AppState, run_server};
use syncbridge::services::ServiceId;
use syncbridge::telemetry::init_tracing;
use syncbridge::token_manager::TokenManager;
use syncbridge::worker::SyncWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(ConfigLoader::new().load().context("loading configuration")?);
    init_tracing(&config)?;

    tracing::info!(
        profile = config.profile,
        config = %config.redacted_json().unwrap_or_default(),
        "starting syncbridge"
    );

    let db = init_pool(&config).await.context("initializing database")?;
    Migrator::up(&db, None).await.context("running migrations")?;

    let key_bytes = config
        .crypto_key
        .clone()
        .context("crypto key missing after validation")?;
    let key = CryptoKey::new(key_bytes).context("building crypto key")?;

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

    let shutdown = CancellationToken::new();

    let worker = SyncWorker::new(
        Arc::clone(&config),
        Arc::clone(&jobs),
        Arc::clone(&logs),
        Arc::clone(&adapters),
    );
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    let state = AppState {
        db,
        config: Arc::clone(&config),
        jobs,
        logs,
        links,
        credentials,
        tokens,
    };

    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(run_server(state, server_shutdown));

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    tracing::info!("shutdown signal received");
    shutdown.cancel();

    if let Err(err) = worker_handle.await {
        tracing::error!(error = %err, "worker task panicked");
    }
    match server_handle.await {
        Ok(result) => result?,
        Err(err) => tracing::error!(error = %err, "server task panicked"),
    }

    tracing::info!("syncbridge stopped");
    Ok(())
}
