//! # Sync Worker
//!
//! Background loop that drains the sync queue. Each tick sweeps stale
//! jobs, requeues retryable failures, then claims and pushes a batch of
//! pending jobs through the service adapters. The loop stops cleanly
//! when its cancellation token fires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::adapters::AdapterRegistry;
use crate::config::AppConfig;
use crate::models::sync_job;
use crate::models::sync_log::{DIRECTION_OUTBOUND, STATUS_ERROR, STATUS_SUCCESS};
use crate::repositories::{NewSyncLog, SyncJobRepository, SyncLogRepository};
use crate::services::ServiceId;

pub struct SyncWorker {
    config: Arc<AppConfig>,
    jobs: Arc<SyncJobRepository>,
    logs: Arc<SyncLogRepository>,
    adapters: Arc<AdapterRegistry>,
}

impl SyncWorker {
    pub fn new(
        config: Arc<AppConfig>,
        jobs: Arc<SyncJobRepository>,
        logs: Arc<SyncLogRepository>,
        adapters: Arc<AdapterRegistry>,
    ) -> Self {
        Self {
            config,
            jobs,
            logs,
            adapters,
        }
    }

    /// Run until cancelled, processing one batch per tick.
    pub async fn run(self, shutdown: CancellationToken) {
        let tick = Duration::from_secs(self.config.worker.tick_seconds);
        tracing::info!(
            tick_seconds = self.config.worker.tick_seconds,
            batch_size = self.config.worker.batch_size,
            "sync worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("sync worker stopping");
                    return;
                }
                _ = tokio::time::sleep(tick) => {
                    let started = Instant::now();
                    if let Err(err) = self.tick().await {
                        tracing::error!(error = %err, "worker tick failed");
                    }
                    metrics::histogram!("sync_worker_tick_seconds")
                        .record(started.elapsed().as_secs_f64());
                }
            }
        }
    }

    /// One pass over the queue.
    pub async fn tick(&self) -> Result<(), crate::error::EngineError> {
        self.jobs
            .fail_stale(self.config.worker.staleness_seconds)
            .await?;
        self.jobs
            .requeue_retryable(self.config.worker.max_retries)
            .await?;

        let batch = self.jobs.fetch_pending(self.config.worker.batch_size).await?;
        for job in batch {
            // Claim may lose to a concurrent worker; skipping is correct.
            if !self.jobs.claim(job.id).await? {
                continue;
            }
            self.process_job(&job).await;
        }
        Ok(())
    }

    /// Push one claimed job and record the outcome.
    async fn process_job(&self, job: &sync_job::Model) {
        let service: ServiceId = match job.service.parse() {
            Ok(service) => service,
            Err(_) => {
                self.finish_failed(job, None, "job references unknown service")
                    .await;
                return;
            }
        };

        let Some(adapter) = self.adapters.get(service) else {
            self.finish_failed(job, Some(service), "no adapter registered for service")
                .await;
            return;
        };

        let started = Instant::now();
        match adapter.push(job).await {
            Ok(response) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                if let Err(err) = self.jobs.mark_completed(job.id).await {
                    tracing::error!(job_id = %job.id, error = %err, "failed to mark job completed");
                }
                self.append_log(job, service.as_str(), STATUS_SUCCESS, Some(response), None, duration_ms)
                    .await;
                tracing::info!(
                    job_id = %job.id,
                    service = service.as_str(),
                    action = job.action,
                    duration_ms,
                    "sync job completed"
                );
            }
            Err(err) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                let retryable = err.is_retryable();
                let message = err.to_string();
                // A deterministic failure would repeat on every attempt,
                // so it exhausts the retry budget immediately.
                let marked = if retryable {
                    self.jobs.mark_failed(job.id, &message).await
                } else {
                    self.jobs
                        .mark_failed_permanent(job.id, &message, self.config.worker.max_retries)
                        .await
                };
                if let Err(mark_err) = marked {
                    tracing::error!(job_id = %job.id, error = %mark_err, "failed to mark job failed");
                }
                self.append_log(
                    job,
                    service.as_str(),
                    STATUS_ERROR,
                    None,
                    Some(message.clone()),
                    duration_ms,
                )
                .await;
                tracing::warn!(
                    job_id = %job.id,
                    service = service.as_str(),
                    action = job.action,
                    retryable,
                    error = %message,
                    "sync job failed"
                );
            }
        }
    }

    /// Fail a job that can never succeed, such as one referencing an
    /// unknown service or a service with no adapter.
    async fn finish_failed(
        &self,
        job: &sync_job::Model,
        service: Option<ServiceId>,
        message: &str,
    ) {
        if let Err(err) = self
            .jobs
            .mark_failed_permanent(job.id, message, self.config.worker.max_retries)
            .await
        {
            tracing::error!(job_id = %job.id, error = %err, "failed to mark job failed");
        }
        let slug = service.map(|s| s.as_str()).unwrap_or(job.service.as_str());
        self.append_log(job, slug, STATUS_ERROR, None, Some(message.to_string()), 0)
            .await;
    }

    async fn append_log(
        &self,
        job: &sync_job::Model,
        service: &str,
        status: &str,
        response: Option<serde_json::Value>,
        error_message: Option<String>,
        duration_ms: i64,
    ) {
        let entry = NewSyncLog {
            entity_type: Some(job.entity_type.clone()),
            entity_id: Some(job.entity_id),
            direction: DIRECTION_OUTBOUND.to_string(),
            service: service.to_string(),
            action: job.action.clone(),
            status: status.to_string(),
            request_data: job.payload.clone(),
            response_data: response,
            error_message,
            duration_ms,
        };
        if let Err(err) = self.logs.record(entry).await {
            tracing::error!(job_id = %job.id, error = %err, "failed to append sync log entry");
        }
    }
}
