//! # Sync Job Repository
//!
//! Queue operations for sync jobs. Enqueue coalesces duplicate pending
//! work, claiming is an optimistic compare-and-set on the status column,
//! and retry bookkeeping lives here so the worker stays thin.

use chrono::{Duration, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::sync_job::{
    ActiveModel, Column, Entity, Model, STATUS_COMPLETED, STATUS_FAILED, STATUS_PENDING,
    STATUS_PROCESSING,
};
use crate::services::ServiceId;

/// Error message attached to jobs swept out of a stale processing state.
const STALE_SWEEP_MESSAGE: &str = "processing timed out; worker presumed dead";

/// Repository for the sync job queue.
pub struct SyncJobRepository {
    db: DatabaseConnection,
}

impl SyncJobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Queue an outbound sync, coalescing with any pending duplicate.
    ///
    /// A partial unique index holds at most one pending row per
    /// `(entity_type, entity_id, service)` tuple, so a duplicate enqueue
    /// becomes an in-place update of the pending job's action, priority
    /// and payload even when callers race. Jobs that are already
    /// processing, completed or failed never coalesce.
    pub async fn enqueue(
        &self,
        entity_type: &str,
        entity_id: i64,
        service: ServiceId,
        action: &str,
        priority: i16,
        payload: Option<JsonValue>,
    ) -> Result<Model, EngineError> {
        let now = Utc::now().fixed_offset();

        let job = ActiveModel {
            id: Set(Uuid::new_v4()),
            entity_type: Set(entity_type.to_string()),
            entity_id: Set(entity_id),
            service: Set(service.as_str().to_string()),
            action: Set(action.to_string()),
            priority: Set(priority),
            payload: Set(payload),
            status: Set(STATUS_PENDING.to_string()),
            attempts: Set(0),
            error_message: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let stored = Entity::insert(job)
            .on_conflict(
                OnConflict::columns([Column::EntityType, Column::EntityId, Column::Service])
                    // The predicate must be inlined, not bound: SQLite only
                    // matches a conflict target to a partial index when the
                    // WHERE expression is literally identical to the index's.
                    .target_and_where(
                        Expr::col(Column::Status).eq(Expr::cust(format!("'{STATUS_PENDING}'"))),
                    )
                    .update_columns([
                        Column::Action,
                        Column::Priority,
                        Column::Payload,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_with_returning(&self.db)
            .await?;
        metrics::counter!("sync_jobs_enqueued_total").increment(1);
        Ok(stored)
    }

    /// Fetch up to `limit` pending jobs, most urgent first.
    ///
    /// Ordering is priority ascending, then creation time ascending, so
    /// equal-priority jobs are processed in arrival order.
    pub async fn fetch_pending(&self, limit: u64) -> Result<Vec<Model>, EngineError> {
        let jobs = Entity::find()
            .filter(Column::Status.eq(STATUS_PENDING))
            .order_by_asc(Column::Priority)
            .order_by_asc(Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(jobs)
    }

    /// Atomically move a pending job to processing.
    ///
    /// Returns `false` when the job was already claimed, completed or
    /// removed; the compare-and-set on status makes concurrent workers
    /// safe without row locks.
    pub async fn claim(&self, job_id: Uuid) -> Result<bool, EngineError> {
        let now = Utc::now().fixed_offset();
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_PROCESSING))
            .col_expr(Column::StartedAt, Expr::value(Some(now)))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(STATUS_PENDING))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Mark a job as completed and clear any stale error message.
    pub async fn mark_completed(&self, job_id: Uuid) -> Result<(), EngineError> {
        let now = Utc::now().fixed_offset();
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_COMPLETED))
            .col_expr(Column::ErrorMessage, Expr::value(Option::<String>::None))
            .col_expr(Column::CompletedAt, Expr::value(Some(now)))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(job_id))
            .exec(&self.db)
            .await?;
        metrics::counter!("sync_jobs_completed_total").increment(1);
        Ok(())
    }

    /// Mark a job as failed, recording the error and burning one attempt.
    pub async fn mark_failed(&self, job_id: Uuid, error_message: &str) -> Result<(), EngineError> {
        let now = Utc::now().fixed_offset();
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_FAILED))
            .col_expr(
                Column::ErrorMessage,
                Expr::value(Some(error_message.to_string())),
            )
            .col_expr(Column::Attempts, Expr::col(Column::Attempts).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(job_id))
            .exec(&self.db)
            .await?;
        metrics::counter!("sync_jobs_failed_total").increment(1);
        Ok(())
    }

    /// Mark a job as failed with no retry budget left.
    ///
    /// Used for deterministic failures that would repeat identically on
    /// every attempt; the retry pass never picks these back up.
    pub async fn mark_failed_permanent(
        &self,
        job_id: Uuid,
        error_message: &str,
        max_retries: i32,
    ) -> Result<(), EngineError> {
        let now = Utc::now().fixed_offset();
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_FAILED))
            .col_expr(
                Column::ErrorMessage,
                Expr::value(Some(error_message.to_string())),
            )
            .col_expr(Column::Attempts, Expr::value(max_retries))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(job_id))
            .exec(&self.db)
            .await?;
        metrics::counter!("sync_jobs_failed_total").increment(1);
        Ok(())
    }

    /// Return failed jobs with attempts left to the pending pool.
    ///
    /// Jobs at or past `max_retries` attempts stay failed until an
    /// operator intervenes.
    pub async fn requeue_retryable(&self, max_retries: i32) -> Result<u64, EngineError> {
        let now = Utc::now().fixed_offset();
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_PENDING))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Status.eq(STATUS_FAILED))
            .filter(Column::Attempts.lt(max_retries))
            .exec(&self.db)
            .await?;
        if result.rows_affected > 0 {
            tracing::info!(count = result.rows_affected, "requeued retryable sync jobs");
        }
        Ok(result.rows_affected)
    }

    /// Fail jobs stuck in processing longer than the staleness threshold.
    ///
    /// A stale job means its worker died mid-flight, so the interrupted
    /// run counts as an attempt. The retry pass picks the job back up if
    /// it still has attempts left.
    pub async fn fail_stale(&self, staleness_seconds: i64) -> Result<u64, EngineError> {
        let now = Utc::now().fixed_offset();
        let cutoff = now - Duration::seconds(staleness_seconds);
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_FAILED))
            .col_expr(
                Column::ErrorMessage,
                Expr::value(Some(STALE_SWEEP_MESSAGE.to_string())),
            )
            .col_expr(Column::Attempts, Expr::col(Column::Attempts).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Status.eq(STATUS_PROCESSING))
            .filter(Column::UpdatedAt.lt(cutoff))
            .exec(&self.db)
            .await?;
        if result.rows_affected > 0 {
            tracing::warn!(count = result.rows_affected, "swept stale processing jobs");
            metrics::counter!("sync_jobs_stale_swept_total").increment(result.rows_affected);
        }
        Ok(result.rows_affected)
    }

    pub async fn find_by_id(&self, job_id: Uuid) -> Result<Option<Model>, EngineError> {
        let job = Entity::find_by_id(job_id).one(&self.db).await?;
        Ok(job)
    }

    /// List jobs for the operational endpoint, newest first.
    pub async fn list(&self, status: Option<&str>, limit: u64) -> Result<Vec<Model>, EngineError> {
        let mut query = Entity::find();
        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status));
        }
        let jobs = query
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(jobs)
    }
}
