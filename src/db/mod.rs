use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::models::alert::{Alert, NewAlert};
use crate::models::job::{Batch, Item, Job, JobStatus, NewJob};
use crate::models::reference::{ListPrice, WatchlistEntry};

pub mod memory;
pub mod queries;
pub mod store;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid stored value: {0}")]
    Decode(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Row-level persistence for jobs, batches, items and alerts.
///
/// Every write touches a single row (or one job tree on creation); state
/// transitions that race with cancellation are conditional and report
/// whether they applied.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Cheap connectivity check used by the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Persist a job with all of its batches and items, atomically.
    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Newest first, optionally restricted to one creator.
    async fn list_jobs(
        &self,
        created_by: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, StoreError>;

    /// Pending jobs and processing jobs whose heartbeat predates `stale_before`,
    /// oldest first.
    async fn list_runnable_jobs(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError>;

    /// Move a job to processing and stamp its heartbeat. Pending and failed
    /// jobs are always claimable, processing ones only once their heartbeat
    /// predates `stale_before`. False when another run owns it.
    async fn claim_job(&self, job_id: Uuid, stale_before: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Refreshes the heartbeat of a processing job.
    async fn heartbeat_job(&self, job_id: Uuid) -> Result<(), StoreError>;

    async fn update_completed_batches(&self, job_id: Uuid, completed: i32) -> Result<(), StoreError>;

    /// Terminal write for a job run; stamps `completed_at`.
    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Completes the job only while it is still processing.
    async fn complete_job_if_processing(
        &self,
        job_id: Uuid,
        completed_batches: i32,
    ) -> Result<bool, StoreError>;

    /// Batches of a job in ascending sequence.
    async fn list_batches(&self, job_id: Uuid) -> Result<Vec<Batch>, StoreError>;

    async fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>, StoreError>;

    /// Pending, processing or failed -> processing. False for cancelled or completed batches.
    async fn start_batch(&self, batch_id: Uuid) -> Result<bool, StoreError>;

    async fn update_processed_count(&self, batch_id: Uuid, processed: i32) -> Result<(), StoreError>;

    /// Processing -> completed. False when the batch was cancelled meanwhile.
    async fn complete_batch(&self, batch_id: Uuid, processed: i32) -> Result<bool, StoreError>;

    /// Marks the batch failed unless it has been cancelled.
    async fn fail_batch(&self, batch_id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Pending or processing -> cancelled.
    async fn cancel_batch(&self, batch_id: Uuid) -> Result<bool, StoreError>;

    /// Items of a batch in persisted order.
    async fn list_items(&self, batch_id: Uuid) -> Result<Vec<Item>, StoreError>;

    async fn mark_item_processing(&self, item_id: Uuid) -> Result<(), StoreError>;

    async fn complete_item(
        &self,
        item_id: Uuid,
        payload: Option<&serde_json::Value>,
        note: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn fail_item(&self, item_id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Completed items of a job, ordered by batch sequence then position.
    async fn completed_items(&self, job_id: Uuid) -> Result<Vec<Item>, StoreError>;

    async fn insert_alerts(&self, alerts: &[NewAlert]) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_alerts(&self, job_id: Uuid) -> Result<Vec<Alert>, StoreError>;

    async fn list_prices(&self, identifiers: &[String]) -> Result<HashMap<String, f64>, StoreError>;

    /// Insert or replace list prices by identifier.
    async fn upsert_list_prices(&self, entries: &[(String, f64)]) -> Result<u64, StoreError>;

    /// Ordered by identifier; `search` is a case-insensitive substring.
    async fn list_price_entries(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ListPrice>, StoreError>;

    async fn count_list_prices(&self, search: Option<&str>) -> Result<i64, StoreError>;

    async fn get_list_price(&self, identifier: &str) -> Result<Option<ListPrice>, StoreError>;

    async fn delete_list_price(&self, identifier: &str) -> Result<bool, StoreError>;

    /// Returns how many entries were removed.
    async fn clear_list_prices(&self) -> Result<u64, StoreError>;

    /// Every watched identifier, in the order it was added.
    async fn watchlist(&self) -> Result<Vec<String>, StoreError>;

    /// Adds identifiers, skipping ones already present. Returns how many were new.
    async fn add_to_watchlist(&self, identifiers: &[String]) -> Result<u64, StoreError>;

    async fn list_watchlist(&self, limit: i64, offset: i64) -> Result<Vec<WatchlistEntry>, StoreError>;

    async fn count_watchlist(&self) -> Result<i64, StoreError>;

    async fn remove_from_watchlist(&self, identifier: &str) -> Result<bool, StoreError>;

    /// Returns how many identifiers were removed.
    async fn clear_watchlist(&self) -> Result<u64, StoreError>;
}
