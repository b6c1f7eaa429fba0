use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{queries, JobStore, StoreError};
use crate::models::alert::{Alert, NewAlert};
use crate::models::job::{Batch, Item, Job, JobStatus, NewJob};
use crate::models::reference::{ListPrice, WatchlistEntry};

/// PostgreSQL-backed [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError> {
        queries::create_job(&self.pool, &job).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        queries::get_job(&self.pool, job_id).await
    }

    async fn list_jobs(
        &self,
        created_by: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, StoreError> {
        queries::list_jobs(&self.pool, created_by, limit, offset).await
    }

    async fn list_runnable_jobs(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        queries::list_runnable_jobs(&self.pool, stale_before, limit).await
    }

    async fn claim_job(&self, job_id: Uuid, stale_before: DateTime<Utc>) -> Result<bool, StoreError> {
        queries::claim_job(&self.pool, job_id, stale_before).await
    }

    async fn heartbeat_job(&self, job_id: Uuid) -> Result<(), StoreError> {
        queries::heartbeat_job(&self.pool, job_id).await
    }

    async fn update_completed_batches(&self, job_id: Uuid, completed: i32) -> Result<(), StoreError> {
        queries::update_completed_batches(&self.pool, job_id, completed).await
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        queries::finish_job(&self.pool, job_id, status, error).await
    }

    async fn complete_job_if_processing(
        &self,
        job_id: Uuid,
        completed_batches: i32,
    ) -> Result<bool, StoreError> {
        queries::complete_job_if_processing(&self.pool, job_id, completed_batches).await
    }

    async fn list_batches(&self, job_id: Uuid) -> Result<Vec<Batch>, StoreError> {
        queries::list_batches(&self.pool, job_id).await
    }

    async fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>, StoreError> {
        queries::get_batch(&self.pool, batch_id).await
    }

    async fn start_batch(&self, batch_id: Uuid) -> Result<bool, StoreError> {
        queries::start_batch(&self.pool, batch_id).await
    }

    async fn update_processed_count(&self, batch_id: Uuid, processed: i32) -> Result<(), StoreError> {
        queries::update_processed_count(&self.pool, batch_id, processed).await
    }

    async fn complete_batch(&self, batch_id: Uuid, processed: i32) -> Result<bool, StoreError> {
        queries::complete_batch(&self.pool, batch_id, processed).await
    }

    async fn fail_batch(&self, batch_id: Uuid, error: &str) -> Result<(), StoreError> {
        queries::fail_batch(&self.pool, batch_id, error).await
    }

    async fn cancel_batch(&self, batch_id: Uuid) -> Result<bool, StoreError> {
        queries::cancel_batch(&self.pool, batch_id).await
    }

    async fn list_items(&self, batch_id: Uuid) -> Result<Vec<Item>, StoreError> {
        queries::list_items(&self.pool, batch_id).await
    }

    async fn mark_item_processing(&self, item_id: Uuid) -> Result<(), StoreError> {
        queries::mark_item_processing(&self.pool, item_id).await
    }

    async fn complete_item(
        &self,
        item_id: Uuid,
        payload: Option<&serde_json::Value>,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        queries::complete_item(&self.pool, item_id, payload, note).await
    }

    async fn fail_item(&self, item_id: Uuid, error: &str) -> Result<(), StoreError> {
        queries::fail_item(&self.pool, item_id, error).await
    }

    async fn completed_items(&self, job_id: Uuid) -> Result<Vec<Item>, StoreError> {
        queries::completed_items(&self.pool, job_id).await
    }

    async fn insert_alerts(&self, alerts: &[NewAlert]) -> Result<(), StoreError> {
        queries::insert_alerts(&self.pool, alerts).await
    }

    async fn list_alerts(&self, job_id: Uuid) -> Result<Vec<Alert>, StoreError> {
        queries::list_alerts(&self.pool, job_id).await
    }

    async fn list_prices(&self, identifiers: &[String]) -> Result<HashMap<String, f64>, StoreError> {
        queries::list_prices(&self.pool, identifiers).await
    }

    async fn upsert_list_prices(&self, entries: &[(String, f64)]) -> Result<u64, StoreError> {
        // A single upsert statement may not touch the same key twice; last entry wins.
        let mut latest: HashMap<&str, f64> = HashMap::new();
        for (identifier, price) in entries {
            latest.insert(identifier.as_str(), *price);
        }
        let deduped: Vec<(String, f64)> = latest
            .into_iter()
            .map(|(identifier, price)| (identifier.to_string(), price))
            .collect();

        queries::upsert_list_prices(&self.pool, &deduped).await
    }

    async fn list_price_entries(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ListPrice>, StoreError> {
        queries::list_price_entries(&self.pool, search, limit, offset).await
    }

    async fn count_list_prices(&self, search: Option<&str>) -> Result<i64, StoreError> {
        queries::count_list_prices(&self.pool, search).await
    }

    async fn get_list_price(&self, identifier: &str) -> Result<Option<ListPrice>, StoreError> {
        queries::get_list_price(&self.pool, identifier).await
    }

    async fn delete_list_price(&self, identifier: &str) -> Result<bool, StoreError> {
        queries::delete_list_price(&self.pool, identifier).await
    }

    async fn clear_list_prices(&self) -> Result<u64, StoreError> {
        queries::clear_list_prices(&self.pool).await
    }

    async fn watchlist(&self) -> Result<Vec<String>, StoreError> {
        queries::watchlist(&self.pool).await
    }

    async fn add_to_watchlist(&self, identifiers: &[String]) -> Result<u64, StoreError> {
        queries::add_to_watchlist(&self.pool, identifiers).await
    }

    async fn list_watchlist(&self, limit: i64, offset: i64) -> Result<Vec<WatchlistEntry>, StoreError> {
        queries::list_watchlist(&self.pool, limit, offset).await
    }

    async fn count_watchlist(&self) -> Result<i64, StoreError> {
        queries::count_watchlist(&self.pool).await
    }

    async fn remove_from_watchlist(&self, identifier: &str) -> Result<bool, StoreError> {
        queries::remove_from_watchlist(&self.pool, identifier).await
    }

    async fn clear_watchlist(&self) -> Result<u64, StoreError> {
        queries::clear_watchlist(&self.pool).await
    }
}
