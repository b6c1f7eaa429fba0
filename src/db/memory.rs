//! In-process [`JobStore`] used by tests and local runs without PostgreSQL.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{JobStore, StoreError};
use crate::models::alert::{Alert, NewAlert};
use crate::models::job::{Batch, BatchStatus, Item, ItemStatus, Job, JobStatus, NewJob};
use crate::models::reference::{ListPrice, WatchlistEntry};

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<Uuid, Job>,
    batches: HashMap<Uuid, Batch>,
    items: HashMap<Uuid, Item>,
    alerts: Vec<Alert>,
    list_prices: HashMap<String, ListPrice>,
    watchlist: Vec<WatchlistEntry>,
}

#[derive(Default)]
pub struct MemoryJobStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored jobs.
    pub fn job_count(&self) -> usize {
        self.read().jobs.len()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn create_job(&self, new_job: NewJob) -> Result<Job, StoreError> {
        self.check()?;
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            name: new_job.name,
            status: JobStatus::Pending,
            total_batches: new_job.batches.len() as i32,
            completed_batches: 0,
            created_by: new_job.created_by,
            created_at: now,
            completed_at: None,
            error: None,
            heartbeat_at: None,
        };

        let mut state = self.write();
        for (index, identifiers) in new_job.batches.into_iter().enumerate() {
            let batch = Batch {
                id: Uuid::new_v4(),
                job_id: job.id,
                sequence: index as i32 + 1,
                status: BatchStatus::Pending,
                item_count: identifiers.len() as i32,
                processed_count: 0,
                created_at: now,
                completed_at: None,
                error: None,
            };
            for (position, identifier) in identifiers.into_iter().enumerate() {
                let item = Item {
                    id: Uuid::new_v4(),
                    batch_id: batch.id,
                    position: position as i32,
                    identifier,
                    status: ItemStatus::Pending,
                    payload: None,
                    error: None,
                    processed_at: None,
                };
                state.items.insert(item.id, item);
            }
            state.batches.insert(batch.id, batch);
        }
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        self.check()?;
        Ok(self.read().jobs.get(&job_id).cloned())
    }

    async fn list_jobs(
        &self,
        created_by: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, StoreError> {
        self.check()?;
        let mut jobs: Vec<Job> = self
            .read()
            .jobs
            .values()
            .filter(|j| created_by.is_none() || j.created_by.as_deref() == created_by)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_runnable_jobs(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        self.check()?;
        let mut jobs: Vec<Job> = self
            .read()
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending || j.is_stalled(stale_before))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn claim_job(&self, job_id: Uuid, stale_before: DateTime<Utc>) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.write();
        match state.jobs.get_mut(&job_id) {
            Some(job)
                if matches!(job.status, JobStatus::Pending | JobStatus::Failed)
                    || job.is_stalled(stale_before) =>
            {
                job.status = JobStatus::Processing;
                job.error = None;
                job.completed_at = None;
                job.heartbeat_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn heartbeat_job(&self, job_id: Uuid) -> Result<(), StoreError> {
        self.check()?;
        if let Some(job) = self.write().jobs.get_mut(&job_id) {
            if job.status == JobStatus::Processing {
                job.heartbeat_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn update_completed_batches(&self, job_id: Uuid, completed: i32) -> Result<(), StoreError> {
        self.check()?;
        if let Some(job) = self.write().jobs.get_mut(&job_id) {
            job.completed_batches = completed;
        }
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.check()?;
        if let Some(job) = self.write().jobs.get_mut(&job_id) {
            job.status = status;
            job.error = error.map(str::to_string);
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn complete_job_if_processing(
        &self,
        job_id: Uuid,
        completed_batches: i32,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.write();
        match state.jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Processing => {
                job.status = JobStatus::Completed;
                job.completed_batches = completed_batches;
                job.completed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_batches(&self, job_id: Uuid) -> Result<Vec<Batch>, StoreError> {
        self.check()?;
        let mut batches: Vec<Batch> = self
            .read()
            .batches
            .values()
            .filter(|b| b.job_id == job_id)
            .cloned()
            .collect();
        batches.sort_by_key(|b| b.sequence);
        Ok(batches)
    }

    async fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>, StoreError> {
        self.check()?;
        Ok(self.read().batches.get(&batch_id).cloned())
    }

    async fn start_batch(&self, batch_id: Uuid) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.write();
        match state.batches.get_mut(&batch_id) {
            Some(batch)
                if matches!(
                    batch.status,
                    BatchStatus::Pending | BatchStatus::Processing | BatchStatus::Failed
                ) =>
            {
                batch.status = BatchStatus::Processing;
                batch.error = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_processed_count(&self, batch_id: Uuid, processed: i32) -> Result<(), StoreError> {
        self.check()?;
        if let Some(batch) = self.write().batches.get_mut(&batch_id) {
            batch.processed_count = processed;
        }
        Ok(())
    }

    async fn complete_batch(&self, batch_id: Uuid, processed: i32) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.write();
        match state.batches.get_mut(&batch_id) {
            Some(batch) if batch.status == BatchStatus::Processing => {
                batch.status = BatchStatus::Completed;
                batch.processed_count = processed;
                batch.completed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_batch(&self, batch_id: Uuid, error: &str) -> Result<(), StoreError> {
        self.check()?;
        if let Some(batch) = self.write().batches.get_mut(&batch_id) {
            if batch.status != BatchStatus::Cancelled {
                batch.status = BatchStatus::Failed;
                batch.error = Some(error.to_string());
            }
        }
        Ok(())
    }

    async fn cancel_batch(&self, batch_id: Uuid) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.write();
        match state.batches.get_mut(&batch_id) {
            Some(batch) if batch.status.is_cancellable() => {
                batch.status = BatchStatus::Cancelled;
                batch.error = Some("Cancelled by user".to_string());
                batch.completed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_items(&self, batch_id: Uuid) -> Result<Vec<Item>, StoreError> {
        self.check()?;
        let mut items: Vec<Item> = self
            .read()
            .items
            .values()
            .filter(|i| i.batch_id == batch_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.position);
        Ok(items)
    }

    async fn mark_item_processing(&self, item_id: Uuid) -> Result<(), StoreError> {
        self.check()?;
        if let Some(item) = self.write().items.get_mut(&item_id) {
            item.status = ItemStatus::Processing;
        }
        Ok(())
    }

    async fn complete_item(
        &self,
        item_id: Uuid,
        payload: Option<&serde_json::Value>,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        self.check()?;
        if let Some(item) = self.write().items.get_mut(&item_id) {
            item.status = ItemStatus::Completed;
            item.payload = payload.cloned();
            item.error = note.map(str::to_string);
            item.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail_item(&self, item_id: Uuid, error: &str) -> Result<(), StoreError> {
        self.check()?;
        if let Some(item) = self.write().items.get_mut(&item_id) {
            item.status = ItemStatus::Failed;
            item.error = Some(error.to_string());
            item.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn completed_items(&self, job_id: Uuid) -> Result<Vec<Item>, StoreError> {
        self.check()?;
        let state = self.read();
        let mut items: Vec<(i32, Item)> = state
            .items
            .values()
            .filter(|i| i.status == ItemStatus::Completed)
            .filter_map(|i| {
                state
                    .batches
                    .get(&i.batch_id)
                    .filter(|b| b.job_id == job_id)
                    .map(|b| (b.sequence, i.clone()))
            })
            .collect();
        items.sort_by_key(|(sequence, item)| (*sequence, item.position));
        Ok(items.into_iter().map(|(_, item)| item).collect())
    }

    async fn insert_alerts(&self, alerts: &[NewAlert]) -> Result<(), StoreError> {
        self.check()?;
        let now = Utc::now();
        let mut state = self.write();
        for alert in alerts {
            state.alerts.push(Alert {
                id: Uuid::new_v4(),
                job_id: alert.job_id,
                identifier: alert.identifier.clone(),
                seller_name: alert.seller_name.clone(),
                current_price: alert.current_price,
                historical_price: alert.historical_price,
                price_change_percent: alert.price_change_percent,
                payload: alert.payload.clone(),
                detected_at: now,
            });
        }
        Ok(())
    }

    async fn list_alerts(&self, job_id: Uuid) -> Result<Vec<Alert>, StoreError> {
        self.check()?;
        Ok(self
            .read()
            .alerts
            .iter()
            .rev()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn list_prices(&self, identifiers: &[String]) -> Result<HashMap<String, f64>, StoreError> {
        self.check()?;
        let state = self.read();
        Ok(identifiers
            .iter()
            .filter_map(|id| state.list_prices.get(id).map(|entry| (id.clone(), entry.list_price)))
            .collect())
    }

    async fn upsert_list_prices(&self, entries: &[(String, f64)]) -> Result<u64, StoreError> {
        self.check()?;
        let now = Utc::now();
        let mut state = self.write();
        let mut touched = HashSet::new();
        for (identifier, price) in entries {
            state.list_prices.insert(
                identifier.clone(),
                ListPrice {
                    identifier: identifier.clone(),
                    list_price: *price,
                    updated_at: now,
                },
            );
            touched.insert(identifier.as_str());
        }
        Ok(touched.len() as u64)
    }

    async fn list_price_entries(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ListPrice>, StoreError> {
        self.check()?;
        let mut entries: Vec<ListPrice> = self
            .read()
            .list_prices
            .values()
            .filter(|p| p.matches(search))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(entries
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_list_prices(&self, search: Option<&str>) -> Result<i64, StoreError> {
        self.check()?;
        Ok(self
            .read()
            .list_prices
            .values()
            .filter(|p| p.matches(search))
            .count() as i64)
    }

    async fn get_list_price(&self, identifier: &str) -> Result<Option<ListPrice>, StoreError> {
        self.check()?;
        Ok(self.read().list_prices.get(identifier).cloned())
    }

    async fn delete_list_price(&self, identifier: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.write().list_prices.remove(identifier).is_some())
    }

    async fn clear_list_prices(&self) -> Result<u64, StoreError> {
        self.check()?;
        let mut state = self.write();
        let removed = state.list_prices.len() as u64;
        state.list_prices.clear();
        Ok(removed)
    }

    async fn watchlist(&self) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(self
            .read()
            .watchlist
            .iter()
            .map(|entry| entry.identifier.clone())
            .collect())
    }

    async fn add_to_watchlist(&self, identifiers: &[String]) -> Result<u64, StoreError> {
        self.check()?;
        let now = Utc::now();
        let mut state = self.write();
        let mut added = 0;
        for identifier in identifiers {
            if !state.watchlist.iter().any(|e| &e.identifier == identifier) {
                state.watchlist.push(WatchlistEntry {
                    identifier: identifier.clone(),
                    created_at: now,
                });
                added += 1;
            }
        }
        Ok(added)
    }

    async fn list_watchlist(&self, limit: i64, offset: i64) -> Result<Vec<WatchlistEntry>, StoreError> {
        self.check()?;
        Ok(self
            .read()
            .watchlist
            .iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_watchlist(&self) -> Result<i64, StoreError> {
        self.check()?;
        Ok(self.read().watchlist.len() as i64)
    }

    async fn remove_from_watchlist(&self, identifier: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.write();
        let before = state.watchlist.len();
        state.watchlist.retain(|e| e.identifier != identifier);
        Ok(state.watchlist.len() < before)
    }

    async fn clear_watchlist(&self) -> Result<u64, StoreError> {
        self.check()?;
        let mut state = self.write();
        let removed = state.watchlist.len() as u64;
        state.watchlist.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(batches: Vec<Vec<&str>>) -> NewJob {
        NewJob {
            name: "test".to_string(),
            created_by: Some("user-1".to_string()),
            batches: batches
                .into_iter()
                .map(|b| b.into_iter().map(str::to_string).collect())
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_cancel_only_from_active_states() {
        let store = MemoryJobStore::new();
        let job = store.create_job(new_job(vec![vec!["a"]])).await.unwrap();
        let batch = store.list_batches(job.id).await.unwrap().remove(0);

        assert!(store.cancel_batch(batch.id).await.unwrap());
        assert!(!store.cancel_batch(batch.id).await.unwrap());
        assert!(!store.start_batch(batch.id).await.unwrap());
        assert!(!store.complete_batch(batch.id, 1).await.unwrap());

        let batch = store.get_batch(batch.id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Cancelled);
        assert_eq!(batch.error.as_deref(), Some("Cancelled by user"));
    }

    fn hour_ago() -> DateTime<Utc> {
        Utc::now() - chrono::Duration::hours(1)
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = MemoryJobStore::new();
        let job = store.create_job(new_job(vec![vec!["a"]])).await.unwrap();

        assert!(store.claim_job(job.id, hour_ago()).await.unwrap());
        assert!(!store.claim_job(job.id, hour_ago()).await.unwrap());

        store
            .finish_job(job.id, JobStatus::Failed, Some("boom"))
            .await
            .unwrap();
        assert!(store.claim_job(job.id, hour_ago()).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_processing_job_can_be_reclaimed() {
        let store = MemoryJobStore::new();
        let job = store.create_job(new_job(vec![vec!["a"]])).await.unwrap();
        assert!(store.claim_job(job.id, hour_ago()).await.unwrap());

        let claimed = store.get_job(job.id).await.unwrap().unwrap();
        let heartbeat = claimed.heartbeat_at.unwrap();
        assert!(store.list_runnable_jobs(hour_ago(), 10).await.unwrap().is_empty());

        let later = heartbeat + chrono::Duration::seconds(1);
        let runnable = store.list_runnable_jobs(later, 10).await.unwrap();
        assert_eq!(runnable.len(), 1);
        assert!(store.claim_job(job.id, later).await.unwrap());

        let reclaimed = store.get_job(job.id).await.unwrap().unwrap();
        assert!(reclaimed.heartbeat_at.unwrap() >= heartbeat);
        assert_eq!(reclaimed.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_reference_data_management() {
        let store = MemoryJobStore::new();
        store
            .upsert_list_prices(&[("B1".to_string(), 5.0), ("a2".to_string(), 7.5)])
            .await
            .unwrap();

        assert_eq!(store.count_list_prices(None).await.unwrap(), 2);
        assert_eq!(store.count_list_prices(Some("b")).await.unwrap(), 1);
        let page = store.list_price_entries(None, 1, 1).await.unwrap();
        assert_eq!(page[0].identifier, "a2");

        assert!(store.delete_list_price("B1").await.unwrap());
        assert!(!store.delete_list_price("B1").await.unwrap());
        assert!(store.get_list_price("B1").await.unwrap().is_none());
        assert_eq!(store.clear_list_prices().await.unwrap(), 1);

        store
            .add_to_watchlist(&["x".to_string(), "y".to_string()])
            .await
            .unwrap();
        assert!(store.remove_from_watchlist("x").await.unwrap());
        assert_eq!(store.count_watchlist().await.unwrap(), 1);
        assert_eq!(store.clear_watchlist().await.unwrap(), 1);
        assert!(store.list_watchlist(10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_watchlist_skips_duplicates() {
        let store = MemoryJobStore::new();
        let added = store
            .add_to_watchlist(&["1".to_string(), "2".to_string(), "1".to_string()])
            .await
            .unwrap();
        assert_eq!(added, 2);

        let added = store.add_to_watchlist(&["2".to_string()]).await.unwrap();
        assert_eq!(added, 0);
        assert_eq!(store.watchlist().await.unwrap(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_calls() {
        let store = MemoryJobStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.create_job(new_job(vec![vec!["a"]])).await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert_eq!(store.job_count(), 0);
    }
}
