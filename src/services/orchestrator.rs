//! Batch Orchestrator
//!
//! Splits a job's identifiers into fixed-size batches and drives them
//! strictly in sequence: one item at a time, throttled by the product client
//! and by a fixed pause between batches. Cancellation is a persisted batch
//! status polled before every item.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::ProcessingConfig;
use crate::db::{JobStore, StoreError};
use crate::models::alert::NewAlert;
use crate::models::job::{Batch, BatchStatus, Item, ItemStatus, Job, JobStatus, NewJob};
use crate::services::job_status::reconcile_job;
use crate::services::notifier::{Notifier, NotifyError, ReportDelivery};
use crate::services::price_analyzer::PriceAnalyzer;
use crate::services::product_client::ProductSource;
use crate::services::report::{report_filename, Report, ReportCompiler, ReportError};

/// Note stored on items the product API knows nothing about.
pub const NO_DATA_NOTE: &str = "No data found for identifier";

const EMPTY_BATCH_ERROR: &str = "No batch items found to process";

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Batch not found: {0}")]
    BatchNotFound(Uuid),

    #[error("Job {0} is already being processed")]
    AlreadyRunning(Uuid),

    #[error("Job {job_id} cannot be processed while {status}")]
    InvalidJobState { job_id: Uuid, status: JobStatus },

    #[error("Batch {batch_id} cannot be cancelled while {status}")]
    InvalidBatchState { batch_id: Uuid, status: BatchStatus },

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    source: Arc<dyn ProductSource>,
    notifier: Arc<dyn Notifier>,
    analyzer: PriceAnalyzer,
    config: ProcessingConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        source: Arc<dyn ProductSource>,
        notifier: Arc<dyn Notifier>,
        config: ProcessingConfig,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            analyzer: PriceAnalyzer::new(config.history_days),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Heartbeats older than this belong to runs that are gone.
    pub fn stale_before(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.config.job_lease)
            .ok()
            .and_then(|lease| Utc::now().checked_sub_signed(lease))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Validates the input and persists the job tree, all pending.
    pub async fn create_job(
        &self,
        name: &str,
        identifiers: &[String],
        created_by: Option<&str>,
    ) -> Result<Job, JobError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(JobError::Validation("Job name must not be empty".to_string()));
        }
        if identifiers.is_empty() {
            return Err(JobError::Validation(
                "At least one identifier is required".to_string(),
            ));
        }

        let identifiers: Vec<String> = identifiers.iter().map(|i| i.trim().to_string()).collect();
        if let Some(position) = identifiers.iter().position(|i| i.is_empty()) {
            return Err(JobError::Validation(format!(
                "Identifier at position {} is blank",
                position
            )));
        }

        let batches: Vec<Vec<String>> = identifiers
            .chunks(self.config.batch_size.max(1))
            .map(<[String]>::to_vec)
            .collect();

        let job = self
            .store
            .create_job(NewJob {
                name: name.to_string(),
                created_by: created_by.map(str::to_string),
                batches,
            })
            .await?;

        tracing::info!(
            job_id = %job.id,
            name = %job.name,
            identifiers = identifiers.len(),
            batches = job.total_batches,
            "Job created"
        );

        Ok(job)
    }

    /// Runs `process_job` on a detached task. Failures are only logged.
    pub fn spawn_job(&self, job_id: Uuid) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            match orchestrator.process_job(job_id).await {
                Ok(status) => tracing::info!(job_id = %job_id, status = %status, "Job run finished"),
                Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Job run not started"),
            }
        })
    }

    /// Claims the job and processes every batch in order.
    ///
    /// A processing job is only taken over once its heartbeat is older than
    /// the configured lease. Errors are returned only when the run could not
    /// start. Anything that goes wrong afterwards is recorded on the job, and
    /// the final job status is returned.
    pub async fn process_job(&self, job_id: Uuid) -> Result<JobStatus, JobError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(JobError::JobNotFound(job_id))?;

        let stale_before = self.stale_before();
        match job.status {
            JobStatus::Processing if !job.is_stalled(stale_before) => {
                return Err(JobError::AlreadyRunning(job_id))
            }
            JobStatus::Completed => {
                return Err(JobError::InvalidJobState {
                    job_id,
                    status: job.status,
                })
            }
            _ => {}
        }

        if !self.store.claim_job(job_id, stale_before).await? {
            return Err(JobError::AlreadyRunning(job_id));
        }

        if job.status == JobStatus::Processing {
            tracing::warn!(
                job_id = %job_id,
                heartbeat_at = ?job.heartbeat_at,
                "Taking over stalled job"
            );
        }
        tracing::info!(job_id = %job_id, name = %job.name, "Processing job");

        match self.run_job(&job).await {
            Ok(()) => {
                metrics::counter!("price_watch_jobs_total", "outcome" => "completed").increment(1);
                Ok(JobStatus::Completed)
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job failed");
                metrics::counter!("price_watch_jobs_total", "outcome" => "failed").increment(1);
                if let Err(write_err) = self
                    .store
                    .finish_job(job_id, JobStatus::Failed, Some(&e.to_string()))
                    .await
                {
                    tracing::error!(job_id = %job_id, error = %write_err, "Failed to record job failure");
                }
                Ok(JobStatus::Failed)
            }
        }
    }

    async fn run_job(&self, job: &Job) -> Result<(), JobError> {
        let batches = self.store.list_batches(job.id).await?;
        let mut completed = 0;

        for (index, batch) in batches.iter().enumerate() {
            if index > 0 && !self.config.inter_batch_delay.is_zero() {
                sleep(self.config.inter_batch_delay).await;
            }

            if self.process_batch(batch.id).await {
                completed += 1;
                self.store.update_completed_batches(job.id, completed).await?;
            }
        }

        if let Err(e) = self.deliver_report(job).await {
            tracing::warn!(job_id = %job.id, error = %e, "Report delivery failed");
        }

        // Reconciliation may already have closed the job after a cancel.
        if !self.store.complete_job_if_processing(job.id, completed).await? {
            tracing::debug!(job_id = %job.id, "Job was already finalized");
        }

        tracing::info!(
            job_id = %job.id,
            completed_batches = completed,
            total_batches = batches.len(),
            "Job completed"
        );
        Ok(())
    }

    /// Processes one batch. Returns true only when the batch ends up completed.
    pub async fn process_batch(&self, batch_id: Uuid) -> bool {
        match self.run_batch(batch_id).await {
            Ok(completed) => completed,
            Err(e) => {
                tracing::error!(batch_id = %batch_id, error = %e, "Batch failed");
                metrics::counter!("price_watch_batches_total", "outcome" => "failed").increment(1);
                if let Err(write_err) = self.store.fail_batch(batch_id, &e.to_string()).await {
                    tracing::error!(batch_id = %batch_id, error = %write_err, "Failed to record batch failure");
                }
                false
            }
        }
    }

    async fn run_batch(&self, batch_id: Uuid) -> Result<bool, JobError> {
        let Some(batch) = self.store.get_batch(batch_id).await? else {
            tracing::warn!(batch_id = %batch_id, "Batch not found");
            return Ok(false);
        };

        match batch.status {
            BatchStatus::Cancelled => {
                tracing::info!(batch_id = %batch_id, "Skipping cancelled batch");
                return Ok(false);
            }
            BatchStatus::Completed => return Ok(true),
            _ => {}
        }

        if !self.store.start_batch(batch_id).await? {
            return Ok(false);
        }

        let started = Instant::now();
        let items = self.store.list_items(batch_id).await?;
        if items.is_empty() {
            tracing::warn!(batch_id = %batch_id, "Batch has no items");
            self.store.fail_batch(batch_id, EMPTY_BATCH_ERROR).await?;
            metrics::counter!("price_watch_batches_total", "outcome" => "failed").increment(1);
            return Ok(false);
        }

        tracing::info!(
            job_id = %batch.job_id,
            batch_id = %batch_id,
            sequence = batch.sequence,
            items = items.len(),
            "Processing batch"
        );

        let mut processed = 0;
        for item in &items {
            if self.is_cancelled(batch_id).await? {
                self.store.update_processed_count(batch_id, processed).await?;
                tracing::info!(batch_id = %batch_id, processed, "Batch cancelled, stopping");
                metrics::counter!("price_watch_batches_total", "outcome" => "cancelled").increment(1);
                return Ok(false);
            }

            if item.status != ItemStatus::Completed {
                self.process_item(batch.job_id, item).await;
                if let Err(e) = self.store.heartbeat_job(batch.job_id).await {
                    tracing::warn!(job_id = %batch.job_id, error = %e, "Failed to refresh heartbeat");
                }
            }
            processed += 1;

            if let Err(e) = self.store.update_processed_count(batch_id, processed).await {
                tracing::warn!(batch_id = %batch_id, error = %e, "Failed to persist progress");
            }
        }

        metrics::histogram!("price_watch_batch_seconds").record(started.elapsed().as_secs_f64());

        if self.store.complete_batch(batch_id, processed).await? {
            tracing::info!(batch_id = %batch_id, processed, "Batch completed");
            metrics::counter!("price_watch_batches_total", "outcome" => "completed").increment(1);
            Ok(true)
        } else {
            tracing::info!(batch_id = %batch_id, "Batch cancelled before completion");
            metrics::counter!("price_watch_batches_total", "outcome" => "cancelled").increment(1);
            Ok(false)
        }
    }

    async fn is_cancelled(&self, batch_id: Uuid) -> Result<bool, JobError> {
        let batch = self.store.get_batch(batch_id).await?;
        Ok(matches!(batch, Some(b) if b.status == BatchStatus::Cancelled))
    }

    /// Fetches, analyzes and records one item. Store errors are logged and skipped.
    async fn process_item(&self, job_id: Uuid, item: &Item) {
        let identifier = item.identifier.as_str();

        if let Err(e) = self.store.mark_item_processing(item.id).await {
            tracing::warn!(item_id = %item.id, error = %e, "Failed to mark item processing");
        }

        let (outcome, result) = match self.source.fetch(identifier).await {
            Ok(Some(payload)) => {
                let analysis = self.analyzer.analyze(identifier, &payload);
                let alerts: Vec<NewAlert> = analysis
                    .off_price_sellers
                    .iter()
                    .map(|seller| NewAlert {
                        job_id,
                        identifier: identifier.to_string(),
                        seller_name: seller.seller_name.clone(),
                        current_price: seller.current_price,
                        historical_price: seller.historical_price,
                        price_change_percent: seller.price_change_percent,
                        payload: Some(payload.clone()),
                    })
                    .collect();

                if !alerts.is_empty() {
                    tracing::info!(identifier, alerts = alerts.len(), "Off-price sellers detected");
                    metrics::counter!("price_watch_alerts_total").increment(alerts.len() as u64);
                    if let Err(e) = self.store.insert_alerts(&alerts).await {
                        tracing::error!(identifier, error = %e, "Failed to store alerts");
                    }
                }

                let result = self
                    .store
                    .complete_item(item.id, Some(&payload), analysis.error.as_deref())
                    .await;
                ("completed", result)
            }
            Ok(None) => {
                let result = self.store.complete_item(item.id, None, Some(NO_DATA_NOTE)).await;
                ("no_data", result)
            }
            Err(e) => {
                tracing::warn!(identifier, error = %e, "Product lookup failed");
                let result = self.store.fail_item(item.id, &e.to_string()).await;
                ("failed", result)
            }
        };

        if let Err(e) = result {
            tracing::error!(item_id = %item.id, identifier, error = %e, "Failed to record item outcome");
        }
        metrics::counter!("price_watch_items_total", "outcome" => outcome).increment(1);
    }

    /// Cancels a pending or processing batch and reconciles its job.
    pub async fn cancel_batch(&self, batch_id: Uuid) -> Result<Batch, JobError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or(JobError::BatchNotFound(batch_id))?;

        if !self.store.cancel_batch(batch_id).await? {
            let status = self
                .store
                .get_batch(batch_id)
                .await?
                .map(|b| b.status)
                .unwrap_or(batch.status);
            return Err(JobError::InvalidBatchState { batch_id, status });
        }

        tracing::info!(job_id = %batch.job_id, batch_id = %batch_id, "Batch cancelled by user");
        reconcile_job(self.store.as_ref(), batch.job_id).await?;

        self.store
            .get_batch(batch_id)
            .await?
            .ok_or(JobError::BatchNotFound(batch_id))
    }

    /// Compiles the report of a job from what is stored right now.
    pub async fn build_report(&self, job_id: Uuid) -> Result<(Job, Report), JobError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(JobError::JobNotFound(job_id))?;

        let items = self.store.completed_items(job_id).await?;
        let identifiers: Vec<String> = items.iter().map(|i| i.identifier.clone()).collect();
        let list_prices = self.store.list_prices(&identifiers).await?;
        let alerts = self.store.list_alerts(job_id).await?;

        Ok((job, ReportCompiler::compile(&items, &list_prices, alerts)))
    }

    /// Compiles the report and hands it to the notifier.
    pub async fn notify_report(&self, job_id: Uuid) -> Result<(), JobError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(JobError::JobNotFound(job_id))?;
        self.deliver_report(&job).await
    }

    async fn deliver_report(&self, job: &Job) -> Result<(), JobError> {
        let (_, report) = self.build_report(job.id).await?;
        let document = report.to_xlsx()?;

        let delivery = ReportDelivery {
            document,
            filename: report_filename(&job.name, Utc::now()),
            job_name: job.name.clone(),
            total_processed: report.total_processed(),
            alert_count: report.alerts.len(),
        };

        tracing::info!(
            job_id = %job.id,
            filename = %delivery.filename,
            rows = delivery.total_processed,
            off_price = report.off_price_count(),
            alerts = delivery.alert_count,
            "Delivering report"
        );
        self.notifier.send_report(delivery).await?;
        Ok(())
    }
}
