//! Picks up jobs that were created but never started, e.g. because the
//! server restarted before its background task ran, and jobs whose run
//! stopped sending heartbeats for longer than the configured lease.

use price_watch::{
    config::AppConfig,
    db::{self, store::PgJobStore, JobStore},
    services::{
        notifier::{LogNotifier, Notifier, WebhookNotifier},
        orchestrator::{JobError, Orchestrator},
        product_client::ProductApiClient,
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 5000;
const POLL_BATCH: i64 = 10;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting price-watch worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db_pool));
    let client = ProductApiClient::new(config.client()).expect("Failed to initialize product API client");
    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url).expect("Failed to initialize report webhook client")),
        None => Arc::new(LogNotifier),
    };
    let orchestrator = Orchestrator::new(store, Arc::new(client), notifier, config.processing());

    tracing::info!("Worker ready, polling for pending and stalled jobs");

    loop {
        match process_runnable(&orchestrator).await {
            Ok(0) => {
                tracing::trace!("No runnable jobs, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Ok(count) => tracing::debug!(count, "Processed runnable jobs"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to poll pending jobs, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Runs every runnable job this worker manages to claim. Returns how many ran.
async fn process_runnable(orchestrator: &Orchestrator) -> Result<usize, JobError> {
    let jobs = orchestrator
        .store()
        .list_runnable_jobs(orchestrator.stale_before(), POLL_BATCH)
        .await?;
    let mut processed = 0;

    for job in jobs {
        match orchestrator.process_job(job.id).await {
            Ok(status) => {
                tracing::info!(job_id = %job.id, status = %status, "Job processed");
                processed += 1;
            }
            // Another process claimed it first.
            Err(JobError::AlreadyRunning(_)) | Err(JobError::InvalidJobState { .. }) => {
                tracing::debug!(job_id = %job.id, "Job claimed elsewhere");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(processed)
}
