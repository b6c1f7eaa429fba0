use uuid::Uuid;

use crate::db::{JobStore, StoreError};
use crate::models::job::{BatchStatus, JobStatus};

/// Closes out a processing job whose batches have all reached a terminal state.
///
/// Safe to call any number of times: the final write only applies while the
/// job is still processing. Returns whether the job was changed.
pub async fn reconcile_job(store: &dyn JobStore, job_id: Uuid) -> Result<bool, StoreError> {
    let Some(job) = store.get_job(job_id).await? else {
        return Ok(false);
    };
    if job.status != JobStatus::Processing {
        return Ok(false);
    }

    let batches = store.list_batches(job_id).await?;
    if batches.is_empty() || !batches.iter().all(|b| b.status.is_terminal()) {
        return Ok(false);
    }

    let finished = batches
        .iter()
        .filter(|b| matches!(b.status, BatchStatus::Completed | BatchStatus::Cancelled))
        .count() as i32;

    let updated = store.complete_job_if_processing(job_id, finished).await?;
    if updated {
        tracing::info!(
            job_id = %job_id,
            completed_batches = finished,
            total_batches = batches.len(),
            "Job reconciled to completed"
        );
    }

    Ok(updated)
}
