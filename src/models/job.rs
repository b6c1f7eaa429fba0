use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle of a price-watch job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Lifecycle of one batch within a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    /// Terminal batches are never picked up by the processing loop again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Cancelled
        )
    }

    /// Only pending or in-flight batches may be cancelled.
    pub fn is_cancellable(self) -> bool {
        matches!(self, BatchStatus::Pending | BatchStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One end-to-end request to process a list of identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub status: JobStatus,
    pub total_batches: i32,
    pub completed_batches: i32,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Refreshed by the run that owns the job while it is processing.
    pub heartbeat_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A processing job whose owner stopped reporting before `cutoff`.
    pub fn is_stalled(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing && self.heartbeat_at.map_or(true, |at| at < cutoff)
    }
}

/// A fixed-size partition of a job's identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub job_id: Uuid,
    pub sequence: i32,
    pub status: BatchStatus,
    pub item_count: i32,
    pub processed_count: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Processing record for a single identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub position: i32,
    pub identifier: String,
    pub status: ItemStatus,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Everything needed to persist a job tree in one go.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub created_by: Option<String>,
    /// Identifiers already partitioned into batches, in sequence order.
    pub batches: Vec<Vec<String>>,
}
