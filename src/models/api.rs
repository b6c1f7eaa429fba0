use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ScheduleConfig;
use crate::models::job::{Batch, Job};

/// Request to create (and immediately start) a job.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    #[garde(length(min = 1, max = 200))]
    pub name: String,

    #[garde(length(min = 1), inner(length(min = 1, max = 64)))]
    pub identifiers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Progress view returned by `GET /api/v1/jobs/{id}/status`.
#[derive(Debug, Serialize)]
pub struct JobProgressResponse {
    pub job_id: Uuid,
    pub status: String,
    pub total_batches: i32,
    pub completed_batches: i32,
    pub progress_percent: f64,
    pub error: Option<String>,
    pub batches: Vec<Batch>,
}

impl JobProgressResponse {
    pub fn new(job: &Job, batches: Vec<Batch>) -> Self {
        let progress_percent = if job.total_batches > 0 {
            f64::from(job.completed_batches) / f64::from(job.total_batches) * 100.0
        } else {
            0.0
        };

        Self {
            job_id: job.id,
            status: job.status.to_string(),
            total_batches: job.total_batches,
            completed_batches: job.completed_batches,
            progress_percent,
            error: job.error.clone(),
            batches,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct WatchlistRequest {
    #[garde(length(min = 1), inner(length(min = 1, max = 64)))]
    pub identifiers: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListPriceEntry {
    #[garde(length(min = 1, max = 64))]
    pub identifier: String,

    #[garde(range(min = 0.0))]
    pub list_price: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListPricesRequest {
    #[garde(length(min = 1), dive)]
    pub entries: Vec<ListPriceEntry>,
}

#[derive(Debug, Serialize)]
pub struct BulkImportResponse {
    pub received: usize,
    pub stored: u64,
}

/// Paging and optional identifier search for watchlist and list-price listings.
#[derive(Debug, Default, Deserialize)]
pub struct ReferenceQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub search: Option<String>,
}

impl ReferenceQuery {
    /// The search term, or `None` when absent or blank.
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub hour: u32,
    pub minute: u32,
    pub timezone: String,
    /// Next firing of the daily trigger, when known.
    pub next_run: Option<DateTime<Utc>>,
}

impl ScheduleResponse {
    pub fn new(schedule: ScheduleConfig, next_run: Option<DateTime<Utc>>) -> Self {
        Self {
            hour: schedule.hour,
            minute: schedule.minute,
            timezone: schedule.timezone,
            next_run,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ScheduleRequest {
    #[garde(range(min = 0, max = 23))]
    pub hour: u32,

    #[garde(range(min = 0, max = 59))]
    pub minute: u32,

    #[garde(length(min = 1, max = 64))]
    pub timezone: String,
}
