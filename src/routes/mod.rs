//! HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;

use crate::app_state::AppState;
use crate::db::StoreError;
use crate::services::orchestrator::JobError;
use crate::services::report::ReportError;
use crate::services::scheduler::ScheduleError;

pub mod auth;
pub mod batches;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod reports;
pub mod schedule;
pub mod watchlist;

/// Application routes, without the metrics endpoint and middleware layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/api/v1/jobs/{id}", get(jobs::get_job))
        .route("/api/v1/jobs/{id}/status", get(jobs::get_job_status))
        .route("/api/v1/jobs/{id}/trigger", post(jobs::trigger_job))
        .route("/api/v1/batches/{id}", get(batches::get_batch))
        .route("/api/v1/batches/{id}/items", get(batches::list_items))
        .route("/api/v1/batches/{id}/stop", post(batches::stop_batch))
        .route("/api/v1/reports/{job_id}", get(reports::list_alerts))
        .route("/api/v1/reports/{job_id}/xlsx", get(reports::download_report))
        .route("/api/v1/reports/{job_id}/notify", post(reports::notify_report))
        .route(
            "/api/v1/watchlist",
            post(watchlist::add_identifiers)
                .get(watchlist::list_identifiers)
                .delete(watchlist::clear_identifiers),
        )
        .route("/api/v1/watchlist/count", get(watchlist::count_identifiers))
        .route("/api/v1/watchlist/{identifier}", delete(watchlist::remove_identifier))
        .route(
            "/api/v1/list-prices",
            put(watchlist::upsert_list_prices)
                .get(watchlist::list_list_prices)
                .delete(watchlist::clear_list_prices),
        )
        .route("/api/v1/list-prices/count", get(watchlist::count_list_prices))
        .route(
            "/api/v1/list-prices/{identifier}",
            get(watchlist::get_list_price).delete(watchlist::delete_list_price),
        )
        .route(
            "/api/v1/schedule",
            get(schedule::get_schedule).put(schedule::update_schedule),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

/// Error returned by every handler, rendered as `{code, message}` JSON.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "DELIVERY_FAILED", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Store error");
        ApiError::internal("Database error occurred")
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Validation(msg) => ApiError::validation(msg),
            JobError::JobNotFound(_) | JobError::BatchNotFound(_) => {
                ApiError::not_found(err.to_string())
            }
            JobError::AlreadyRunning(_)
            | JobError::InvalidJobState { .. }
            | JobError::InvalidBatchState { .. } => ApiError::conflict(err.to_string()),
            JobError::Store(e) => e.into(),
            JobError::Report(e) => e.into(),
            JobError::Notify(e) => {
                tracing::warn!(error = %e, "Report delivery failed");
                ApiError::bad_gateway(e.to_string())
            }
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        tracing::error!(error = %err, "Report rendering failed");
        ApiError::internal("Failed to render report")
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::InvalidTimezone(_) | ScheduleError::InvalidTime { .. } => {
                ApiError::validation(err.to_string())
            }
            ScheduleError::Scheduler(e) => {
                tracing::error!(error = %e, "Scheduler error");
                ApiError::internal("Failed to update schedule")
            }
        }
    }
}

impl From<garde::Report> for ApiError {
    fn from(report: garde::Report) -> Self {
        ApiError::validation(report.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_job_errors_map_to_status() {
        let not_found: ApiError = JobError::JobNotFound(Uuid::nil()).into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let running: ApiError = JobError::AlreadyRunning(Uuid::nil()).into();
        assert_eq!(running.status, StatusCode::CONFLICT);

        let invalid: ApiError = JobError::Validation("bad".to_string()).into();
        assert_eq!(invalid.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(invalid.code, "VALIDATION_ERROR");
    }

    #[test]
    fn test_store_errors_hide_details() {
        let err: ApiError = StoreError::Unavailable("connection refused".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("refused"));
    }
}
