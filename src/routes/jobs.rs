use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{CreateJobRequest, JobProgressResponse, ListJobsQuery, MessageResponse};
use crate::models::job::{Job, JobStatus};
use crate::routes::auth::AuthUser;
use crate::routes::{ApiError, ApiResult};
use crate::services::job_status::reconcile_job;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// POST /api/v1/jobs: create a job and start processing it in the background.
pub async fn create_job(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    request.validate()?;

    let job = state
        .orchestrator
        .create_job(&request.name, &request.identifiers, Some(&user.user_id))
        .await?;
    state.orchestrator.spawn_job(job.id);

    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /api/v1/jobs: newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let jobs = state.store.list_jobs(None, limit, offset).await?;
    Ok(Json(jobs))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    Ok(Json(load_reconciled(&state, job_id).await?))
}

/// GET /api/v1/jobs/{id}/status: progress with per-batch detail.
pub async fn get_job_status(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobProgressResponse>> {
    let job = load_reconciled(&state, job_id).await?;
    let batches = state.store.list_batches(job_id).await?;

    Ok(Json(JobProgressResponse::new(&job, batches)))
}

/// POST /api/v1/jobs/{id}/trigger: (re)start a pending, failed or stalled job.
pub async fn trigger_job(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let job = state
        .store
        .get_job(job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job not found: {}", job_id)))?;

    let running = job.status == JobStatus::Processing
        && !job.is_stalled(state.orchestrator.stale_before());
    if running || job.status == JobStatus::Completed {
        return Err(ApiError::conflict(format!(
            "Job {} cannot be triggered while {}",
            job_id, job.status
        )));
    }

    state.orchestrator.spawn_job(job_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Job processing started".to_string(),
            id: Some(job_id),
        }),
    ))
}

async fn load_reconciled(state: &AppState, job_id: Uuid) -> ApiResult<Job> {
    reconcile_job(state.store.as_ref(), job_id).await?;

    state
        .store
        .get_job(job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job not found: {}", job_id)))
}
