use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::alert::Alert;
use crate::models::api::MessageResponse;
use crate::routes::auth::AuthUser;
use crate::routes::{ApiError, ApiResult};
use crate::services::notifier::XLSX_MIME;
use crate::services::report::report_filename;

/// GET /api/v1/reports/{job_id}: alerts detected by a job, newest first.
pub async fn list_alerts(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Alert>>> {
    if state.store.get_job(job_id).await?.is_none() {
        return Err(ApiError::not_found(format!("Job not found: {}", job_id)));
    }

    Ok(Json(state.store.list_alerts(job_id).await?))
}

/// GET /api/v1/reports/{job_id}/xlsx: the compiled report as a spreadsheet.
pub async fn download_report(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let (job, report) = state.orchestrator.build_report(job_id).await?;
    let document = report.to_xlsx()?;
    let filename = report_filename(&job.name, chrono::Utc::now());

    Ok((
        [
            (CONTENT_TYPE, XLSX_MIME.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        document,
    ))
}

/// POST /api/v1/reports/{job_id}/notify: resend the report.
pub async fn notify_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    state.orchestrator.notify_report(job_id).await?;
    tracing::info!(job_id = %job_id, user_id = %user.user_id, "Report resent");

    Ok(Json(MessageResponse {
        message: "Report sent".to_string(),
        id: Some(job_id),
    }))
}
