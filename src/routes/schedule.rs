use axum::extract::State;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::config::ScheduleConfig;
use crate::models::api::{ScheduleRequest, ScheduleResponse};
use crate::routes::auth::AuthUser;
use crate::routes::{ApiError, ApiResult};
use crate::services::scheduler::DailyTrigger;
use std::sync::Arc;

fn trigger(state: &AppState) -> ApiResult<&Arc<DailyTrigger>> {
    state
        .trigger
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Daily trigger is not running"))
}

/// GET /api/v1/schedule: configured time of day and the next run.
pub async fn get_schedule(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<ScheduleResponse>> {
    let trigger = trigger(&state)?;
    let schedule = trigger
        .current()
        .await
        .ok_or_else(|| ApiError::not_found("No daily schedule configured"))?;

    Ok(Json(ScheduleResponse::new(schedule, trigger.next_run().await)))
}

/// PUT /api/v1/schedule: replace the daily trigger time.
pub async fn update_schedule(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ScheduleRequest>,
) -> ApiResult<Json<ScheduleResponse>> {
    request.validate()?;

    let schedule = ScheduleConfig {
        hour: request.hour,
        minute: request.minute,
        timezone: request.timezone,
    };
    let trigger = trigger(&state)?;
    trigger.reschedule(schedule.clone()).await?;

    tracing::info!(user_id = %user.user_id, "Daily schedule updated");
    Ok(Json(ScheduleResponse::new(schedule, trigger.next_run().await)))
}
