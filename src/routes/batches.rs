use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::{Batch, Item};
use crate::routes::auth::AuthUser;
use crate::routes::{ApiError, ApiResult};

/// GET /api/v1/batches/{id}
pub async fn get_batch(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<Batch>> {
    let batch = state
        .store
        .get_batch(batch_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Batch not found: {}", batch_id)))?;

    Ok(Json(batch))
}

/// GET /api/v1/batches/{id}/items: items in processing order.
pub async fn list_items(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Item>>> {
    if state.store.get_batch(batch_id).await?.is_none() {
        return Err(ApiError::not_found(format!("Batch not found: {}", batch_id)));
    }

    Ok(Json(state.store.list_items(batch_id).await?))
}

/// POST /api/v1/batches/{id}/stop: cancel a pending or running batch.
pub async fn stop_batch(
    State(state): State<AppState>,
    user: AuthUser,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<Batch>> {
    let batch = state.orchestrator.cancel_batch(batch_id).await?;
    tracing::info!(batch_id = %batch_id, user_id = %user.user_id, "Batch stop requested");

    Ok(Json(batch))
}
