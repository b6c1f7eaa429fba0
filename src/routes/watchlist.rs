use axum::extract::{Path, Query, State};
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::api::{
    BulkImportResponse, CountResponse, DeletedResponse, ListPricesRequest, ReferenceQuery,
    WatchlistRequest,
};
use crate::models::reference::{ListPrice, WatchlistEntry};
use crate::routes::auth::AuthUser;
use crate::routes::{ApiError, ApiResult};

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 1000;

fn page(query: &ReferenceQuery) -> (i64, i64) {
    (
        query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        query.offset.unwrap_or(0).max(0),
    )
}

/// POST /api/v1/watchlist: add identifiers; ones already listed are skipped.
pub async fn add_identifiers(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(request): Json<WatchlistRequest>,
) -> ApiResult<Json<BulkImportResponse>> {
    request.validate()?;

    let identifiers: Vec<String> = request
        .identifiers
        .iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect();
    let stored = state.store.add_to_watchlist(&identifiers).await?;

    tracing::info!(received = request.identifiers.len(), stored, "Watchlist updated");
    Ok(Json(BulkImportResponse {
        received: request.identifiers.len(),
        stored,
    }))
}

/// GET /api/v1/watchlist: in the order identifiers were added.
pub async fn list_identifiers(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ReferenceQuery>,
) -> ApiResult<Json<Vec<WatchlistEntry>>> {
    let (limit, offset) = page(&query);
    Ok(Json(state.store.list_watchlist(limit, offset).await?))
}

/// GET /api/v1/watchlist/count
pub async fn count_identifiers(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<CountResponse>> {
    let count = state.store.count_watchlist().await?;
    Ok(Json(CountResponse { count }))
}

/// DELETE /api/v1/watchlist/{identifier}
pub async fn remove_identifier(
    State(state): State<AppState>,
    user: AuthUser,
    Path(identifier): Path<String>,
) -> ApiResult<Json<DeletedResponse>> {
    if !state.store.remove_from_watchlist(&identifier).await? {
        return Err(ApiError::not_found(format!(
            "Identifier not on watchlist: {}",
            identifier
        )));
    }

    tracing::info!(user_id = %user.user_id, identifier = %identifier, "Identifier removed from watchlist");
    Ok(Json(DeletedResponse { deleted: 1 }))
}

/// DELETE /api/v1/watchlist
pub async fn clear_identifiers(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<DeletedResponse>> {
    let deleted = state.store.clear_watchlist().await?;

    tracing::warn!(user_id = %user.user_id, deleted, "Watchlist cleared");
    Ok(Json(DeletedResponse { deleted }))
}

/// PUT /api/v1/list-prices: insert or replace reference list prices.
pub async fn upsert_list_prices(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(request): Json<ListPricesRequest>,
) -> ApiResult<Json<BulkImportResponse>> {
    request.validate()?;

    let entries: Vec<(String, f64)> = request
        .entries
        .iter()
        .map(|e| (e.identifier.trim().to_string(), e.list_price))
        .collect();
    let stored = state.store.upsert_list_prices(&entries).await?;

    tracing::info!(received = entries.len(), stored, "List prices updated");
    Ok(Json(BulkImportResponse {
        received: entries.len(),
        stored,
    }))
}

/// GET /api/v1/list-prices: ordered by identifier, optionally filtered by `search`.
pub async fn list_list_prices(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ReferenceQuery>,
) -> ApiResult<Json<Vec<ListPrice>>> {
    let (limit, offset) = page(&query);
    let entries = state
        .store
        .list_price_entries(query.search(), limit, offset)
        .await?;
    Ok(Json(entries))
}

/// GET /api/v1/list-prices/count
pub async fn count_list_prices(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<ReferenceQuery>,
) -> ApiResult<Json<CountResponse>> {
    let count = state.store.count_list_prices(query.search()).await?;
    Ok(Json(CountResponse { count }))
}

/// GET /api/v1/list-prices/{identifier}
pub async fn get_list_price(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(identifier): Path<String>,
) -> ApiResult<Json<ListPrice>> {
    state
        .store
        .get_list_price(&identifier)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No list price for {}", identifier)))
}

/// DELETE /api/v1/list-prices/{identifier}
pub async fn delete_list_price(
    State(state): State<AppState>,
    user: AuthUser,
    Path(identifier): Path<String>,
) -> ApiResult<Json<DeletedResponse>> {
    if !state.store.delete_list_price(&identifier).await? {
        return Err(ApiError::not_found(format!("No list price for {}", identifier)));
    }

    tracing::info!(user_id = %user.user_id, identifier = %identifier, "List price deleted");
    Ok(Json(DeletedResponse { deleted: 1 }))
}

/// DELETE /api/v1/list-prices
pub async fn clear_list_prices(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<DeletedResponse>> {
    let deleted = state.store.clear_list_prices().await?;

    tracing::warn!(user_id = %user.user_id, deleted, "List prices cleared");
    Ok(Json(DeletedResponse { deleted }))
}
