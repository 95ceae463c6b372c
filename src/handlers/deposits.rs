use axum::extract::{Path, State};
use chrono::Utc;

use super::extract::{parse_id, JsonBody};
use super::query::FindParams;
use crate::auth::Claims;
use crate::domain::deposit::{DepositCreateRequest, DepositResponse, DepositUpdateRequest};
use crate::domain::{ArchiveRequest, DeleteRequest};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, PagedResponse};
use crate::state::AppState;

/// GET /v1/deposits - filtered, paged list
///
/// Query: `where`, `order`, `limit`, `offset`, `include-archived`,
/// `include-account`, `include-sales-rep`.
pub async fn find(State(state): State<AppState>, claims: Claims, params: FindParams) -> ApiResult<PagedResponse<DepositResponse>> {
    let repo = &state.repos.deposits;
    let deposits = repo
        .find(&claims, &params.request, params.include)
        .await
        .map_err(|e| ApiError::from_repository(e, "deposit.find"))?;
    let total_count = repo
        .count(&claims, &params.request)
        .await
        .map_err(|e| ApiError::from_repository(e, "deposit.count"))?;

    let tc = state.time_context();
    Ok(ApiResponse::success(PagedResponse {
        items: DepositResponse::list(&deposits, &tc),
        total_count,
    }))
}

/// GET /v1/deposits/:id
pub async fn read(State(state): State<AppState>, claims: Claims, Path(id): Path<String>) -> ApiResult<DepositResponse> {
    let id = parse_id(&id)?;
    let deposit = state
        .repos
        .deposits
        .read_by_id(&claims, id)
        .await
        .map_err(|e| ApiError::from_repository(e, format!("deposit.read id={}", id)))?;
    Ok(ApiResponse::success(deposit.response(&state.time_context())))
}

/// POST /v1/deposits - record a deposit against an account number
pub async fn create(
    State(state): State<AppState>,
    claims: Claims,
    JsonBody(req): JsonBody<DepositCreateRequest>,
) -> ApiResult<DepositResponse> {
    let account_number = req.account_number.clone();
    let deposit = state
        .repos
        .deposits
        .create(&claims, req, Utc::now())
        .await
        .map_err(|e| ApiError::from_repository(e, format!("deposit.create account={}", account_number)))?;
    Ok(ApiResponse::created(deposit.response(&state.time_context())))
}

/// PATCH /v1/deposits - partial update, id in the body
pub async fn update(
    State(state): State<AppState>,
    claims: Claims,
    JsonBody(req): JsonBody<DepositUpdateRequest>,
) -> ApiResult<()> {
    let id = req.id;
    state
        .repos
        .deposits
        .update(&claims, req, Utc::now())
        .await
        .map_err(|e| ApiError::from_repository(e, format!("deposit.update id={}", id)))?;
    Ok(ApiResponse::no_content())
}

/// PATCH /v1/deposits/archive
pub async fn archive(State(state): State<AppState>, claims: Claims, JsonBody(req): JsonBody<ArchiveRequest>) -> ApiResult<()> {
    let id = req.id;
    state
        .repos
        .deposits
        .archive(&claims, req, Utc::now())
        .await
        .map_err(|e| ApiError::from_repository(e, format!("deposit.archive id={}", id)))?;
    Ok(ApiResponse::no_content())
}

/// DELETE /v1/deposits/:id
pub async fn delete(State(state): State<AppState>, claims: Claims, Path(id): Path<String>) -> ApiResult<()> {
    let id = parse_id(&id)?;
    state
        .repos
        .deposits
        .delete(&claims, DeleteRequest { id })
        .await
        .map_err(|e| ApiError::from_repository(e, format!("deposit.delete id={}", id)))?;
    Ok(ApiResponse::no_content())
}
