use axum::extract::{Path, State};
use chrono::Utc;

use super::extract::{parse_id, JsonBody};
use super::query::FindParams;
use crate::auth::Claims;
use crate::domain::transaction::{
    DepositTotals, PeriodStarts, TransactionCreateRequest, TransactionResponse, TransactionUpdateRequest,
};
use crate::domain::{ArchiveRequest, DeleteRequest};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, PagedResponse};
use crate::state::AppState;

/// GET /v1/transactions - non-admins see only their own
pub async fn find(
    State(state): State<AppState>,
    claims: Claims,
    params: FindParams,
) -> ApiResult<PagedResponse<TransactionResponse>> {
    let repo = &state.repos.transactions;
    let txs = repo
        .find(&claims, &params.request, params.include)
        .await
        .map_err(|e| ApiError::from_repository(e, format!("transaction.find subject={}", claims.sub)))?;
    let total_count = repo
        .count(&claims, &params.request)
        .await
        .map_err(|e| ApiError::from_repository(e, format!("transaction.count subject={}", claims.sub)))?;

    let tc = state.time_context();
    Ok(ApiResponse::success(PagedResponse {
        items: TransactionResponse::list(&txs, &tc),
        total_count,
    }))
}

/// GET /v1/transactions/:id
pub async fn read(State(state): State<AppState>, claims: Claims, Path(id): Path<String>) -> ApiResult<TransactionResponse> {
    let id = parse_id(&id)?;
    let tx = state
        .repos
        .transactions
        .read_by_id(&claims, id)
        .await
        .map_err(|e| ApiError::from_repository(e, format!("transaction.read id={}", id)))?;
    Ok(ApiResponse::success(tx.response(&state.time_context())))
}

/// GET /v1/transactions/totals - deposits taken today, this week and this month
pub async fn totals(State(state): State<AppState>, claims: Claims) -> ApiResult<DepositTotals> {
    let tc = state.time_context();
    let totals = state
        .repos
        .transactions
        .deposit_totals(&claims, PeriodStarts::at(tc.now, tc.offset))
        .await
        .map_err(|e| ApiError::from_repository(e, format!("transaction.totals subject={}", claims.sub)))?;
    Ok(ApiResponse::success(totals))
}

/// POST /v1/transactions - post a deposit or withdrawal
///
/// Returns 400 `insufficient funds` when a withdrawal exceeds the balance.
pub async fn create(
    State(state): State<AppState>,
    claims: Claims,
    JsonBody(req): JsonBody<TransactionCreateRequest>,
) -> ApiResult<TransactionResponse> {
    let account_number = req.account_number.clone();
    let tx = state
        .repos
        .transactions
        .create(&claims, req, Utc::now())
        .await
        .map_err(|e| ApiError::from_repository(e, format!("transaction.create account={}", account_number)))?;
    Ok(ApiResponse::created(tx.response(&state.time_context())))
}

/// PATCH /v1/transactions
pub async fn update(
    State(state): State<AppState>,
    claims: Claims,
    JsonBody(req): JsonBody<TransactionUpdateRequest>,
) -> ApiResult<()> {
    let id = req.id;
    state
        .repos
        .transactions
        .update(&claims, req, Utc::now())
        .await
        .map_err(|e| ApiError::from_repository(e, format!("transaction.update id={}", id)))?;
    Ok(ApiResponse::no_content())
}

/// PATCH /v1/transactions/archive - reverses the balance effect once
pub async fn archive(State(state): State<AppState>, claims: Claims, JsonBody(req): JsonBody<ArchiveRequest>) -> ApiResult<()> {
    let id = req.id;
    state
        .repos
        .transactions
        .archive(&claims, req, Utc::now())
        .await
        .map_err(|e| ApiError::from_repository(e, format!("transaction.archive id={}", id)))?;
    Ok(ApiResponse::no_content())
}

/// DELETE /v1/transactions/:id
pub async fn delete(State(state): State<AppState>, claims: Claims, Path(id): Path<String>) -> ApiResult<()> {
    let id = parse_id(&id)?;
    state
        .repos
        .transactions
        .delete(&claims, DeleteRequest { id })
        .await
        .map_err(|e| ApiError::from_repository(e, format!("transaction.delete id={}", id)))?;
    Ok(ApiResponse::no_content())
}
