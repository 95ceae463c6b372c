use axum::extract::{Path, State};
use chrono::Utc;

use super::extract::{parse_id, JsonBody};
use super::query::FindParams;
use crate::auth::Claims;
use crate::domain::account::{AccountCreateRequest, AccountResponse, AccountUpdateRequest};
use crate::domain::{ArchiveRequest, DeleteRequest};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, PagedResponse};
use crate::state::AppState;

/// GET /v1/accounts
pub async fn find(State(state): State<AppState>, claims: Claims, params: FindParams) -> ApiResult<PagedResponse<AccountResponse>> {
    let repo = &state.repos.accounts;
    let accounts = repo
        .find(&claims, &params.request, params.include)
        .await
        .map_err(|e| ApiError::from_repository(e, "account.find"))?;
    let total_count = repo
        .count(&claims, &params.request)
        .await
        .map_err(|e| ApiError::from_repository(e, "account.count"))?;

    let tc = state.time_context();
    Ok(ApiResponse::success(PagedResponse {
        items: AccountResponse::list(&accounts, &tc),
        total_count,
    }))
}

/// GET /v1/accounts/:id
///
/// The path segment may also be an account number (`SB10003001`).
pub async fn read(State(state): State<AppState>, claims: Claims, Path(id): Path<String>) -> ApiResult<AccountResponse> {
    let repo = &state.repos.accounts;
    let account = if looks_like_number(&id) {
        repo.read_by_number(&claims, id.trim()).await
    } else {
        repo.read_by_id(&claims, parse_id(&id)?).await
    }
    .map_err(|e| ApiError::from_repository(e, format!("account.read id={}", id)))?;
    Ok(ApiResponse::success(account.response(&state.time_context())))
}

fn looks_like_number(raw: &str) -> bool {
    let raw = raw.trim();
    raw.len() == 10 && raw.is_ascii() && raw[..2].chars().all(|c| c.is_ascii_uppercase()) && raw[2..].chars().all(|c| c.is_ascii_digit())
}

/// POST /v1/accounts - open an account for an existing customer
pub async fn create(
    State(state): State<AppState>,
    claims: Claims,
    JsonBody(req): JsonBody<AccountCreateRequest>,
) -> ApiResult<AccountResponse> {
    let customer_id = req.customer_id;
    let account = state
        .repos
        .accounts
        .create(&claims, req, Utc::now())
        .await
        .map_err(|e| ApiError::from_repository(e, format!("account.create customer={}", customer_id)))?;
    Ok(ApiResponse::created(account.response(&state.time_context())))
}

/// PATCH /v1/accounts
pub async fn update(
    State(state): State<AppState>,
    claims: Claims,
    JsonBody(req): JsonBody<AccountUpdateRequest>,
) -> ApiResult<()> {
    let id = req.id;
    state
        .repos
        .accounts
        .update(&claims, req, Utc::now())
        .await
        .map_err(|e| ApiError::from_repository(e, format!("account.update id={}", id)))?;
    Ok(ApiResponse::no_content())
}

/// PATCH /v1/accounts/archive
pub async fn archive(State(state): State<AppState>, claims: Claims, JsonBody(req): JsonBody<ArchiveRequest>) -> ApiResult<()> {
    let id = req.id;
    state
        .repos
        .accounts
        .archive(&claims, req, Utc::now())
        .await
        .map_err(|e| ApiError::from_repository(e, format!("account.archive id={}", id)))?;
    Ok(ApiResponse::no_content())
}

/// DELETE /v1/accounts/:id
pub async fn delete(State(state): State<AppState>, claims: Claims, Path(id): Path<String>) -> ApiResult<()> {
    let id = parse_id(&id)?;
    state
        .repos
        .accounts
        .delete(&claims, DeleteRequest { id })
        .await
        .map_err(|e| ApiError::from_repository(e, format!("account.delete id={}", id)))?;
    Ok(ApiResponse::no_content())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_account_numbers() {
        assert!(looks_like_number("SB10003001"));
        assert!(looks_like_number(" DS00000042 "));
        assert!(!looks_like_number("sb10003001"));
        assert!(!looks_like_number("SB1000300"));
    }
}
