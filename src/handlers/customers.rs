use axum::extract::{Path, State};
use chrono::Utc;

use super::extract::{parse_id, JsonBody};
use super::query::FindParams;
use crate::auth::Claims;
use crate::domain::customer::{CustomerCreateRequest, CustomerResponse, CustomerUpdateRequest};
use crate::domain::{ArchiveRequest, DeleteRequest};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, PagedResponse};
use crate::state::AppState;

/// GET /v1/customers - filtered, paged list
///
/// Accepts `search` in addition to the common list parameters; it matches
/// name, email and phone number case-insensitively.
pub async fn find(State(state): State<AppState>, claims: Claims, params: FindParams) -> ApiResult<PagedResponse<CustomerResponse>> {
    let repo = &state.repos.customers;
    let search = params.search.as_deref();
    let customers = repo
        .find(&claims, &params.request, search, params.include)
        .await
        .map_err(|e| ApiError::from_repository(e, "customer.find"))?;
    let total_count = repo
        .count(&claims, &params.request, search)
        .await
        .map_err(|e| ApiError::from_repository(e, "customer.count"))?;

    let tc = state.time_context();
    Ok(ApiResponse::success(PagedResponse {
        items: CustomerResponse::list(&customers, &tc),
        total_count,
    }))
}

/// GET /v1/customers/:id
pub async fn read(State(state): State<AppState>, claims: Claims, Path(id): Path<String>) -> ApiResult<CustomerResponse> {
    let id = parse_id(&id)?;
    let customer = state
        .repos
        .customers
        .read_by_id(&claims, id)
        .await
        .map_err(|e| ApiError::from_repository(e, format!("customer.read id={}", id)))?;
    Ok(ApiResponse::success(customer.response(&state.time_context())))
}

/// POST /v1/customers
pub async fn create(
    State(state): State<AppState>,
    claims: Claims,
    JsonBody(req): JsonBody<CustomerCreateRequest>,
) -> ApiResult<CustomerResponse> {
    let customer = state
        .repos
        .customers
        .create(&claims, req, Utc::now())
        .await
        .map_err(|e| ApiError::from_repository(e, format!("customer.create subject={}", claims.sub)))?;
    Ok(ApiResponse::created(customer.response(&state.time_context())))
}

/// PATCH /v1/customers
pub async fn update(
    State(state): State<AppState>,
    claims: Claims,
    JsonBody(req): JsonBody<CustomerUpdateRequest>,
) -> ApiResult<()> {
    let id = req.id;
    state
        .repos
        .customers
        .update(&claims, req, Utc::now())
        .await
        .map_err(|e| ApiError::from_repository(e, format!("customer.update id={}", id)))?;
    Ok(ApiResponse::no_content())
}

/// PATCH /v1/customers/archive
pub async fn archive(State(state): State<AppState>, claims: Claims, JsonBody(req): JsonBody<ArchiveRequest>) -> ApiResult<()> {
    let id = req.id;
    state
        .repos
        .customers
        .archive(&claims, req, Utc::now())
        .await
        .map_err(|e| ApiError::from_repository(e, format!("customer.archive id={}", id)))?;
    Ok(ApiResponse::no_content())
}

/// DELETE /v1/customers/:id
pub async fn delete(State(state): State<AppState>, claims: Claims, Path(id): Path<String>) -> ApiResult<()> {
    let id = parse_id(&id)?;
    state
        .repos
        .customers
        .delete(&claims, DeleteRequest { id })
        .await
        .map_err(|e| ApiError::from_repository(e, format!("customer.delete id={}", id)))?;
    Ok(ApiResponse::no_content())
}
