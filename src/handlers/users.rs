use axum::extract::{Path, State};

use super::extract::parse_id;
use super::query::FindParams;
use crate::auth::Claims;
use crate::domain::user::UserResponse;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, PagedResponse};
use crate::state::AppState;

/// GET /v1/users
pub async fn find(State(state): State<AppState>, claims: Claims, params: FindParams) -> ApiResult<PagedResponse<UserResponse>> {
    let repo = &state.repos.users;
    let users = repo
        .find(&claims, &params.request)
        .await
        .map_err(|e| ApiError::from_repository(e, "user.find"))?;
    let total_count = repo
        .count(&claims, &params.request)
        .await
        .map_err(|e| ApiError::from_repository(e, "user.count"))?;

    let tc = state.time_context();
    Ok(ApiResponse::success(PagedResponse {
        items: UserResponse::list(&users, &tc),
        total_count,
    }))
}

/// GET /v1/users/:id
pub async fn read(State(state): State<AppState>, claims: Claims, Path(id): Path<String>) -> ApiResult<UserResponse> {
    let id = parse_id(&id)?;
    let user = state
        .repos
        .users
        .read_by_id(&claims, id)
        .await
        .map_err(|e| ApiError::from_repository(e, format!("user.read id={}", id)))?;
    Ok(ApiResponse::success(user.response(&state.time_context())))
}
