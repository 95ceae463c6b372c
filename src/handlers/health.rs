use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::DatabaseManager;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET / - service description
pub async fn root() -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "name": "teller-api",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Customers, accounts, deposits and transactions for field sales teams",
        "endpoints": {
            "health": "/v1/health (public)",
            "customers": "/v1/customers[/:id] (protected)",
            "accounts": "/v1/accounts[/:id] (protected)",
            "deposits": "/v1/deposits[/:id] (protected)",
            "transactions": "/v1/transactions[/:id] (protected)",
            "users": "/v1/users[/:id] (protected, read-only)",
        },
    })))
}

/// GET /ping
pub async fn ping() -> &'static str {
    "pong"
}

/// GET /v1/health - 503 while the database is unreachable
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok",
                    "environment": state.config.environment,
                }
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            ApiError::service_unavailable("database unavailable").into_response()
        }
    }
}
