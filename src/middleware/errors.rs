use axum::{
    extract::Request,
    http::header::CONTENT_TYPE,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

/// Rewrites bare error statuses produced by the router or tower layers
/// (unknown route, wrong method, timeout, body too large) into the JSON error
/// shape. Responses that already carry JSON pass through untouched.
pub async fn normalize_errors(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) || is_json(&response) {
        return response;
    }

    let mut normalized = ApiError::from_status(status).into_response();
    if let Some(allow) = response.headers().get(axum::http::header::ALLOW) {
        normalized.headers_mut().insert(axum::http::header::ALLOW, allow.clone());
    }
    normalized
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}
