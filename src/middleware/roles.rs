use axum::{extract::Request, middleware::Next, response::IntoResponse, response::Response};

use crate::auth::Claims;
use crate::error::ApiError;

/// Role gate for admin-only handlers. Must run after `jwt_auth_middleware`.
pub async fn require_admin(request: Request, next: Next) -> Response {
    match request.extensions().get::<Claims>() {
        Some(claims) if claims.is_admin() => next.run(request).await,
        Some(claims) => {
            tracing::debug!(subject = %claims.sub, "admin role required");
            ApiError::forbidden("admin role required").into_response()
        }
        None => {
            tracing::error!("role gate reached without claims; auth layer missing");
            ApiError::internal_server_error("claims missing from request context").into_response()
        }
    }
}
