use std::any::Any;

use axum::response::{IntoResponse, Response};

use crate::error::ApiError;

/// `CatchPanicLayer` handler: log the payload, answer 500 in the usual shape.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    tracing::error!(panic = %detail, "request handler panicked");
    ApiError::internal_server_error("An unexpected error occurred").into_response()
}
