// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt::Display;

use crate::domain::RepositoryError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 405 Method Not Allowed
    MethodNotAllowed(String),

    // 408 Request Timeout
    RequestTimeout(String),

    // 413 Payload Too Large
    PayloadTooLarge(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::MethodNotAllowed(_) => 405,
            ApiError::RequestTimeout(_) => 408,
            ApiError::PayloadTooLarge(_) => 413,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::MethodNotAllowed(msg) => msg,
            ApiError::RequestTimeout(msg) => msg,
            ApiError::PayloadTooLarge(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors } => {
                let mut response = json!({
                    "error": true,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });

                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }

                response
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            ApiError::RequestTimeout(_) => "REQUEST_TIMEOUT",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Map a bare status (from a layer or the router) onto the error shape.
    pub fn from_status(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or("Request failed").to_string();
        match status.as_u16() {
            400 => ApiError::BadRequest(reason),
            401 => ApiError::Unauthorized(reason),
            403 => ApiError::Forbidden(reason),
            404 => ApiError::NotFound("Route not found".to_string()),
            405 => ApiError::MethodNotAllowed(reason),
            408 => ApiError::RequestTimeout("Request timed out".to_string()),
            413 => ApiError::PayloadTooLarge("Request body too large".to_string()),
            422 => ApiError::InvalidJson(reason),
            503 => ApiError::ServiceUnavailable(reason),
            400..=499 => ApiError::BadRequest(reason),
            _ => ApiError::InternalServerError("An unexpected error occurred".to_string()),
        }
    }

    /// Classify a repository failure. Unclassified causes are logged with
    /// `context` and never reach the client verbatim.
    pub fn from_repository(err: RepositoryError, context: impl Display) -> Self {
        match err {
            RepositoryError::NotFound(msg) => ApiError::not_found(msg),
            RepositoryError::Forbidden(msg) => ApiError::forbidden(msg),
            RepositoryError::Validation(errors) => {
                let message = format!("Validation failed for: {}", errors.field_names());
                ApiError::validation_error(message, Some(errors.into_map()))
            }
            RepositoryError::BadRequest(msg) => ApiError::bad_request(msg),
            RepositoryError::Filter(e) => ApiError::bad_request(e.to_string()),
            RepositoryError::Database(e) => {
                tracing::error!(context = %context, error = %e, "database failure");
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            RepositoryError::Internal(msg) => {
                tracing::error!(context = %context, error = %msg, "internal failure");
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        ApiError::from_repository(err, "unspecified")
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::manager::DatabaseError;
    use crate::domain::FieldErrors;

    #[test]
    fn repository_errors_map_to_status_codes() {
        let cases = [
            (RepositoryError::NotFound("x".into()), 404),
            (RepositoryError::Forbidden("x".into()), 403),
            (RepositoryError::BadRequest("x".into()), 400),
            (RepositoryError::Internal("x".into()), 500),
            (RepositoryError::Database(DatabaseError::QueryError("boom".into())), 500),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from_repository(err, "test").status_code(), status);
        }
    }

    #[test]
    fn validation_lists_every_field() {
        let mut errors = FieldErrors::default();
        errors.add("amount", "must be greater than zero");
        errors.add("account_number", "is required");

        let api = ApiError::from_repository(RepositoryError::Validation(errors), "deposit.create");
        let body = api.to_json();
        assert_eq!(api.status_code(), 400);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"]["amount"], "must be greater than zero");
        assert_eq!(body["message"], "Validation failed for: account_number, amount");
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let api = ApiError::from_repository(RepositoryError::Internal("pq: relation missing".into()), "deposit.find");
        assert!(!api.message().contains("pq:"));
    }

    #[test]
    fn bare_statuses_are_normalized() {
        assert_eq!(ApiError::from_status(StatusCode::METHOD_NOT_ALLOWED).error_code(), "METHOD_NOT_ALLOWED");
        assert_eq!(ApiError::from_status(StatusCode::REQUEST_TIMEOUT).status_code(), 408);
        assert_eq!(ApiError::from_status(StatusCode::BAD_GATEWAY).status_code(), 500);
    }
}
