//! Domain records, request types and response mappers for every resource.
//!
//! Repositories speak in these types; handlers only ever see them through the
//! response mappers.

pub mod account;
pub mod customer;
pub mod deposit;
pub mod field_update;
pub mod transaction;
pub mod user;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Timelike, Utc};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Claims;
use crate::database::manager::DatabaseError;
use crate::filter::error::FilterError;

pub use field_update::FieldUpdate;

/// Failure causes returned by every repository operation.
///
/// Handlers match on the variant to choose a status code; nothing inspects
/// the inner error chain.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed for: {}", .0.field_names())]
    Validation(FieldErrors),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("record not found".to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => RepositoryError::BadRequest("a record with the same unique value already exists".to_string()),
                Some("23503") => RepositoryError::BadRequest("referenced record does not exist or is still in use".to_string()),
                Some("23514") => RepositoryError::BadRequest("value violates a check constraint".to_string()),
                // filter values that do not convert to the column type
                Some("22P02") | Some("22007") | Some("22008") | Some("42846") => {
                    RepositoryError::BadRequest("filter value does not match the column type".to_string())
                }
                _ => RepositoryError::Database(DatabaseError::Sqlx(err)),
            },
            _ => RepositoryError::Database(DatabaseError::Sqlx(err)),
        }
    }
}

impl From<validator::ValidationErrors> for RepositoryError {
    fn from(errors: validator::ValidationErrors) -> Self {
        RepositoryError::Validation(FieldErrors::from(errors))
    }
}

/// Per-field validation messages, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn field_names(&self) -> String {
        self.0.keys().cloned().collect::<Vec<_>>().join(", ")
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.0.into_iter().collect()
    }

    /// `Ok(())` when nothing was recorded, otherwise a `Validation` error.
    pub fn into_result(self) -> Result<(), RepositoryError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(RepositoryError::Validation(self))
        }
    }
}

impl From<validator::ValidationErrors> for FieldErrors {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut out = FieldErrors::default();
        for (field, errs) in errors.field_errors() {
            let message = errs
                .first()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => describe_code(&e.code).to_string(),
                })
                .unwrap_or_else(|| "is invalid".to_string());
            out.add(field.to_string(), message);
        }
        out
    }
}

fn describe_code(code: &str) -> &'static str {
    match code {
        "required" => "is required",
        "length" => "has an invalid length",
        "range" => "is out of range",
        "email" => "must be a valid email address",
        _ => "is invalid",
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveRequest {
    pub id: Uuid,
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub id: Uuid,
}

/// Storage keeps microseconds, the API promises milliseconds.
pub fn truncate_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = (t.nanosecond() / 1_000_000) * 1_000_000;
    t.with_nanosecond(nanos).unwrap_or(t)
}

/// Mutations need a tenant on the claims.
pub fn ensure_audience(claims: &Claims) -> Result<(), RepositoryError> {
    if claims.has_audience() {
        Ok(())
    } else {
        Err(RepositoryError::Forbidden("claims carry no tenant audience".to_string()))
    }
}

pub fn ensure_admin(claims: &Claims) -> Result<(), RepositoryError> {
    ensure_audience(claims)?;
    if claims.is_admin() {
        Ok(())
    } else {
        Err(RepositoryError::Forbidden("admin role required".to_string()))
    }
}

/// The caller's subject as a user id, used as the sales rep on new records.
pub fn subject_id(claims: &Claims) -> Result<Uuid, RepositoryError> {
    claims
        .subject_id()
        .ok_or_else(|| RepositoryError::Forbidden("claims subject is not a user id".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(range(exclusive_min = 0.0))]
        amount: f64,
        #[validate(length(min = 1, message = "is required"))]
        name: String,
    }

    #[test]
    fn validator_errors_become_field_errors() {
        let sample = Sample { amount: 0.0, name: String::new() };
        let errors = FieldErrors::from(sample.validate().unwrap_err());
        assert!(errors.contains("amount"));
        assert!(errors.contains("name"));
        assert_eq!(errors.field_names(), "amount, name");
        assert_eq!(errors.into_map().get("name").map(String::as_str), Some("is required"));
    }

    #[test]
    fn truncates_to_millisecond_precision() {
        let t = DateTime::parse_from_rfc3339("2024-03-01T10:00:00.123456789Z").unwrap().with_timezone(&Utc);
        assert_eq!(truncate_millis(t).nanosecond(), 123_000_000);
    }

    #[test]
    fn audience_and_role_checks() {
        let mut claims = Claims::new(Uuid::new_v4().to_string(), "", &[Role::Admin], 1);
        assert!(matches!(ensure_audience(&claims), Err(RepositoryError::Forbidden(_))));

        claims.aud = "tenant-1".to_string();
        assert!(ensure_admin(&claims).is_ok());

        claims.roles = vec![Role::User.as_str().to_string()];
        assert!(matches!(ensure_admin(&claims), Err(RepositoryError::Forbidden(_))));
    }

    #[test]
    fn row_not_found_is_not_found() {
        assert!(matches!(RepositoryError::from(sqlx::Error::RowNotFound), RepositoryError::NotFound(_)));
    }
}
