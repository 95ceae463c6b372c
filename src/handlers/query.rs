use std::collections::HashMap;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};

use crate::error::ApiError;
use crate::filter::{FilterWhere, FindRequest};
use crate::repositories::Include;

pub const DEFAULT_ORDER: &str = "created_at desc";

/// Query string of a list endpoint, already split into the repository
/// envelope, relation flags and the free-text search term.
#[derive(Debug, Clone, PartialEq)]
pub struct FindParams {
    pub request: FindRequest,
    pub include: Include,
    pub search: Option<String>,
}

impl FindParams {
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, ApiError> {
        let mut request = FindRequest {
            limit: parse_int(params, "limit")?,
            offset: parse_int(params, "offset")?,
            include_archived: parse_bool(params, "include-archived")?.unwrap_or(false),
            ..Default::default()
        };

        if let Some(expression) = params.get("where").filter(|w| !w.trim().is_empty()) {
            let (clause, args) = FilterWhere::extract_args(expression).map_err(|e| ApiError::bad_request(e.to_string()))?;
            request.where_clause = Some(clause);
            request.args = args;
        }

        let order = params.get("order").map(String::as_str).filter(|o| !o.trim().is_empty()).unwrap_or(DEFAULT_ORDER);
        request.order = order
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let include = Include {
            account: parse_bool(params, "include-account")?.unwrap_or(true),
            customer: parse_bool(params, "include-customer")?.unwrap_or(true),
            sales_rep: parse_bool(params, "include-sales-rep")?.unwrap_or(true),
        };

        let search = params.get("search").map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        Ok(Self { request, include, search })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for FindParams
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        Self::from_query(&params)
    }
}

fn parse_int(params: &HashMap<String, String>, name: &str) -> Result<Option<i64>, ApiError> {
    match params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("unable to parse '{}' as integer for {} param", raw, name))),
    }
}

fn parse_bool(params: &HashMap<String, String>, name: &str) -> Result<Option<bool>, ApiError> {
    match params.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(raw) => match raw.as_str() {
            "" | "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            _ => Err(ApiError::bad_request(format!("unable to parse '{}' as boolean for {} param", raw, name))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_to_newest_first_with_relations() {
        let params = FindParams::from_query(&HashMap::new()).unwrap();
        assert_eq!(params.request.order, vec!["created_at desc".to_string()]);
        assert_eq!(params.request.limit, None);
        assert!(!params.request.include_archived);
        assert_eq!(params.include, Include::default());
        assert!(params.search.is_none());
    }

    #[test]
    fn inline_literals_become_args() {
        let params = FindParams::from_query(&query(&[("where", "amount > 1000"), ("limit", "10"), ("offset", "0")])).unwrap();
        assert_eq!(params.request.where_clause.as_deref(), Some("amount > ?"));
        assert_eq!(params.request.args, vec![json!(1000)]);
        assert_eq!(params.request.limit, Some(10));
        assert_eq!(params.request.offset, Some(0));
    }

    #[test]
    fn bad_numbers_and_flags_are_bad_requests() {
        let err = FindParams::from_query(&query(&[("limit", "ten")])).unwrap_err();
        assert_eq!(err.message(), "unable to parse 'ten' as integer for limit param");

        let err = FindParams::from_query(&query(&[("include-archived", "maybe")])).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn relation_flags_and_multi_column_order() {
        let params = FindParams::from_query(&query(&[
            ("include-sales-rep", "false"),
            ("order", "amount desc, created_at"),
            ("search", "  ada "),
        ]))
        .unwrap();
        assert!(!params.include.sales_rep);
        assert!(params.include.account);
        assert_eq!(params.request.order, vec!["amount desc".to_string(), "created_at".to_string()]);
        assert_eq!(params.search.as_deref(), Some("ada"));
    }
}
