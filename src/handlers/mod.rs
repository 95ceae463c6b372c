//! HTTP handlers, one module per resource.
//!
//! Every handler takes `Claims` explicitly (see `extract`), hands the decoded
//! request to its repository and maps the result through the resource's
//! response mapper. Repository failures become `ApiError`s via
//! `ApiError::from_repository`, tagged with the operation and id.

pub mod accounts;
pub mod customers;
pub mod deposits;
pub mod extract;
pub mod health;
pub mod query;
pub mod transactions;
pub mod users;

pub use extract::JsonBody;
pub use query::FindParams;
