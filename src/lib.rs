pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod repositories;
pub mod routes;
pub mod state;

pub use routes::app;
pub use state::AppState;
