use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use crate::api::format::TimeContext;
use crate::auth::{Authenticator, JwtError};
use crate::config::AppConfig;
use crate::repositories::Repositories;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub authenticator: Arc<Authenticator>,
    pub repos: Repositories,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig) -> Result<Self, JwtError> {
        let authenticator = Authenticator::new(&config.security.jwt_secret)?;
        let repos = Repositories::new(pool.clone(), config.filter.clone());
        Ok(Self {
            pool,
            config: Arc::new(config),
            authenticator: Arc::new(authenticator),
            repos,
        })
    }

    /// Time rendering context for one response.
    pub fn time_context(&self) -> TimeContext {
        TimeContext::new(self.config.api.display_utc_offset_minutes, Utc::now())
    }
}
