use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::Claims;
use crate::config::FilterConfig;
use crate::database::models::UserRow;
use crate::database::Table;
use crate::domain::user::{self, User};
use crate::domain::RepositoryError;
use crate::filter::FindRequest;

/// Read-only view of the sales rep directory.
pub struct UserRepository {
    table: Table<UserRow>,
    filter_config: FilterConfig,
}

impl UserRepository {
    pub fn new(pool: PgPool, filter_config: FilterConfig) -> Self {
        Self {
            table: Table::new(user::TABLE, user::COLUMNS, pool),
            filter_config,
        }
    }

    #[instrument(name = "user.find", skip_all)]
    pub async fn find(&self, _claims: &Claims, req: &FindRequest) -> Result<Vec<User>, RepositoryError> {
        let mut filter = self.table.filter();
        filter.assign(req, &self.filter_config)?;
        let rows = self.table.select_any(&filter).await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    #[instrument(name = "user.count", skip_all)]
    pub async fn count(&self, _claims: &Claims, req: &FindRequest) -> Result<i64, RepositoryError> {
        let mut filter = self.table.filter();
        filter.assign(req, &self.filter_config)?;
        self.table.count(&filter).await
    }

    #[instrument(name = "user.read", skip(self, _claims))]
    pub async fn read_by_id(&self, _claims: &Claims, id: Uuid) -> Result<User, RepositoryError> {
        self.table.select_404(id).await.map(User::from)
    }
}
