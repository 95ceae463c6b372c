use chrono::{DateTime, Utc};
use sqlx::{self, postgres::PgRow, FromRow, PgPool};
use uuid::Uuid;

use crate::database::query_builder;
use crate::domain::RepositoryError;
use crate::filter::{Column, Filter};

/// Generic access to one soft-deletable table. Resource repositories build
/// their Find/Read/Archive/Delete on top of this.
pub struct Table<T> {
    name: &'static str,
    columns: &'static [Column],
    pool: PgPool,
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            columns: self.columns,
            pool: self.pool.clone(),
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T> Table<T>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    pub fn new(name: &'static str, columns: &'static [Column], pool: PgPool) -> Self {
        Self {
            name,
            columns,
            pool,
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn filter(&self) -> Filter<'static> {
        Filter::new(self.name, self.columns)
    }

    pub async fn select_any(&self, filter: &Filter<'_>) -> Result<Vec<T>, RepositoryError> {
        Ok(query_builder::select_all(&self.pool, &filter.to_sql()).await?)
    }

    pub async fn count(&self, filter: &Filter<'_>) -> Result<i64, RepositoryError> {
        Ok(query_builder::count(&self.pool, &filter.to_count_sql()).await?)
    }

    /// Fetch by id, archived or not. Missing rows are `NotFound`.
    pub async fn select_404(&self, id: Uuid) -> Result<T, RepositoryError> {
        let sql = format!("SELECT * FROM \"{}\" WHERE id = $1", self.name);
        sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("{} {} not found", self.singular(), id)))
    }

    /// Relation loading: every row whose id is in `ids`.
    pub async fn select_by_ids(&self, ids: &[Uuid]) -> Result<Vec<T>, RepositoryError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!("SELECT * FROM \"{}\" WHERE id = ANY($1)", self.name);
        Ok(sqlx::query_as::<_, T>(&sql).bind(ids).fetch_all(&self.pool).await?)
    }

    /// Sets `archived_at` once. Archiving an archived row succeeds and keeps
    /// the original timestamp.
    pub async fn archive(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let sql = format!(
            "UPDATE \"{}\" SET archived_at = $2, updated_at = $2 WHERE id = $1 AND archived_at IS NULL",
            self.name
        );
        let result = sqlx::query(&sql).bind(id).bind(now).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            self.ensure_exists(id).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let sql = format!("DELETE FROM \"{}\" WHERE id = $1", self.name);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("{} {} not found", self.singular(), id)));
        }
        Ok(())
    }

    pub async fn ensure_exists(&self, id: Uuid) -> Result<(), RepositoryError> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM \"{}\" WHERE id = $1)", self.name);
        let exists: bool = sqlx::query_scalar(&sql).bind(id).fetch_one(&self.pool).await?;
        if exists {
            Ok(())
        } else {
            Err(RepositoryError::NotFound(format!("{} {} not found", self.singular(), id)))
        }
    }

    fn singular(&self) -> &'static str {
        self.name.strip_suffix('s').unwrap_or(self.name)
    }
}
