use chrono::{DateTime, Utc};
use metrics::counter;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::{Include, Relations, UpdateStatement};
use crate::auth::Claims;
use crate::config::FilterConfig;
use crate::database::models::DepositRow;
use crate::database::Table;
use crate::domain::deposit::{self, Deposit, DepositCreateRequest, DepositUpdateRequest};
use crate::domain::{ensure_admin, ensure_audience, subject_id, truncate_millis, ArchiveRequest, DeleteRequest, RepositoryError};
use crate::filter::FindRequest;

pub struct DepositRepository {
    table: Table<DepositRow>,
    relations: Relations,
    filter_config: FilterConfig,
    create_lock: Mutex<()>,
}

impl DepositRepository {
    pub fn new(pool: PgPool, filter_config: FilterConfig) -> Self {
        Self {
            table: Table::new(deposit::TABLE, deposit::COLUMNS, pool.clone()),
            relations: Relations::new(pool),
            filter_config,
            create_lock: Mutex::new(()),
        }
    }

    #[instrument(name = "deposit.find", skip_all)]
    pub async fn find(&self, _claims: &Claims, req: &FindRequest, include: Include) -> Result<Vec<Deposit>, RepositoryError> {
        let mut filter = self.table.filter();
        filter.assign(req, &self.filter_config)?;
        let rows = self.table.select_any(&filter).await?;
        let mut deposits: Vec<Deposit> = rows.into_iter().map(Deposit::from).collect();
        self.attach(&mut deposits, include).await?;
        Ok(deposits)
    }

    #[instrument(name = "deposit.count", skip_all)]
    pub async fn count(&self, _claims: &Claims, req: &FindRequest) -> Result<i64, RepositoryError> {
        let mut filter = self.table.filter();
        filter.assign(req, &self.filter_config)?;
        self.table.count(&filter).await
    }

    #[instrument(name = "deposit.read", skip(self, _claims))]
    pub async fn read_by_id(&self, _claims: &Claims, id: Uuid) -> Result<Deposit, RepositoryError> {
        let mut deposits = vec![Deposit::from(self.table.select_404(id).await?)];
        self.attach(&mut deposits, Include::default()).await?;
        deposits.pop().ok_or_else(|| RepositoryError::NotFound(format!("deposit {} not found", id)))
    }

    #[instrument(name = "deposit.create", skip(self, claims, req), fields(account_number = %req.account_number))]
    pub async fn create(&self, claims: &Claims, req: DepositCreateRequest, now: DateTime<Utc>) -> Result<Deposit, RepositoryError> {
        ensure_audience(claims)?;
        req.validate()?;
        let sales_rep_id = subject_id(claims)?;
        let now = truncate_millis(now);

        let _guard = self.create_lock.lock().await;
        let account = Relations::account_by_number(self.table.pool(), &req.account_number, false).await?;

        let row: DepositRow = sqlx::query_as(
            "INSERT INTO deposits (id, account_id, amount, narration, sales_rep_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(account.id)
        .bind(req.amount)
        .bind(req.narration.trim())
        .bind(sales_rep_id)
        .bind(now)
        .fetch_one(self.table.pool())
        .await?;

        counter!("deposits_created_total", 1);
        tracing::info!(deposit_id = %row.id, account_id = %account.id, amount = row.amount, "deposit recorded");

        let mut deposit = Deposit::from(row);
        deposit.account = Some(account);
        deposit.sales_rep = self.relations.users([sales_rep_id]).await?.remove(&sales_rep_id);
        Ok(deposit)
    }

    #[instrument(name = "deposit.update", skip(self, claims, req), fields(id = %req.id))]
    pub async fn update(&self, claims: &Claims, req: DepositUpdateRequest, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        ensure_admin(claims)?;
        let id = req.id;
        let changes = req.into_changes()?;
        if changes.is_empty() {
            return Ok(());
        }

        let mut statement = UpdateStatement::new(deposit::TABLE, truncate_millis(now));
        if let Some(amount) = changes.amount {
            statement.set("amount", amount);
        }
        if let Some(narration) = changes.narration {
            statement.set("narration", narration);
        }
        if statement.execute(id, self.table.pool()).await? == 0 {
            return Err(RepositoryError::NotFound(format!("deposit {} not found", id)));
        }
        counter!("deposits_updated_total", 1);
        Ok(())
    }

    #[instrument(name = "deposit.archive", skip(self, claims), fields(id = %req.id))]
    pub async fn archive(&self, claims: &Claims, req: ArchiveRequest, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        ensure_admin(claims)?;
        self.table.archive(req.id, truncate_millis(now)).await?;
        counter!("deposits_archived_total", 1);
        Ok(())
    }

    #[instrument(name = "deposit.delete", skip(self, claims), fields(id = %req.id))]
    pub async fn delete(&self, claims: &Claims, req: DeleteRequest) -> Result<(), RepositoryError> {
        ensure_admin(claims)?;
        self.table.delete(req.id).await?;
        counter!("deposits_deleted_total", 1);
        Ok(())
    }

    async fn attach(&self, deposits: &mut [Deposit], include: Include) -> Result<(), RepositoryError> {
        if include.account {
            let accounts = self.relations.accounts(deposits.iter().map(|d| d.account_id)).await?;
            for d in deposits.iter_mut() {
                d.account = accounts.get(&d.account_id).cloned();
            }
        }
        if include.sales_rep {
            let users = self.relations.users(deposits.iter().map(|d| d.sales_rep_id)).await?;
            for d in deposits.iter_mut() {
                d.sales_rep = users.get(&d.sales_rep_id).cloned();
            }
        }
        Ok(())
    }
}
