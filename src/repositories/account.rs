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
use crate::database::models::{AccountRow, CustomerRow};
use crate::database::Table;
use crate::domain::account::{self, Account, AccountCreateRequest, AccountUpdateRequest};
use crate::domain::customer;
use crate::domain::{ensure_admin, ensure_audience, subject_id, truncate_millis, ArchiveRequest, DeleteRequest, RepositoryError};
use crate::filter::FindRequest;

/// Attempts at drawing an unused account number before giving up.
const NUMBER_ATTEMPTS: usize = 16;

pub struct AccountRepository {
    table: Table<AccountRow>,
    customers: Table<CustomerRow>,
    relations: Relations,
    filter_config: FilterConfig,
    create_lock: Mutex<()>,
}

impl AccountRepository {
    pub fn new(pool: PgPool, filter_config: FilterConfig) -> Self {
        Self {
            table: Table::new(account::TABLE, account::COLUMNS, pool.clone()),
            customers: Table::new(customer::TABLE, customer::COLUMNS, pool.clone()),
            relations: Relations::new(pool),
            filter_config,
            create_lock: Mutex::new(()),
        }
    }

    #[instrument(name = "account.find", skip_all)]
    pub async fn find(&self, _claims: &Claims, req: &FindRequest, include: Include) -> Result<Vec<Account>, RepositoryError> {
        let mut filter = self.table.filter();
        filter.assign(req, &self.filter_config)?;
        let rows = self.table.select_any(&filter).await?;
        let mut accounts = rows.into_iter().map(Account::try_from).collect::<Result<Vec<_>, _>>()?;
        self.attach(&mut accounts, include).await?;
        Ok(accounts)
    }

    #[instrument(name = "account.count", skip_all)]
    pub async fn count(&self, _claims: &Claims, req: &FindRequest) -> Result<i64, RepositoryError> {
        let mut filter = self.table.filter();
        filter.assign(req, &self.filter_config)?;
        self.table.count(&filter).await
    }

    #[instrument(name = "account.read", skip(self, _claims))]
    pub async fn read_by_id(&self, _claims: &Claims, id: Uuid) -> Result<Account, RepositoryError> {
        let mut accounts = vec![Account::try_from(self.table.select_404(id).await?)?];
        self.attach(&mut accounts, Include::default()).await?;
        accounts.pop().ok_or_else(|| RepositoryError::NotFound(format!("account {} not found", id)))
    }

    /// Live account by public number. Unknown numbers are `NotFound` here;
    /// deposit and transaction creation report them as `BadRequest`.
    #[instrument(name = "account.read_by_number", skip(self, _claims))]
    pub async fn read_by_number(&self, _claims: &Claims, number: &str) -> Result<Account, RepositoryError> {
        match Relations::account_by_number(self.table.pool(), number, false).await {
            Ok(account) => {
                let mut accounts = vec![account];
                self.attach(&mut accounts, Include::default()).await?;
                accounts
                    .pop()
                    .ok_or_else(|| RepositoryError::NotFound(format!("account {} not found", number)))
            }
            Err(RepositoryError::BadRequest(_)) => Err(RepositoryError::NotFound(format!("account {} not found", number))),
            Err(e) => Err(e),
        }
    }

    #[instrument(name = "account.create", skip(self, claims, req), fields(customer_id = %req.customer_id))]
    pub async fn create(&self, claims: &Claims, req: AccountCreateRequest, now: DateTime<Utc>) -> Result<Account, RepositoryError> {
        ensure_audience(claims)?;
        req.validate()?;
        let sales_rep_id = subject_id(claims)?;
        let now = truncate_millis(now);

        let customer = match self.customers.select_404(req.customer_id).await {
            Ok(row) if row.archived_at.is_none() => row,
            Ok(_) | Err(RepositoryError::NotFound(_)) => {
                return Err(RepositoryError::BadRequest(format!("customer {} does not exist", req.customer_id)))
            }
            Err(e) => return Err(e),
        };

        let _guard = self.create_lock.lock().await;
        let number = self.unused_number(req.account_type).await?;

        let row: AccountRow = sqlx::query_as(
            "INSERT INTO accounts (id, customer_id, number, account_type, balance, target, target_info, sales_rep_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, 0, $5, $6, $7, $8, $8) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(customer.id)
        .bind(&number)
        .bind(req.account_type.as_str())
        .bind(req.target)
        .bind(req.target_info.as_deref())
        .bind(sales_rep_id)
        .bind(now)
        .fetch_one(self.table.pool())
        .await?;

        counter!("accounts_created_total", 1, "type" => req.account_type.as_str());
        tracing::info!(account_id = %row.id, number = %row.number, "account opened");

        let mut account = Account::try_from(row)?;
        account.customer = Some(Box::new(customer.into()));
        account.sales_rep = self.relations.users([sales_rep_id]).await?.remove(&sales_rep_id);
        Ok(account)
    }

    async fn unused_number(&self, account_type: account::AccountType) -> Result<String, RepositoryError> {
        for _ in 0..NUMBER_ATTEMPTS {
            let number = account::generate_number(account_type, &mut rand::thread_rng());
            let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE number = $1)")
                .bind(&number)
                .fetch_one(self.table.pool())
                .await?;
            if !taken {
                return Ok(number);
            }
            tracing::debug!(%number, "account number taken, drawing again");
        }
        Err(RepositoryError::Internal("could not allocate an unused account number".to_string()))
    }

    #[instrument(name = "account.update", skip(self, claims, req), fields(id = %req.id))]
    pub async fn update(&self, claims: &Claims, req: AccountUpdateRequest, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        ensure_admin(claims)?;
        let id = req.id;
        let changes = req.into_changes()?;
        if changes.is_empty() {
            return Ok(());
        }

        let mut statement = UpdateStatement::new(account::TABLE, truncate_millis(now));
        if let Some(account_type) = changes.account_type {
            statement.set("account_type", account_type.as_str());
        }
        if let Some(target) = changes.target {
            statement.set("target", target);
        }
        if let Some(target_info) = changes.target_info {
            statement.set("target_info", target_info);
        }
        if statement.execute(id, self.table.pool()).await? == 0 {
            return Err(RepositoryError::NotFound(format!("account {} not found", id)));
        }
        counter!("accounts_updated_total", 1);
        Ok(())
    }

    #[instrument(name = "account.archive", skip(self, claims), fields(id = %req.id))]
    pub async fn archive(&self, claims: &Claims, req: ArchiveRequest, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        ensure_admin(claims)?;
        self.table.archive(req.id, truncate_millis(now)).await?;
        counter!("accounts_archived_total", 1);
        Ok(())
    }

    /// Fails with `BadRequest` while deposits or transactions still point at
    /// the account.
    #[instrument(name = "account.delete", skip(self, claims), fields(id = %req.id))]
    pub async fn delete(&self, claims: &Claims, req: DeleteRequest) -> Result<(), RepositoryError> {
        ensure_admin(claims)?;
        self.table.delete(req.id).await?;
        counter!("accounts_deleted_total", 1);
        Ok(())
    }

    async fn attach(&self, accounts: &mut [Account], include: Include) -> Result<(), RepositoryError> {
        if include.customer {
            let customers = self.relations.customers(accounts.iter().map(|a| a.customer_id)).await?;
            for a in accounts.iter_mut() {
                a.customer = customers.get(&a.customer_id).cloned().map(Box::new);
            }
        }
        if include.sales_rep {
            let users = self.relations.users(accounts.iter().map(|a| a.sales_rep_id)).await?;
            for a in accounts.iter_mut() {
                a.sales_rep = users.get(&a.sales_rep_id).cloned();
            }
        }
        Ok(())
    }
}
