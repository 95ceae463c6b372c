//! Per-resource data access. Every operation takes the caller's claims
//! explicitly and returns a `RepositoryError` cause for the handler to map.

pub mod account;
pub mod customer;
pub mod deposit;
pub mod transaction;
pub mod user;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::config::FilterConfig;
use crate::database::models::{AccountRow, CustomerRow, UserRow};
use crate::database::Table;
use crate::domain::account::{self as account_domain, Account};
use crate::domain::customer::{self as customer_domain, Customer};
use crate::domain::user::{self as user_domain, User};
use crate::domain::RepositoryError;

pub use account::AccountRepository;
pub use customer::CustomerRepository;
pub use deposit::DepositRepository;
pub use transaction::TransactionRepository;
pub use user::UserRepository;

/// Which relations a Find/Read should attach. Everything by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Include {
    pub account: bool,
    pub customer: bool,
    pub sales_rep: bool,
}

impl Default for Include {
    fn default() -> Self {
        Self {
            account: true,
            customer: true,
            sales_rep: true,
        }
    }
}

impl Include {
    pub fn none() -> Self {
        Self {
            account: false,
            customer: false,
            sales_rep: false,
        }
    }
}

/// All repositories over one pool.
#[derive(Clone)]
pub struct Repositories {
    pub customers: std::sync::Arc<CustomerRepository>,
    pub accounts: std::sync::Arc<AccountRepository>,
    pub deposits: std::sync::Arc<DepositRepository>,
    pub transactions: std::sync::Arc<TransactionRepository>,
    pub users: std::sync::Arc<UserRepository>,
}

impl Repositories {
    pub fn new(pool: PgPool, filter: FilterConfig) -> Self {
        Self {
            customers: std::sync::Arc::new(CustomerRepository::new(pool.clone(), filter.clone())),
            accounts: std::sync::Arc::new(AccountRepository::new(pool.clone(), filter.clone())),
            deposits: std::sync::Arc::new(DepositRepository::new(pool.clone(), filter.clone())),
            transactions: std::sync::Arc::new(TransactionRepository::new(pool.clone(), filter.clone())),
            users: std::sync::Arc::new(UserRepository::new(pool, filter)),
        }
    }
}

/// Second-query relation loading keyed by id.
#[derive(Clone)]
pub(crate) struct Relations {
    users: Table<UserRow>,
    accounts: Table<AccountRow>,
    customers: Table<CustomerRow>,
}

impl Relations {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: Table::new(user_domain::TABLE, user_domain::COLUMNS, pool.clone()),
            accounts: Table::new(account_domain::TABLE, account_domain::COLUMNS, pool.clone()),
            customers: Table::new(customer_domain::TABLE, customer_domain::COLUMNS, pool),
        }
    }

    pub async fn users(&self, ids: impl IntoIterator<Item = Uuid>) -> Result<HashMap<Uuid, User>, RepositoryError> {
        let rows = self.users.select_by_ids(&distinct(ids)).await?;
        Ok(rows.into_iter().map(|r| (r.id, User::from(r))).collect())
    }

    pub async fn accounts(&self, ids: impl IntoIterator<Item = Uuid>) -> Result<HashMap<Uuid, Account>, RepositoryError> {
        let rows = self.accounts.select_by_ids(&distinct(ids)).await?;
        rows.into_iter()
            .map(|r| Account::try_from(r).map(|a| (a.id, a)))
            .collect()
    }

    pub async fn customers(&self, ids: impl IntoIterator<Item = Uuid>) -> Result<HashMap<Uuid, Customer>, RepositoryError> {
        let rows = self.customers.select_by_ids(&distinct(ids)).await?;
        Ok(rows.into_iter().map(|r| (r.id, Customer::from(r))).collect())
    }

    /// Live accounts grouped by owning customer.
    pub async fn accounts_by_customer(
        &self,
        customer_ids: impl IntoIterator<Item = Uuid>,
    ) -> Result<HashMap<Uuid, Vec<Account>>, RepositoryError> {
        let ids = distinct(customer_ids);
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<AccountRow> = sqlx::query_as(
            "SELECT * FROM accounts WHERE customer_id = ANY($1) AND archived_at IS NULL ORDER BY created_at",
        )
        .bind(&ids)
        .fetch_all(self.accounts.pool())
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Account>> = HashMap::new();
        for row in rows {
            let account = Account::try_from(row)?;
            grouped.entry(account.customer_id).or_default().push(account);
        }
        Ok(grouped)
    }

    /// Live account by its public number; `BadRequest` when there is none.
    pub async fn account_by_number<'e, E>(executor: E, number: &str, lock: bool) -> Result<Account, RepositoryError>
    where
        E: PgExecutor<'e>,
    {
        let sql = if lock {
            "SELECT * FROM accounts WHERE number = $1 AND archived_at IS NULL FOR UPDATE"
        } else {
            "SELECT * FROM accounts WHERE number = $1 AND archived_at IS NULL"
        };
        let row: Option<AccountRow> = sqlx::query_as(sql).bind(number.trim()).fetch_optional(executor).await?;
        match row {
            Some(row) => Account::try_from(row),
            None => Err(RepositoryError::BadRequest(format!("invalid account number '{}'", number))),
        }
    }
}

fn distinct(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    ids.into_iter().collect::<HashSet<_>>().into_iter().collect()
}

/// `UPDATE <table> SET updated_at = GREATEST(updated_at, now), ...` for live
/// rows only.
pub(crate) struct UpdateStatement<'a> {
    builder: QueryBuilder<'a, Postgres>,
}

impl<'a> UpdateStatement<'a> {
    pub fn new(table: &'static str, now: DateTime<Utc>) -> Self {
        let mut builder = QueryBuilder::new(format!("UPDATE \"{}\" SET updated_at = GREATEST(updated_at, ", table));
        builder.push_bind(now);
        builder.push(")");
        Self { builder }
    }

    pub fn set<T>(&mut self, column: &'static str, value: T) -> &mut Self
    where
        T: 'a + sqlx::Encode<'a, Postgres> + sqlx::Type<Postgres> + Send,
    {
        self.builder.push(format!(", \"{}\" = ", column));
        self.builder.push_bind(value);
        self
    }

    /// Rows affected; zero when the id is unknown or archived.
    pub async fn execute<'e, E>(mut self, id: Uuid, executor: E) -> Result<u64, RepositoryError>
    where
        E: PgExecutor<'e>,
    {
        self.builder.push(" WHERE id = ");
        self.builder.push_bind(id);
        self.builder.push(" AND archived_at IS NULL");
        let result = self.builder.build().execute(executor).await?;
        Ok(result.rows_affected())
    }
}
