//! Transactions move an account's balance, so every write here runs inside a
//! database transaction that locks the account row first. Lock order is
//! always account, then transaction rows.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::{Include, Relations};
use crate::auth::Claims;
use crate::config::FilterConfig;
use crate::database::models::{AccountRow, TransactionRow};
use crate::database::Table;
use crate::domain::account::{Account, AccountType};
use crate::domain::transaction::{
    self, generate_receipt_no, DepositTotals, PeriodStarts, Transaction, TransactionCreateRequest, TransactionType,
    TransactionUpdateRequest,
};
use crate::domain::{ensure_admin, ensure_audience, subject_id, truncate_millis, ArchiveRequest, DeleteRequest, RepositoryError};
use crate::filter::{Filter, FindRequest};

const RECEIPT_ATTEMPTS: usize = 16;

pub struct TransactionRepository {
    table: Table<TransactionRow>,
    relations: Relations,
    filter_config: FilterConfig,
    create_lock: Mutex<()>,
}

impl TransactionRepository {
    pub fn new(pool: PgPool, filter_config: FilterConfig) -> Self {
        Self {
            table: Table::new(transaction::TABLE, transaction::COLUMNS, pool.clone()),
            relations: Relations::new(pool),
            filter_config,
            create_lock: Mutex::new(()),
        }
    }

    fn pool(&self) -> &PgPool {
        self.table.pool()
    }

    /// Non-admin callers only ever see their own transactions.
    fn build_filter(&self, claims: &Claims, req: &FindRequest) -> Result<Filter<'static>, RepositoryError> {
        let mut filter = self.table.filter();
        filter.assign(req, &self.filter_config)?;
        if !claims.is_admin() {
            let subject = subject_id(claims)?;
            filter.and_equals("sales_rep_id", json!(subject.to_string()))?;
        }
        Ok(filter)
    }

    #[instrument(name = "transaction.find", skip_all, fields(subject = %claims.sub))]
    pub async fn find(&self, claims: &Claims, req: &FindRequest, include: Include) -> Result<Vec<Transaction>, RepositoryError> {
        let filter = self.build_filter(claims, req)?;
        let rows = self.table.select_any(&filter).await?;
        let mut txs = rows.into_iter().map(Transaction::try_from).collect::<Result<Vec<_>, _>>()?;
        self.attach(&mut txs, include).await?;
        Ok(txs)
    }

    #[instrument(name = "transaction.count", skip_all, fields(subject = %claims.sub))]
    pub async fn count(&self, claims: &Claims, req: &FindRequest) -> Result<i64, RepositoryError> {
        let filter = self.build_filter(claims, req)?;
        self.table.count(&filter).await
    }

    #[instrument(name = "transaction.read", skip(self, claims))]
    pub async fn read_by_id(&self, claims: &Claims, id: Uuid) -> Result<Transaction, RepositoryError> {
        let tx = Transaction::try_from(self.table.select_404(id).await?)?;
        if !claims.is_admin() && claims.subject_id() != Some(tx.sales_rep_id) {
            return Err(RepositoryError::NotFound(format!("transaction {} not found", id)));
        }
        let mut txs = vec![tx];
        self.attach(&mut txs, Include::default()).await?;
        txs.pop().ok_or_else(|| RepositoryError::NotFound(format!("transaction {} not found", id)))
    }

    #[instrument(
        name = "transaction.create",
        skip(self, claims, req),
        fields(account_number = %req.account_number, tx_type = req.tx_type.as_str())
    )]
    pub async fn create(
        &self,
        claims: &Claims,
        req: TransactionCreateRequest,
        now: DateTime<Utc>,
    ) -> Result<Transaction, RepositoryError> {
        ensure_audience(claims)?;
        req.validate()?;
        let sales_rep_id = subject_id(claims)?;
        let now = truncate_millis(now);
        let effective_date = truncate_millis(req.effective_date.unwrap_or(now));

        let _guard = self.create_lock.lock().await;
        let mut db_tx = self.pool().begin().await?;

        let mut account = Relations::account_by_number(&mut *db_tx, &req.account_number, true).await?;
        let opening_balance = account.balance;
        let signed = req.tx_type.signed(req.amount);
        if opening_balance + signed < 0.0 {
            return Err(RepositoryError::BadRequest("insufficient funds".to_string()));
        }

        // daily-savings deposits post one transaction per day paid for
        let postings: Vec<(f64, DateTime<Utc>, DateTime<Utc>)> =
            if req.tx_type == TransactionType::Deposit && account.account_type == AccountType::DailySavings {
                let days = transaction::daily_installments(req.amount, account.target)?;
                let last = last_deposit_date(&mut db_tx, account.id).await?;
                let first = transaction::first_installment_date(last, effective_date);
                let days = days as i64;
                // the last row is stamped `now`, earlier ones a millisecond apart
                (0..days)
                    .map(|i| (account.target, first + Duration::days(i), now - Duration::milliseconds(days - 1 - i)))
                    .collect()
            } else {
                vec![(req.amount, effective_date, now)]
            };

        let mut balance = opening_balance;
        let mut posted = None;
        for (amount, effective_date, created_at) in postings {
            let receipt_no = unused_receipt(&mut db_tx).await?;
            let row: TransactionRow = sqlx::query_as(
                "INSERT INTO transactions \
                 (id, account_id, tx_type, opening_balance, amount, narration, payment_method, sales_rep_id, receipt_no, effective_date, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(account.id)
            .bind(req.tx_type.as_str())
            .bind(balance)
            .bind(amount)
            .bind(req.narration.trim())
            .bind(req.payment_method.as_str())
            .bind(sales_rep_id)
            .bind(&receipt_no)
            .bind(effective_date)
            .bind(created_at)
            .fetch_one(&mut *db_tx)
            .await?;
            balance += req.tx_type.signed(amount);
            posted = Some(row);
        }
        let row = posted.ok_or_else(|| RepositoryError::Internal("no transaction was posted".to_string()))?;

        sqlx::query("UPDATE accounts SET balance = balance + $1, updated_at = GREATEST(updated_at, $2) WHERE id = $3")
            .bind(signed)
            .bind(row.created_at)
            .bind(account.id)
            .execute(&mut *db_tx)
            .await?;
        db_tx.commit().await?;

        counter!("transactions_created_total", 1, "type" => req.tx_type.as_str());
        tracing::info!(transaction_id = %row.id, receipt_no = %row.receipt_no, amount = req.amount, "transaction posted");

        account.balance = opening_balance + signed;
        let mut tx = Transaction::try_from(row)?;
        tx.account = Some(account);
        tx.sales_rep = self.relations.users([sales_rep_id]).await?.remove(&sales_rep_id);
        Ok(tx)
    }

    /// Live deposits taken since each period start. Non-admins only count
    /// their own.
    #[instrument(name = "transaction.deposit_totals", skip_all, fields(subject = %claims.sub))]
    pub async fn deposit_totals(
        &self,
        claims: &Claims,
        periods: PeriodStarts,
    ) -> Result<DepositTotals, RepositoryError> {
        let sales_rep = if claims.is_admin() { None } else { Some(subject_id(claims)?) };
        Ok(DepositTotals {
            today: self.deposit_total(sales_rep, periods.today).await?,
            this_week: self.deposit_total(sales_rep, periods.week).await?,
            this_month: self.deposit_total(sales_rep, periods.month).await?,
        })
    }

    async fn deposit_total(&self, sales_rep: Option<Uuid>, from: DateTime<Utc>) -> Result<f64, RepositoryError> {
        Ok(sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::float8 FROM transactions \
             WHERE tx_type = 'deposit' AND archived_at IS NULL AND created_at >= $1 \
             AND ($2::uuid IS NULL OR sales_rep_id = $2)",
        )
        .bind(from)
        .bind(sales_rep)
        .fetch_one(self.pool())
        .await?)
    }

    /// An amount change moves the balance by the signed difference and
    /// shifts the opening balance of every later live transaction.
    #[instrument(name = "transaction.update", skip(self, claims, req), fields(id = %req.id))]
    pub async fn update(&self, claims: &Claims, req: TransactionUpdateRequest, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        ensure_admin(claims)?;
        let id = req.id;
        let changes = req.into_changes()?;
        if changes.is_empty() {
            return Ok(());
        }
        let now = truncate_millis(now);

        let mut db_tx = self.pool().begin().await?;
        let not_found = || RepositoryError::NotFound(format!("transaction {} not found", id));
        let account = lock_account_of(&mut db_tx, id).await?.ok_or_else(not_found)?;
        let current = live_row(&mut db_tx, id).await?.ok_or_else(not_found)?;
        let current = Transaction::try_from(current)?;

        if let Some(amount) = changes.amount {
            let delta = current.tx_type.signed(amount) - current.signed_amount();
            if account.balance + delta < 0.0 {
                return Err(RepositoryError::BadRequest("insufficient funds".to_string()));
            }
            shift_from(&mut db_tx, &current, delta, now).await?;
        }

        sqlx::query(
            "UPDATE transactions SET amount = COALESCE($2, amount), narration = COALESCE($3, narration), \
             updated_at = GREATEST(updated_at, $4) WHERE id = $1",
        )
        .bind(id)
        .bind(changes.amount)
        .bind(changes.narration)
        .bind(now)
        .execute(&mut *db_tx)
        .await?;
        db_tx.commit().await?;

        counter!("transactions_updated_total", 1);
        Ok(())
    }

    /// The first archive reverses the transaction's effect; later calls are
    /// no-ops.
    #[instrument(name = "transaction.archive", skip(self, claims), fields(id = %req.id))]
    pub async fn archive(&self, claims: &Claims, req: ArchiveRequest, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        ensure_admin(claims)?;
        let now = truncate_millis(now);

        let mut db_tx = self.pool().begin().await?;
        let account = lock_account_of(&mut db_tx, req.id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {} not found", req.id)))?;

        let archived: Option<TransactionRow> = sqlx::query_as(
            "UPDATE transactions SET archived_at = $2, updated_at = $2 WHERE id = $1 AND archived_at IS NULL RETURNING *",
        )
        .bind(req.id)
        .bind(now)
        .fetch_optional(&mut *db_tx)
        .await?;

        if let Some(row) = archived {
            let tx = Transaction::try_from(row)?;
            reverse(&mut db_tx, &account, &tx, now).await?;
            counter!("transactions_archived_total", 1);
        }
        db_tx.commit().await?;
        Ok(())
    }

    #[instrument(name = "transaction.delete", skip(self, claims), fields(id = %req.id))]
    pub async fn delete(&self, claims: &Claims, req: DeleteRequest) -> Result<(), RepositoryError> {
        ensure_admin(claims)?;
        let now = truncate_millis(Utc::now());

        let mut db_tx = self.pool().begin().await?;
        let not_found = || RepositoryError::NotFound(format!("transaction {} not found", req.id));
        let account = lock_account_of(&mut db_tx, req.id).await?.ok_or_else(not_found)?;

        let deleted: TransactionRow = sqlx::query_as("DELETE FROM transactions WHERE id = $1 RETURNING *")
            .bind(req.id)
            .fetch_optional(&mut *db_tx)
            .await?
            .ok_or_else(not_found)?;

        let tx = Transaction::try_from(deleted)?;
        if tx.archived_at.is_none() {
            reverse(&mut db_tx, &account, &tx, now).await?;
        }
        db_tx.commit().await?;

        counter!("transactions_deleted_total", 1);
        Ok(())
    }

    async fn attach(&self, txs: &mut [Transaction], include: Include) -> Result<(), RepositoryError> {
        if include.account {
            let accounts = self.relations.accounts(txs.iter().map(|t| t.account_id)).await?;
            for t in txs.iter_mut() {
                t.account = accounts.get(&t.account_id).cloned();
            }
        }
        if include.sales_rep {
            let users = self.relations.users(txs.iter().map(|t| t.sales_rep_id)).await?;
            for t in txs.iter_mut() {
                t.sales_rep = users.get(&t.sales_rep_id).cloned();
            }
        }
        Ok(())
    }
}

async fn unused_receipt(conn: &mut PgConnection) -> Result<String, RepositoryError> {
    for _ in 0..RECEIPT_ATTEMPTS {
        let receipt = generate_receipt_no(&mut rand::thread_rng());
        let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM transactions WHERE receipt_no = $1)")
            .bind(&receipt)
            .fetch_one(&mut *conn)
            .await?;
        if !taken {
            return Ok(receipt);
        }
    }
    Err(RepositoryError::Internal("could not allocate an unused receipt number".to_string()))
}

async fn last_deposit_date(conn: &mut PgConnection, account_id: Uuid) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    Ok(sqlx::query_scalar(
        "SELECT max(effective_date) FROM transactions WHERE account_id = $1 AND tx_type = 'deposit' AND archived_at IS NULL",
    )
    .bind(account_id)
    .fetch_one(&mut *conn)
    .await?)
}

/// Locks the account owning transaction `id`. `None` when the transaction
/// does not exist.
async fn lock_account_of(conn: &mut PgConnection, id: Uuid) -> Result<Option<Account>, RepositoryError> {
    let row: Option<AccountRow> = sqlx::query_as(
        "SELECT a.* FROM accounts a JOIN transactions t ON t.account_id = a.id WHERE t.id = $1 FOR UPDATE OF a",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(Account::try_from).transpose()
}

async fn live_row(conn: &mut PgConnection, id: Uuid) -> Result<Option<TransactionRow>, RepositoryError> {
    Ok(
        sqlx::query_as("SELECT * FROM transactions WHERE id = $1 AND archived_at IS NULL FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?,
    )
}

/// Undo `tx` on the account balance and on the opening balance of later
/// transactions.
async fn reverse(conn: &mut PgConnection, account: &Account, tx: &Transaction, now: DateTime<Utc>) -> Result<(), RepositoryError> {
    let delta = -tx.signed_amount();
    if account.balance + delta < 0.0 {
        return Err(RepositoryError::BadRequest(
            "insufficient funds to reverse this transaction".to_string(),
        ));
    }
    shift_from(conn, tx, delta, now).await
}

async fn shift_from(conn: &mut PgConnection, tx: &Transaction, delta: f64, now: DateTime<Utc>) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE accounts SET balance = balance + $1, updated_at = GREATEST(updated_at, $2) WHERE id = $3")
        .bind(delta)
        .bind(now)
        .bind(tx.account_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "UPDATE transactions SET opening_balance = opening_balance + $1 \
         WHERE account_id = $2 AND archived_at IS NULL AND (created_at, id) > ($3, $4)",
    )
    .bind(delta)
    .bind(tx.account_id)
    .bind(tx.created_at)
    .bind(tx.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

