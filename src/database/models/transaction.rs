use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub tx_type: String,
    pub opening_balance: f64,
    pub amount: f64,
    pub narration: String,
    pub payment_method: String,
    pub sales_rep_id: Uuid,
    pub receipt_no: String,
    pub effective_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}
