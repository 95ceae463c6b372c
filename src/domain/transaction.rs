use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::account::Account;
use super::user::{self, User};
use super::{FieldErrors, FieldUpdate, RepositoryError};
use crate::api::format::{TimeContext, TimeResponse};
use crate::database::models::TransactionRow;
use crate::filter::Column;

pub const TABLE: &str = "transactions";

pub const COLUMNS: &[Column] = &[
    Column::uuid("id"),
    Column::uuid("account_id"),
    Column::text("tx_type"),
    Column::float("opening_balance"),
    Column::float("amount"),
    Column::text("narration"),
    Column::text("payment_method"),
    Column::uuid("sales_rep_id"),
    Column::text("receipt_no"),
    Column::timestamp("effective_date"),
    Column::timestamp("created_at"),
    Column::timestamp("updated_at"),
    Column::timestamp("archived_at"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(TransactionType::Deposit),
            "withdrawal" => Some(TransactionType::Withdrawal),
            _ => None,
        }
    }

    /// Effect of `amount` on the account balance.
    pub fn signed(&self, amount: f64) -> f64 {
        match self {
            TransactionType::Deposit => amount,
            TransactionType::Withdrawal => -amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    BankDeposit,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankDeposit => "bank_deposit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "bank_deposit" => Some(PaymentMethod::BankDeposit),
            _ => None,
        }
    }
}

/// `TX` + six digits.
pub fn generate_receipt_no<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("TX{:06}", rng.gen_range(0..1_000_000u32))
}

/// Most days one daily-savings deposit may pay for.
pub const MAX_DAILY_INSTALLMENTS: usize = 50;

/// Number of days `amount` pays for on a daily-savings account whose daily
/// contribution is `target`. The amount must be a whole number of days.
pub fn daily_installments(amount: f64, target: f64) -> Result<usize, RepositoryError> {
    if target <= 0.0 || !target.is_finite() {
        return Err(RepositoryError::BadRequest(
            "daily savings account has no daily target".to_string(),
        ));
    }
    let days = amount / target;
    let whole = days.round();
    if whole < 1.0 || (days - whole).abs() > 1e-9 * whole {
        return Err(RepositoryError::BadRequest(format!("amount must be a multiple of {:.2}", target)));
    }
    if whole > MAX_DAILY_INSTALLMENTS as f64 {
        return Err(RepositoryError::BadRequest(format!(
            "pay for at most {} days at a time, one day is {:.2}",
            MAX_DAILY_INSTALLMENTS, target
        )));
    }
    Ok(whole as usize)
}

/// Day covered by the first installment of a new daily-savings deposit: the
/// day after the latest live deposit, or the requested day when there is none.
pub fn first_installment_date(last_deposit: Option<DateTime<Utc>>, requested: DateTime<Utc>) -> DateTime<Utc> {
    match last_deposit {
        Some(last) => last + Duration::days(1),
        None => midnight(requested.date_naive(), &Utc, requested),
    }
}

fn midnight<Tz: TimeZone>(day: NaiveDate, tz: &Tz, fallback: DateTime<Utc>) -> DateTime<Utc> {
    tz.from_local_datetime(&day.and_time(NaiveTime::default()))
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(fallback)
}

/// Starts of the current day, week (from Sunday) and month in the display
/// offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodStarts {
    pub today: DateTime<Utc>,
    pub week: DateTime<Utc>,
    pub month: DateTime<Utc>,
}

impl PeriodStarts {
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let day = now.with_timezone(&offset).date_naive();
        let week = day - Duration::days(i64::from(day.weekday().num_days_from_sunday()));
        let month = day.with_day(1).unwrap_or(day);
        Self {
            today: midnight(day, &offset, now),
            week: midnight(week, &offset, now),
            month: midnight(month, &offset, now),
        }
    }
}

/// Live deposit amounts taken since each period start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DepositTotals {
    pub today: f64,
    pub this_week: f64,
    pub this_month: f64,
}

/// A balance-changing movement on an account.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub tx_type: TransactionType,
    pub opening_balance: f64,
    pub amount: f64,
    pub narration: String,
    pub payment_method: PaymentMethod,
    pub sales_rep_id: Uuid,
    pub receipt_no: String,
    pub effective_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,

    pub account: Option<Account>,
    pub sales_rep: Option<User>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = RepositoryError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let tx_type = TransactionType::parse(&row.tx_type)
            .ok_or_else(|| RepositoryError::Internal(format!("transaction {} has unknown type '{}'", row.id, row.tx_type)))?;
        let payment_method = PaymentMethod::parse(&row.payment_method).ok_or_else(|| {
            RepositoryError::Internal(format!("transaction {} has unknown payment method '{}'", row.id, row.payment_method))
        })?;
        Ok(Self {
            id: row.id,
            account_id: row.account_id,
            tx_type,
            opening_balance: row.opening_balance,
            amount: row.amount,
            narration: row.narration,
            payment_method,
            sales_rep_id: row.sales_rep_id,
            receipt_no: row.receipt_no,
            effective_date: row.effective_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            archived_at: row.archived_at,
            account: None,
            sales_rep: None,
        })
    }
}

impl Transaction {
    pub fn signed_amount(&self) -> f64 {
        self.tx_type.signed(self.amount)
    }

    pub fn closing_balance(&self) -> f64 {
        self.opening_balance + self.signed_amount()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransactionCreateRequest {
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub account_number: String,
    #[serde(default)]
    #[validate(range(exclusive_min = 0.0, message = "must be greater than zero"))]
    pub amount: f64,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub narration: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub effective_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionUpdateRequest {
    pub id: Uuid,
    #[serde(default)]
    pub amount: FieldUpdate<f64>,
    #[serde(default)]
    pub narration: FieldUpdate<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionChanges {
    pub amount: Option<f64>,
    pub narration: Option<String>,
}

impl TransactionChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl TransactionUpdateRequest {
    pub fn into_changes(self) -> Result<TransactionChanges, RepositoryError> {
        let mut errors = FieldErrors::default();
        let amount = self.amount.into_required("amount", &mut errors);
        if amount.is_some_and(|a| a <= 0.0 || !a.is_finite()) {
            errors.add("amount", "must be greater than zero");
        }
        errors.into_result()?;

        Ok(TransactionChanges {
            amount,
            narration: self.narration.into_nullable().map(Option::unwrap_or_default),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub account_id: String,
    pub account_number: String,
    pub customer_id: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub opening_balance: f64,
    pub amount: f64,
    pub closing_balance: f64,
    pub narration: String,
    pub payment_method: PaymentMethod,
    pub receipt_no: String,
    pub sales_rep_id: String,
    pub sales_rep: String,
    pub effective_date: TimeResponse,
    pub created_at: TimeResponse,
    pub updated_at: TimeResponse,
    pub archived_at: Option<TimeResponse>,
}

impl Transaction {
    pub fn response(&self, tc: &TimeContext) -> TransactionResponse {
        TransactionResponse {
            id: self.id.to_string(),
            account_id: self.account_id.to_string(),
            account_number: self.account.as_ref().map(|a| a.number.clone()).unwrap_or_default(),
            customer_id: self.account.as_ref().map(|a| a.customer_id.to_string()).unwrap_or_default(),
            tx_type: self.tx_type,
            opening_balance: self.opening_balance,
            amount: self.amount,
            closing_balance: self.closing_balance(),
            narration: self.narration.clone(),
            payment_method: self.payment_method,
            receipt_no: self.receipt_no.clone(),
            sales_rep_id: self.sales_rep_id.to_string(),
            sales_rep: user::display_name(self.sales_rep.as_ref()),
            effective_date: tc.format(self.effective_date),
            created_at: tc.format(self.created_at),
            updated_at: tc.format(self.updated_at),
            archived_at: tc.format_opt(self.archived_at),
        }
    }
}

impl TransactionResponse {
    pub fn from_domain(tx: Option<&Transaction>, tc: &TimeContext) -> Option<Self> {
        tx.map(|t| t.response(tc))
    }

    pub fn list(txs: &[Transaction], tc: &TimeContext) -> Vec<Self> {
        txs.iter().map(|t| t.response(tc)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn receipts_are_tx_plus_six_digits() {
        let mut rng = StdRng::seed_from_u64(42);
        let receipt = generate_receipt_no(&mut rng);
        assert_eq!(receipt.len(), 8);
        assert!(receipt.starts_with("TX"));
    }

    #[test]
    fn withdrawals_reduce_the_balance() {
        assert_eq!(TransactionType::Withdrawal.signed(20.0), -20.0);
        assert_eq!(TransactionType::Deposit.signed(20.0), 20.0);
    }

    #[test]
    fn daily_deposits_split_into_whole_days() {
        assert_eq!(daily_installments(300.0, 100.0).unwrap(), 3);
        assert_eq!(daily_installments(0.3, 0.1).unwrap(), 3);
        assert_eq!(daily_installments(5000.0, 100.0).unwrap(), MAX_DAILY_INSTALLMENTS);

        let err = daily_installments(150.0, 100.0).unwrap_err();
        assert!(matches!(err, RepositoryError::BadRequest(ref m) if m == "amount must be a multiple of 100.00"));
        assert!(daily_installments(50.0, 100.0).is_err());
        assert!(daily_installments(100.0, 0.0).is_err());

        let err = daily_installments(5100.0, 100.0).unwrap_err();
        assert!(matches!(err, RepositoryError::BadRequest(ref m) if m == "pay for at most 50 days at a time, one day is 100.00"));
    }

    #[test]
    fn first_installment_follows_the_last_deposit() {
        let requested = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        assert_eq!(
            first_installment_date(None, requested),
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
        );

        let last = Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap();
        assert_eq!(
            first_installment_date(Some(last), requested),
            Utc.with_ymd_and_hms(2024, 3, 13, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn periods_start_at_local_midnight() {
        // Wednesday 2024-05-15 23:30 UTC is already Thursday at +01:00
        let now = Utc.with_ymd_and_hms(2024, 5, 15, 23, 30, 0).unwrap();
        let lagos = FixedOffset::east_opt(3600).unwrap();
        let periods = PeriodStarts::at(now, lagos);
        assert_eq!(periods.today, Utc.with_ymd_and_hms(2024, 5, 15, 23, 0, 0).unwrap());
        assert_eq!(periods.week, Utc.with_ymd_and_hms(2024, 5, 11, 23, 0, 0).unwrap());
        assert_eq!(periods.month, Utc.with_ymd_and_hms(2024, 4, 30, 23, 0, 0).unwrap());

        let utc = PeriodStarts::at(now, FixedOffset::east_opt(0).unwrap());
        assert_eq!(utc.week, Utc.with_ymd_and_hms(2024, 5, 12, 0, 0, 0).unwrap());
        assert_eq!(utc.month, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn create_request_defaults_payment_method() {
        let req: TransactionCreateRequest =
            serde_json::from_str(r#"{"type": "withdrawal", "account_number": "SB12345678", "amount": 250}"#).unwrap();
        assert_eq!(req.tx_type, TransactionType::Withdrawal);
        assert_eq!(req.payment_method, PaymentMethod::Cash);
        assert!(req.validate().is_ok());

        let bad: Result<TransactionCreateRequest, _> =
            serde_json::from_str(r#"{"type": "refund", "account_number": "SB12345678", "amount": 1}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn response_reports_closing_balance() {
        let now = Utc::now();
        let tx = Transaction {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            tx_type: TransactionType::Withdrawal,
            opening_balance: 1000.0,
            amount: 250.0,
            narration: String::new(),
            payment_method: PaymentMethod::BankDeposit,
            sales_rep_id: Uuid::new_v4(),
            receipt_no: "TX000123".to_string(),
            effective_date: now,
            created_at: now,
            updated_at: now,
            archived_at: None,
            account: None,
            sales_rep: None,
        };
        let value = serde_json::to_value(tx.response(&TimeContext::new(0, now))).unwrap();
        assert_eq!(value["closing_balance"], 750.0);
        assert_eq!(value["type"], "withdrawal");
        assert_eq!(value["payment_method"], "bank_deposit");
        assert_eq!(value["account_number"], "");
    }
}
