use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::account::Account;
use super::user::{self, User};
use super::{FieldErrors, FieldUpdate, RepositoryError};
use crate::api::format::{TimeContext, TimeResponse};
use crate::database::models::DepositRow;
use crate::filter::Column;

pub const TABLE: &str = "deposits";

pub const COLUMNS: &[Column] = &[
    Column::uuid("id"),
    Column::uuid("account_id"),
    Column::float("amount"),
    Column::text("narration"),
    Column::uuid("sales_rep_id"),
    Column::timestamp("created_at"),
    Column::timestamp("updated_at"),
    Column::timestamp("archived_at"),
];

/// Money collected into an account by a sales rep.
#[derive(Debug, Clone, PartialEq)]
pub struct Deposit {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: f64,
    pub narration: String,
    pub sales_rep_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,

    pub account: Option<Account>,
    pub sales_rep: Option<User>,
}

impl From<DepositRow> for Deposit {
    fn from(row: DepositRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            amount: row.amount,
            narration: row.narration,
            sales_rep_id: row.sales_rep_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            archived_at: row.archived_at,
            account: None,
            sales_rep: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DepositCreateRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "is required"))]
    pub account_number: String,
    #[serde(default)]
    #[validate(range(exclusive_min = 0.0, message = "must be greater than zero"))]
    pub amount: f64,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub narration: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositUpdateRequest {
    pub id: Uuid,
    #[serde(default)]
    pub amount: FieldUpdate<f64>,
    #[serde(default)]
    pub narration: FieldUpdate<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepositChanges {
    pub amount: Option<f64>,
    pub narration: Option<String>,
}

impl DepositChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl DepositUpdateRequest {
    pub fn into_changes(self) -> Result<DepositChanges, RepositoryError> {
        let mut errors = FieldErrors::default();
        let amount = self.amount.into_required("amount", &mut errors);
        if amount.is_some_and(|a| a <= 0.0 || !a.is_finite()) {
            errors.add("amount", "must be greater than zero");
        }
        let narration = self.narration.into_nullable().map(Option::unwrap_or_default);
        if narration.as_ref().is_some_and(|n| n.chars().count() > 500) {
            errors.add("narration", "has an invalid length");
        }
        errors.into_result()?;

        Ok(DepositChanges { amount, narration })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositResponse {
    pub id: String,
    pub account_id: String,
    pub account_number: String,
    pub customer_id: String,
    pub amount: f64,
    pub narration: String,
    pub sales_rep_id: String,
    pub sales_rep: String,
    pub created_at: TimeResponse,
    pub updated_at: TimeResponse,
    pub archived_at: Option<TimeResponse>,
}

impl Deposit {
    pub fn response(&self, tc: &TimeContext) -> DepositResponse {
        DepositResponse {
            id: self.id.to_string(),
            account_id: self.account_id.to_string(),
            account_number: self.account.as_ref().map(|a| a.number.clone()).unwrap_or_default(),
            customer_id: self.account.as_ref().map(|a| a.customer_id.to_string()).unwrap_or_default(),
            amount: self.amount,
            narration: self.narration.clone(),
            sales_rep_id: self.sales_rep_id.to_string(),
            sales_rep: user::display_name(self.sales_rep.as_ref()),
            created_at: tc.format(self.created_at),
            updated_at: tc.format(self.updated_at),
            archived_at: tc.format_opt(self.archived_at),
        }
    }
}

impl DepositResponse {
    pub fn from_domain(deposit: Option<&Deposit>, tc: &TimeContext) -> Option<Self> {
        deposit.map(|d| d.response(tc))
    }

    pub fn list(deposits: &[Deposit], tc: &TimeContext) -> Vec<Self> {
        deposits.iter().map(|d| d.response(tc)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{account, user};

    fn deposit() -> Deposit {
        let now = Utc::now();
        Deposit {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            amount: 500.0,
            narration: "cash".to_string(),
            sales_rep_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            archived_at: None,
            account: None,
            sales_rep: None,
        }
    }

    #[test]
    fn zero_amount_fails_on_amount_only() {
        let req = DepositCreateRequest {
            account_number: "SB10003001".to_string(),
            amount: 0.0,
            narration: "cash".to_string(),
        };
        let errors = FieldErrors::from(req.validate().unwrap_err());
        assert_eq!(errors.field_names(), "amount");
    }

    #[test]
    fn update_rejects_clearing_or_zeroing_amount() {
        let id = Uuid::new_v4();
        for amount in [FieldUpdate::Clear, FieldUpdate::Set(0.0), FieldUpdate::Set(-3.0)] {
            let req = DepositUpdateRequest { id, amount, narration: FieldUpdate::Unchanged };
            assert!(matches!(req.into_changes(), Err(RepositoryError::Validation(_))));
        }
    }

    #[test]
    fn cleared_narration_becomes_blank() {
        let req = DepositUpdateRequest {
            id: Uuid::new_v4(),
            amount: FieldUpdate::Unchanged,
            narration: FieldUpdate::Clear,
        };
        assert_eq!(req.into_changes().unwrap().narration, Some(String::new()));
    }

    #[test]
    fn response_embeds_relation_fields() {
        let mut d = deposit();
        let tc = TimeContext::new(0, d.created_at);

        let bare = d.response(&tc);
        assert_eq!(bare.account_number, "");
        assert_eq!(bare.customer_id, "");
        assert_eq!(bare.sales_rep, "");

        let account = account::sample("SB10003001");
        let customer_id = account.customer_id.to_string();
        d.account = Some(account);
        d.sales_rep = Some(user::sample("Chidi", "Okafor"));
        let full = d.response(&tc);
        assert_eq!(full.account_number, "SB10003001");
        assert_eq!(full.customer_id, customer_id);
        assert_eq!(full.sales_rep, "Chidi Okafor");
        assert_eq!(full.created_at, full.updated_at);
    }

    #[test]
    fn nil_safe_mapping() {
        let tc = TimeContext::new(0, Utc::now());
        assert!(DepositResponse::from_domain(None, &tc).is_none());
        let list = DepositResponse::list(&[], &tc);
        assert_eq!(serde_json::to_string(&list).unwrap(), "[]");
    }
}
