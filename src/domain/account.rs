use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::customer::Customer;
use super::user::{self, User};
use super::{FieldErrors, FieldUpdate, RepositoryError};
use crate::api::format::{TimeContext, TimeResponse};
use crate::database::models::AccountRow;
use crate::filter::Column;

pub const TABLE: &str = "accounts";

pub const COLUMNS: &[Column] = &[
    Column::uuid("id"),
    Column::uuid("customer_id"),
    Column::text("number"),
    Column::text("account_type"),
    Column::float("balance"),
    Column::float("target"),
    Column::text("target_info"),
    Column::uuid("sales_rep_id"),
    Column::timestamp("created_at"),
    Column::timestamp("updated_at"),
    Column::timestamp("archived_at"),
];

/// Digits after the type prefix in an account number.
const NUMBER_DIGITS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    /// Regular savings.
    #[serde(rename = "SB")]
    Savings,
    /// Daily contribution savings.
    #[serde(rename = "DS")]
    DailySavings,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "SB",
            AccountType::DailySavings => "DS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SB" => Some(AccountType::Savings),
            "DS" => Some(AccountType::DailySavings),
            _ => None,
        }
    }
}

/// `SB` + eight digits, e.g. `SB10003001`.
pub fn generate_number<R: Rng + ?Sized>(account_type: AccountType, rng: &mut R) -> String {
    let n = rng.gen_range(0..10u64.pow(NUMBER_DIGITS));
    format!("{}{:0width$}", account_type.as_str(), n, width = NUMBER_DIGITS as usize)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub number: String,
    pub account_type: AccountType,
    pub balance: f64,
    pub target: f64,
    pub target_info: Option<String>,
    pub sales_rep_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,

    pub customer: Option<Box<Customer>>,
    pub sales_rep: Option<User>,
}

impl TryFrom<AccountRow> for Account {
    type Error = RepositoryError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let account_type = AccountType::parse(&row.account_type)
            .ok_or_else(|| RepositoryError::Internal(format!("account {} has unknown type '{}'", row.id, row.account_type)))?;
        Ok(Self {
            id: row.id,
            customer_id: row.customer_id,
            number: row.number,
            account_type,
            balance: row.balance,
            target: row.target,
            target_info: row.target_info,
            sales_rep_id: row.sales_rep_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            archived_at: row.archived_at,
            customer: None,
            sales_rep: None,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AccountCreateRequest {
    pub customer_id: Uuid,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub target: f64,
    #[validate(length(max = 500))]
    pub target_info: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountUpdateRequest {
    pub id: Uuid,
    #[serde(default, rename = "type")]
    pub account_type: FieldUpdate<AccountType>,
    #[serde(default)]
    pub target: FieldUpdate<f64>,
    #[serde(default)]
    pub target_info: FieldUpdate<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountChanges {
    pub account_type: Option<AccountType>,
    pub target: Option<f64>,
    pub target_info: Option<Option<String>>,
}

impl AccountChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AccountUpdateRequest {
    pub fn into_changes(self) -> Result<AccountChanges, RepositoryError> {
        let mut errors = FieldErrors::default();
        let account_type = self.account_type.into_required("type", &mut errors);
        let target = self.target.into_required("target", &mut errors);
        if target.is_some_and(|t| t < 0.0 || !t.is_finite()) {
            errors.add("target", "must not be negative");
        }
        errors.into_result()?;

        Ok(AccountChanges {
            account_type,
            target,
            target_info: self.target_info.into_nullable(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub customer_id: String,
    pub customer: String,
    pub number: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub balance: f64,
    pub target: f64,
    pub target_info: String,
    pub sales_rep_id: String,
    pub sales_rep: String,
    pub created_at: TimeResponse,
    pub updated_at: TimeResponse,
    pub archived_at: Option<TimeResponse>,
}

impl Account {
    pub fn response(&self, tc: &TimeContext) -> AccountResponse {
        AccountResponse {
            id: self.id.to_string(),
            customer_id: self.customer_id.to_string(),
            customer: self.customer.as_ref().map(|c| c.name.clone()).unwrap_or_default(),
            number: self.number.clone(),
            account_type: self.account_type,
            balance: self.balance,
            target: self.target,
            target_info: self.target_info.clone().unwrap_or_default(),
            sales_rep_id: self.sales_rep_id.to_string(),
            sales_rep: user::display_name(self.sales_rep.as_ref()),
            created_at: tc.format(self.created_at),
            updated_at: tc.format(self.updated_at),
            archived_at: tc.format_opt(self.archived_at),
        }
    }
}

impl AccountResponse {
    pub fn from_domain(account: Option<&Account>, tc: &TimeContext) -> Option<Self> {
        account.map(|a| a.response(tc))
    }

    pub fn list(accounts: &[Account], tc: &TimeContext) -> Vec<Self> {
        accounts.iter().map(|a| a.response(tc)).collect()
    }
}

#[cfg(test)]
pub(crate) fn sample(number: &str) -> Account {
    let now = Utc::now();
    Account {
        id: Uuid::new_v4(),
        customer_id: Uuid::new_v4(),
        number: number.to_string(),
        account_type: AccountType::Savings,
        balance: 0.0,
        target: 0.0,
        target_info: None,
        sales_rep_id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
        archived_at: None,
        customer: None,
        sales_rep: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn numbers_carry_type_prefix_and_eight_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let number = generate_number(AccountType::DailySavings, &mut rng);
            assert_eq!(number.len(), 10);
            assert!(number.starts_with("DS"));
            assert!(number[2..].chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn unknown_type_in_storage_is_internal() {
        let now = Utc::now();
        let row = AccountRow {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            number: "XX00000001".to_string(),
            account_type: "XX".to_string(),
            balance: 0.0,
            target: 0.0,
            target_info: None,
            sales_rep_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            archived_at: None,
        };
        assert!(matches!(Account::try_from(row), Err(RepositoryError::Internal(_))));
    }

    #[test]
    fn create_request_decodes_type_codes() {
        let req: AccountCreateRequest = serde_json::from_str(
            r#"{"customer_id": "6f2a4c1e-58a4-4e57-9d34-5b8f0a1b2c3d", "type": "DS", "target": -5}"#,
        )
        .unwrap();
        assert_eq!(req.account_type, AccountType::DailySavings);
        assert!(req.validate().is_err());
    }

    #[test]
    fn response_defaults_missing_relations_to_blank() {
        let tc = TimeContext::new(0, Utc::now());
        let response = sample("SB00000042").response(&tc);
        assert_eq!(response.customer, "");
        assert_eq!(response.sales_rep, "");
        assert_eq!(serde_json::to_value(&response).unwrap()["type"], "SB");
    }
}
