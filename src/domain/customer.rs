use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidateEmail};

use super::account::Account;
use super::user::{self, User};
use super::{FieldErrors, FieldUpdate, RepositoryError};
use crate::api::format::{TimeContext, TimeResponse};
use crate::database::models::CustomerRow;
use crate::filter::Column;

pub const TABLE: &str = "customers";

pub const COLUMNS: &[Column] = &[
    Column::uuid("id"),
    Column::text("name"),
    Column::text("email"),
    Column::text("phone_number"),
    Column::text("address"),
    Column::uuid("sales_rep_id"),
    Column::timestamp("created_at"),
    Column::timestamp("updated_at"),
    Column::timestamp("archived_at"),
];

/// Columns matched by the free-text `search` parameter.
pub const SEARCH_COLUMNS: &[&str] = &["name", "email", "phone_number"];

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: String,
    pub address: Option<String>,
    pub sales_rep_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,

    pub sales_rep: Option<User>,
    pub accounts: Vec<Account>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            phone_number: row.phone_number,
            address: row.address,
            sales_rep_id: row.sales_rep_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            archived_at: row.archived_at,
            sales_rep: None,
            accounts: vec![],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CustomerCreateRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "is required"))]
    pub name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 32, message = "is required"))]
    pub phone_number: String,
    #[validate(length(max = 500))]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerUpdateRequest {
    pub id: Uuid,
    #[serde(default)]
    pub name: FieldUpdate<String>,
    #[serde(default)]
    pub email: FieldUpdate<String>,
    #[serde(default)]
    pub phone_number: FieldUpdate<String>,
    #[serde(default)]
    pub address: FieldUpdate<String>,
}

/// Validated column changes for one customer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerChanges {
    pub name: Option<String>,
    pub email: Option<Option<String>>,
    pub phone_number: Option<String>,
    pub address: Option<Option<String>>,
}

impl CustomerChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl CustomerUpdateRequest {
    pub fn into_changes(self) -> Result<CustomerChanges, RepositoryError> {
        let mut errors = FieldErrors::default();

        let name = self.name.into_required("name", &mut errors);
        if name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            errors.add("name", "is required");
        }
        let phone_number = self.phone_number.into_required("phone_number", &mut errors);
        if phone_number.as_deref().is_some_and(|p| p.trim().is_empty()) {
            errors.add("phone_number", "is required");
        }
        let email = self.email.into_nullable();
        if let Some(Some(address)) = &email {
            if !address.validate_email() {
                errors.add("email", "must be a valid email address");
            }
        }

        errors.into_result()?;
        Ok(CustomerChanges {
            name,
            email,
            phone_number,
            address: self.address.into_nullable(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub address: String,
    pub sales_rep_id: String,
    pub sales_rep: String,
    pub account_numbers: Vec<String>,
    pub created_at: TimeResponse,
    pub updated_at: TimeResponse,
    pub archived_at: Option<TimeResponse>,
}

impl Customer {
    pub fn response(&self, tc: &TimeContext) -> CustomerResponse {
        CustomerResponse {
            id: self.id.to_string(),
            name: self.name.clone(),
            email: self.email.clone().unwrap_or_default(),
            phone_number: self.phone_number.clone(),
            address: self.address.clone().unwrap_or_default(),
            sales_rep_id: self.sales_rep_id.to_string(),
            sales_rep: user::display_name(self.sales_rep.as_ref()),
            account_numbers: self.accounts.iter().map(|a| a.number.clone()).collect(),
            created_at: tc.format(self.created_at),
            updated_at: tc.format(self.updated_at),
            archived_at: tc.format_opt(self.archived_at),
        }
    }
}

impl CustomerResponse {
    pub fn from_domain(customer: Option<&Customer>, tc: &TimeContext) -> Option<Self> {
        customer.map(|c| c.response(tc))
    }

    pub fn list(customers: &[Customer], tc: &TimeContext) -> Vec<Self> {
        customers.iter().map(|c| c.response(tc)).collect()
    }
}
