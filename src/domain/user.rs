use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::format::{TimeContext, TimeResponse};
use crate::database::models::UserRow;
use crate::filter::Column;

pub const TABLE: &str = "users";

pub const COLUMNS: &[Column] = &[
    Column::uuid("id"),
    Column::text("first_name"),
    Column::text("last_name"),
    Column::text("email"),
    Column::text("phone_number"),
    Column::timestamp("created_at"),
    Column::timestamp("updated_at"),
    Column::timestamp("archived_at"),
];

/// A staff member. Appears on other records as their sales rep.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone_number: row.phone_number,
            roles: row.roles,
            created_at: row.created_at,
            updated_at: row.updated_at,
            archived_at: row.archived_at,
        }
    }
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn response(&self, tc: &TimeContext) -> UserResponse {
        UserResponse {
            id: self.id.to_string(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            name: self.display_name(),
            email: self.email.clone(),
            phone_number: self.phone_number.clone(),
            roles: self.roles.clone(),
            created_at: tc.format(self.created_at),
            updated_at: tc.format(self.updated_at),
            archived_at: tc.format_opt(self.archived_at),
        }
    }
}

/// Display name of an optional relation, blank when it was not loaded.
pub fn display_name(user: Option<&User>) -> String {
    user.map(User::display_name).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub roles: Vec<String>,
    pub created_at: TimeResponse,
    pub updated_at: TimeResponse,
    pub archived_at: Option<TimeResponse>,
}

impl UserResponse {
    pub fn from_domain(user: Option<&User>, tc: &TimeContext) -> Option<Self> {
        user.map(|u| u.response(tc))
    }

    pub fn list(users: &[User], tc: &TimeContext) -> Vec<Self> {
        users.iter().map(|u| u.response(tc)).collect()
    }
}

#[cfg(test)]
pub(crate) fn sample(first: &str, last: &str) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: format!("{}@example.com", first.to_lowercase()),
        phone_number: String::new(),
        roles: vec!["user".to_string()],
        created_at: now,
        updated_at: now,
        archived_at: None,
    }
}
