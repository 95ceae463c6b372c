//! Row structs, one per table. Column names match the schema in `sql/schema.sql`.

pub mod account;
pub mod customer;
pub mod deposit;
pub mod transaction;
pub mod user;

pub use account::AccountRow;
pub use customer::CustomerRow;
pub use deposit::DepositRow;
pub use transaction::TransactionRow;
pub use user::UserRow;
