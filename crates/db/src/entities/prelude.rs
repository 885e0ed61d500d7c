//! Entity re-exports.

pub use super::transaction_logs::Entity as TransactionLogs;
pub use super::transaction_types::Entity as TransactionTypes;
pub use super::transactions::Entity as Transactions;
pub use super::users::Entity as Users;
