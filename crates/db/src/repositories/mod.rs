//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

mod conversion;
pub mod ledger;
pub mod scope;
pub mod user;

pub use ledger::{DEFAULT_MAX_RETRIES, LedgerRepository};
pub use scope::PgLedgerScope;
pub use user::UserRepository;
