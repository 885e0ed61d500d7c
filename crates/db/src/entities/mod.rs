//! `SeaORM` entity definitions.

pub mod prelude;

pub mod sea_orm_active_enums;
pub mod transaction_logs;
pub mod transaction_types;
pub mod transactions;
pub mod users;
