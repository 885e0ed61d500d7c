//! `SeaORM` active enums mapped to Postgres enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Postgres `transaction_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "transaction_kind")]
pub enum TransactionKind {
    /// Immediate transfer.
    #[sea_orm(string_value = "direct")]
    Direct,
    /// Transfer settled later.
    #[sea_orm(string_value = "deferred")]
    Deferred,
    /// Reversal of a Deferred transfer.
    #[sea_orm(string_value = "cancellation")]
    Cancellation,
}

/// Postgres `transaction_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "transaction_status")]
pub enum TransactionStatus {
    /// Effect not applied.
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Effect applied.
    #[sea_orm(string_value = "settled")]
    Settled,
}
