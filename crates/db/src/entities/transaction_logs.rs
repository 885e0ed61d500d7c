//! `SeaORM` Entity for transaction_logs table.
//!
//! No foreign key to `transactions`: entries outlive deleted transactions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "transaction_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transaction_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub sender_balance_after: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub receiver_balance_after: Decimal,
    pub recorded_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
