//! `SeaORM` Entity for transactions table.

use super::sea_orm_active_enums::TransactionStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub type_id: i32,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub amount: Decimal,
    #[sea_orm(unique)]
    pub counter_transaction_id: Option<Uuid>,
    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,
    pub status: TransactionStatus,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))", nullable)]
    pub sender_balance_after: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))", nullable)]
    pub receiver_balance_after: Option<Decimal>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transaction_types::Entity",
        from = "Column::TypeId",
        to = "super::transaction_types::Column::Id"
    )]
    TransactionTypes,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::SenderId",
        to = "super::users::Column::Id"
    )]
    Sender,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::ReceiverId",
        to = "super::users::Column::Id"
    )]
    Receiver,
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::CounterTransactionId",
        to = "Column::Id"
    )]
    CounterTransaction,
}

impl Related<super::transaction_types::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionTypes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
