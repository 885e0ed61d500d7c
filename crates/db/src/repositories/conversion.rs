//! Conversions between `SeaORM` models and ledger domain types.

use std::collections::HashMap;

use sea_orm::{ConnectionTrait, DbErr, EntityTrait, QueryOrder, RuntimeErr, Set, SqlErr};
use tally_core::ledger::{
    AuditEntry, LedgerError, Transaction, TransactionKind as CoreKind,
    TransactionStatus as CoreStatus, TransactionType, UserBalance,
};
use tally_shared::types::{AuditEntryId, TransactionId, TransactionTypeId, UserId};

use crate::entities::{
    sea_orm_active_enums::{TransactionKind, TransactionStatus},
    transaction_logs, transaction_types, transactions, users,
};

/// SQLSTATE codes Postgres raises when a transaction lost a race.
const RETRYABLE_SQLSTATES: [&str; 2] = ["40001", "40P01"];

/// `numeric_value_out_of_range`.
const OUT_OF_RANGE_SQLSTATE: &str = "22003";

/// The transaction type catalog, loaded once per scope or read.
#[derive(Debug, Clone, Default)]
pub(crate) struct TypeCatalog {
    types: HashMap<i32, TransactionType>,
}

impl TypeCatalog {
    pub(crate) async fn load<C: ConnectionTrait>(conn: &C) -> Result<Self, DbErr> {
        let rows = transaction_types::Entity::find()
            .order_by_asc(transaction_types::Column::Id)
            .all(conn)
            .await?;
        Ok(Self::from_models(rows))
    }

    pub(crate) fn from_models(rows: Vec<transaction_types::Model>) -> Self {
        let types = rows
            .into_iter()
            .map(|row| (row.id, type_to_core(row)))
            .collect();
        Self { types }
    }

    pub(crate) fn get(&self, id: i32) -> Option<&TransactionType> {
        self.types.get(&id)
    }

    /// Type ids with the given kind, ascending.
    pub(crate) fn ids_of_kind(&self, kind: CoreKind) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .types
            .values()
            .filter(|ty| ty.kind == kind)
            .map(|ty| ty.id.into_inner())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn all(&self) -> Vec<TransactionType> {
        let mut all: Vec<TransactionType> = self.types.values().cloned().collect();
        all.sort_by_key(|ty| ty.id);
        all
    }

    /// Builds a domain transaction, resolving its kind from the catalog.
    pub(crate) fn transaction(
        &self,
        model: transactions::Model,
    ) -> Result<Transaction, LedgerError> {
        let kind = self
            .get(model.type_id)
            .map(|ty| ty.kind)
            .ok_or_else(|| {
                LedgerError::Internal(format!(
                    "transaction {} references unknown type {}",
                    model.id, model.type_id
                ))
            })?;
        Ok(transaction_to_core(model, kind))
    }
}

/// Maps a database error onto the ledger error space.
pub(crate) fn map_db_err(err: DbErr) -> LedgerError {
    if is_retryable(&err) {
        return LedgerError::ConcurrentModification;
    }
    LedgerError::Database(err.to_string())
}

fn is_retryable(err: &DbErr) -> bool {
    sqlstate(err).is_some_and(|code| RETRYABLE_SQLSTATES.contains(&code.as_str()))
}

/// Returns true when a numeric value overflowed its column.
pub(crate) fn is_out_of_range(err: &DbErr) -> bool {
    sqlstate(err).is_some_and(|code| code == OUT_OF_RANGE_SQLSTATE)
}

fn sqlstate(err: &DbErr) -> Option<String> {
    let runtime = match err {
        DbErr::Exec(runtime) | DbErr::Query(runtime) | DbErr::Conn(runtime) => runtime,
        _ => return None,
    };
    let RuntimeErr::SqlxError(sqlx_err) = runtime else {
        return None;
    };
    database_code(sqlx_err)
}

fn database_code(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .map(|code| code.into_owned())
}

/// Returns true when the error is a unique constraint violation.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

pub(crate) const fn kind_to_core(kind: TransactionKind) -> CoreKind {
    match kind {
        TransactionKind::Direct => CoreKind::Direct,
        TransactionKind::Deferred => CoreKind::Deferred,
        TransactionKind::Cancellation => CoreKind::Cancellation,
    }
}

pub(crate) const fn status_to_core(status: TransactionStatus) -> CoreStatus {
    match status {
        TransactionStatus::Pending => CoreStatus::Pending,
        TransactionStatus::Settled => CoreStatus::Settled,
    }
}

pub(crate) const fn status_to_db(status: CoreStatus) -> TransactionStatus {
    match status {
        CoreStatus::Pending => TransactionStatus::Pending,
        CoreStatus::Settled => TransactionStatus::Settled,
    }
}

pub(crate) fn type_to_core(model: transaction_types::Model) -> TransactionType {
    TransactionType {
        id: TransactionTypeId(model.id),
        name: model.name,
        kind: kind_to_core(model.kind),
    }
}

pub(crate) fn user_to_core(model: users::Model) -> UserBalance {
    UserBalance {
        id: UserId::from_uuid(model.id),
        name: model.name,
        balance: model.balance,
    }
}

pub(crate) fn audit_to_core(model: transaction_logs::Model) -> AuditEntry {
    AuditEntry {
        id: AuditEntryId::from_uuid(model.id),
        transaction_id: TransactionId::from_uuid(model.transaction_id),
        sender_balance_after: model.sender_balance_after,
        receiver_balance_after: model.receiver_balance_after,
        recorded_at: model.recorded_at.to_utc(),
    }
}

pub(crate) fn transaction_to_core(model: transactions::Model, kind: CoreKind) -> Transaction {
    Transaction {
        id: TransactionId::from_uuid(model.id),
        sender_id: UserId::from_uuid(model.sender_id),
        receiver_id: UserId::from_uuid(model.receiver_id),
        type_id: TransactionTypeId(model.type_id),
        kind,
        amount: model.amount,
        counter_transaction_id: model.counter_transaction_id.map(TransactionId::from_uuid),
        note: model.note,
        status: status_to_core(model.status),
        sender_balance_after: model.sender_balance_after,
        receiver_balance_after: model.receiver_balance_after,
        created_at: model.created_at.to_utc(),
        updated_at: model.updated_at.to_utc(),
    }
}

/// Full active model of a domain transaction, every column set.
pub(crate) fn transaction_to_active(tx: &Transaction) -> transactions::ActiveModel {
    transactions::ActiveModel {
        id: Set(tx.id.into_inner()),
        sender_id: Set(tx.sender_id.into_inner()),
        receiver_id: Set(tx.receiver_id.into_inner()),
        type_id: Set(tx.type_id.into_inner()),
        amount: Set(tx.amount),
        counter_transaction_id: Set(tx.counter_transaction_id.map(TransactionId::into_inner)),
        note: Set(tx.note.clone()),
        status: Set(status_to_db(tx.status)),
        sender_balance_after: Set(tx.sender_balance_after),
        receiver_balance_after: Set(tx.receiver_balance_after),
        created_at: Set(tx.created_at.into()),
        updated_at: Set(tx.updated_at.into()),
    }
}

#[cfg(test)]
#[path = "conversion_tests.rs"]
mod tests;
