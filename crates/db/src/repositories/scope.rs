//! Postgres implementation of [`LedgerScope`].
//!
//! A scope wraps one database transaction. Balances only ever change through
//! `UPDATE users SET balance = balance + $delta`, and every transaction row
//! read inside a scope is locked with `FOR UPDATE` until commit or rollback.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tally_core::ledger::{
    AuditEntry, LedgerError, LedgerScope, Transaction, TransactionKind, TransactionStatus,
    TransactionType, UserBalance,
};
use tally_shared::types::{AuditEntryId, TransactionId, TransactionTypeId, UserId};

use super::conversion::{
    TypeCatalog, audit_to_core, is_out_of_range, is_unique_violation, map_db_err, status_to_db,
    transaction_to_active, user_to_core,
};
use crate::entities::{transaction_logs, transactions, users};

/// A ledger scope backed by a Postgres transaction.
pub struct PgLedgerScope {
    txn: DatabaseTransaction,
    catalog: TypeCatalog,
}

impl PgLedgerScope {
    /// Opens a database transaction and loads the type catalog into it.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started.
    pub async fn begin(db: &DatabaseConnection) -> Result<Self, LedgerError> {
        let txn = db.begin().await.map_err(map_db_err)?;
        let catalog = TypeCatalog::load(&txn).await.map_err(map_db_err)?;
        Ok(Self { txn, catalog })
    }

    /// Commits every change made through the scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub async fn commit(self) -> Result<(), LedgerError> {
        self.txn.commit().await.map_err(map_db_err)
    }

    /// Discards every change made through the scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    pub async fn rollback(self) -> Result<(), LedgerError> {
        self.txn.rollback().await.map_err(map_db_err)
    }

    async fn execute_savepoint(&self, statement: &str, name: &str) -> Result<(), LedgerError> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(LedgerError::Internal(format!("invalid savepoint name {name:?}")));
        }
        self.txn
            .execute_unprepared(&format!("{statement} {name}"))
            .await
            .map_err(map_db_err)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerScope for PgLedgerScope {
    async fn find_user(&mut self, id: UserId) -> Result<Option<UserBalance>, LedgerError> {
        let user = users::Entity::find_by_id(id.into_inner())
            .one(&self.txn)
            .await
            .map_err(map_db_err)?;
        Ok(user.map(user_to_core))
    }

    async fn apply_delta(&mut self, user: UserId, delta: Decimal) -> Result<Decimal, LedgerError> {
        let updated = users::Entity::update_many()
            .col_expr(
                users::Column::Balance,
                Expr::col(users::Column::Balance).add(delta),
            )
            .col_expr(users::Column::UpdatedAt, Expr::current_timestamp().into())
            .filter(users::Column::Id.eq(user.into_inner()))
            .exec_with_returning(&self.txn)
            .await
            .map_err(|err| {
                if is_out_of_range(&err) {
                    LedgerError::BalanceOutOfRange(user)
                } else {
                    map_db_err(err)
                }
            })?;

        updated
            .into_iter()
            .next()
            .map(|row| row.balance)
            .ok_or(LedgerError::UserNotFound(user))
    }

    async fn find_transaction_type(
        &mut self,
        id: TransactionTypeId,
    ) -> Result<Option<TransactionType>, LedgerError> {
        Ok(self.catalog.get(id.into_inner()).cloned())
    }

    async fn find_transaction(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, LedgerError> {
        let row = transactions::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(map_db_err)?;
        row.map(|model| self.catalog.transaction(model)).transpose()
    }

    async fn find_cancellation_of(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, LedgerError> {
        let row = transactions::Entity::find()
            .filter(transactions::Column::CounterTransactionId.eq(id.into_inner()))
            .filter(
                transactions::Column::TypeId
                    .is_in(self.catalog.ids_of_kind(TransactionKind::Cancellation)),
            )
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(map_db_err)?;
        row.map(|model| self.catalog.transaction(model)).transpose()
    }

    async fn insert_transaction(&mut self, tx: &Transaction) -> Result<(), LedgerError> {
        match transaction_to_active(tx).insert(&self.txn).await {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => match tx.counter_transaction_id {
                Some(counter_id) => Err(LedgerError::AlreadyCancelled(counter_id)),
                None => Err(map_db_err(err)),
            },
            Err(err) => Err(map_db_err(err)),
        }
    }

    async fn save_transaction(&mut self, tx: &Transaction) -> Result<(), LedgerError> {
        let result = transactions::Entity::update_many()
            .set(transaction_to_active(tx))
            .filter(transactions::Column::Id.eq(tx.id.into_inner()))
            .exec(&self.txn)
            .await
            .map_err(map_db_err)?;
        if result.rows_affected == 0 {
            return Err(LedgerError::TransactionNotFound(tx.id));
        }
        Ok(())
    }

    async fn transition_status(
        &mut self,
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<bool, LedgerError> {
        let result = transactions::Entity::update_many()
            .set(transactions::ActiveModel {
                status: Set(status_to_db(to)),
                updated_at: Set(Utc::now().into()),
                ..Default::default()
            })
            .filter(transactions::Column::Id.eq(id.into_inner()))
            .filter(transactions::Column::Status.eq(status_to_db(from)))
            .exec(&self.txn)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected == 1)
    }

    async fn delete_transaction(&mut self, id: TransactionId) -> Result<bool, LedgerError> {
        let result = transactions::Entity::delete_by_id(id.into_inner())
            .exec(&self.txn)
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected == 1)
    }

    async fn append_audit(
        &mut self,
        transaction_id: TransactionId,
        sender_balance_after: Decimal,
        receiver_balance_after: Decimal,
    ) -> Result<AuditEntry, LedgerError> {
        let entry = transaction_logs::ActiveModel {
            id: Set(AuditEntryId::new().into_inner()),
            transaction_id: Set(transaction_id.into_inner()),
            sender_balance_after: Set(sender_balance_after),
            receiver_balance_after: Set(receiver_balance_after),
            recorded_at: Set(Utc::now().into()),
        };
        let model = entry.insert(&self.txn).await.map_err(map_db_err)?;
        Ok(audit_to_core(model))
    }

    async fn settlement_candidates(&mut self) -> Result<Vec<Transaction>, LedgerError> {
        let cancelled = Query::select()
            .column(transactions::Column::CounterTransactionId)
            .from(transactions::Entity)
            .and_where(Expr::col(transactions::Column::CounterTransactionId).is_not_null())
            .to_owned();

        let rows = transactions::Entity::find()
            .filter(
                transactions::Column::TypeId
                    .is_in(self.catalog.ids_of_kind(TransactionKind::Deferred)),
            )
            .filter(transactions::Column::Status.eq(status_to_db(TransactionStatus::Pending)))
            .filter(transactions::Column::Id.not_in_subquery(cancelled))
            .order_by_asc(transactions::Column::CreatedAt)
            .order_by_asc(transactions::Column::Id)
            .lock_exclusive()
            .all(&self.txn)
            .await
            .map_err(map_db_err)?;

        rows.into_iter()
            .map(|model| self.catalog.transaction(model))
            .collect()
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), LedgerError> {
        self.execute_savepoint("SAVEPOINT", name).await
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), LedgerError> {
        self.execute_savepoint("RELEASE SAVEPOINT", name).await
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), LedgerError> {
        self.execute_savepoint("ROLLBACK TO SAVEPOINT", name).await
    }
}
