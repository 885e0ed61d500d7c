//! Store contract consumed by the ledger engine.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tally_shared::types::{TransactionId, TransactionTypeId, UserId};

use super::error::LedgerError;
use super::types::{AuditEntry, Transaction, TransactionStatus, TransactionType, UserBalance};

/// One atomic unit of work against the ledger store.
///
/// Everything done through a scope becomes visible together when the owner
/// commits it, or not at all. Dropping a scope without committing discards
/// its changes. Engine operations receive the scope explicitly and never
/// commit it themselves.
#[async_trait]
pub trait LedgerScope: Send {
    /// Looks up a user and their current balance.
    async fn find_user(&mut self, id: UserId) -> Result<Option<UserBalance>, LedgerError>;

    /// Adds a signed delta to a user's balance and returns the new balance.
    ///
    /// This is the only way the engine changes a balance. Implementations
    /// must perform the addition atomically in the store so that concurrent
    /// scopes never lose an update.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if the user does not exist.
    async fn apply_delta(&mut self, user: UserId, delta: Decimal) -> Result<Decimal, LedgerError>;

    /// Resolves a catalog entry.
    async fn find_transaction_type(
        &mut self,
        id: TransactionTypeId,
    ) -> Result<Option<TransactionType>, LedgerError>;

    /// Loads a transaction and locks it for the rest of the scope.
    async fn find_transaction(&mut self, id: TransactionId)
    -> Result<Option<Transaction>, LedgerError>;

    /// Loads the Cancellation referencing the given Deferred transaction, if any.
    async fn find_cancellation_of(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, LedgerError>;

    /// Persists a new transaction.
    async fn insert_transaction(&mut self, tx: &Transaction) -> Result<(), LedgerError>;

    /// Overwrites the stored fields of an existing transaction.
    async fn save_transaction(&mut self, tx: &Transaction) -> Result<(), LedgerError>;

    /// Moves a transaction from `from` to `to` only if it is still in `from`.
    ///
    /// Returns false when another writer changed the status first.
    async fn transition_status(
        &mut self,
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<bool, LedgerError>;

    /// Removes a transaction. Returns false if it did not exist.
    async fn delete_transaction(&mut self, id: TransactionId) -> Result<bool, LedgerError>;

    /// Appends an audit entry with the balances after a balance-affecting event.
    async fn append_audit(
        &mut self,
        transaction_id: TransactionId,
        sender_balance_after: Decimal,
        receiver_balance_after: Decimal,
    ) -> Result<AuditEntry, LedgerError>;

    /// Pending Deferred transactions with no Cancellation, oldest first.
    async fn settlement_candidates(&mut self) -> Result<Vec<Transaction>, LedgerError>;

    /// Marks a point the scope can roll back to.
    async fn savepoint(&mut self, name: &str) -> Result<(), LedgerError>;

    /// Forgets a savepoint, keeping the work done since.
    async fn release_savepoint(&mut self, name: &str) -> Result<(), LedgerError>;

    /// Discards the work done since the savepoint.
    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), LedgerError>;
}
