//! In-memory ledger store.
//!
//! Scopes are serialised behind an async mutex: a scope holds the lock from
//! `begin` until it is committed or dropped, and works on a private copy of
//! the state that only `commit` publishes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tally_shared::types::{AuditEntryId, TransactionId, TransactionTypeId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::LedgerError;
use super::store::LedgerScope;
use super::types::{
    AuditEntry, CANCELLATION_TYPE, DEFERRED_TYPE, DIRECT_TYPE, Transaction, TransactionKind,
    TransactionStatus, TransactionType, UserBalance,
};
use super::validation::checked_balance;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    users: BTreeMap<UserId, UserBalance>,
    types: BTreeMap<TransactionTypeId, TransactionType>,
    transactions: HashMap<TransactionId, Transaction>,
    audit: Vec<AuditEntry>,
}

impl LedgerState {
    fn cancellation_of(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.values().find(|tx| {
            tx.kind == TransactionKind::Cancellation && tx.counter_transaction_id == Some(id)
        })
    }
}

/// Shared in-memory ledger.
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Creates an empty ledger with the built-in type catalog.
    #[must_use]
    pub fn new() -> Self {
        let mut state = LedgerState::default();
        for (id, name, kind) in [
            (DIRECT_TYPE, "direct", TransactionKind::Direct),
            (DEFERRED_TYPE, "deferred", TransactionKind::Deferred),
            (CANCELLATION_TYPE, "cancellation", TransactionKind::Cancellation),
        ] {
            state.types.insert(
                id,
                TransactionType {
                    id,
                    name: name.to_string(),
                    kind,
                },
            );
        }
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Opens a scope. Waits until no other scope is open.
    pub async fn begin(&self) -> InMemoryScope {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        InMemoryScope {
            guard,
            working,
            savepoints: Vec::new(),
        }
    }

    /// Adds a user with an opening balance.
    pub async fn add_user(&self, name: &str, balance: Decimal) -> UserId {
        let id = UserId::new();
        self.state.lock().await.users.insert(
            id,
            UserBalance {
                id,
                name: name.to_string(),
                balance,
            },
        );
        id
    }

    /// Removes a user, leaving their transactions dangling.
    pub async fn remove_user(&self, id: UserId) -> Option<UserBalance> {
        self.state.lock().await.users.remove(&id)
    }

    /// Returns a user's committed balance.
    pub async fn balance(&self, id: UserId) -> Option<Decimal> {
        self.state.lock().await.users.get(&id).map(|user| user.balance)
    }

    /// Returns all users ordered by id.
    pub async fn users(&self) -> Vec<UserBalance> {
        self.state.lock().await.users.values().cloned().collect()
    }

    /// Returns a committed transaction.
    pub async fn transaction(&self, id: TransactionId) -> Option<Transaction> {
        self.state.lock().await.transactions.get(&id).cloned()
    }

    /// Returns all committed transactions, newest first.
    pub async fn transactions(&self) -> Vec<Transaction> {
        let mut all: Vec<Transaction> =
            self.state.lock().await.transactions.values().cloned().collect();
        all.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        all
    }

    /// Returns the audit trail of a transaction, oldest first.
    pub async fn audit_entries(&self, transaction_id: TransactionId) -> Vec<AuditEntry> {
        self.state
            .lock()
            .await
            .audit
            .iter()
            .filter(|entry| entry.transaction_id == transaction_id)
            .cloned()
            .collect()
    }
}

/// A scope over an [`InMemoryLedger`].
pub struct InMemoryScope {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
    savepoints: Vec<(String, LedgerState)>,
}

impl InMemoryScope {
    /// Publishes the scope's changes and releases the ledger.
    pub fn commit(self) {
        let Self {
            mut guard, working, ..
        } = self;
        *guard = working;
    }

    fn savepoint_index(&self, name: &str) -> Result<usize, LedgerError> {
        self.savepoints
            .iter()
            .rposition(|(saved, _)| saved == name)
            .ok_or_else(|| LedgerError::Internal(format!("unknown savepoint {name}")))
    }
}

#[async_trait]
impl LedgerScope for InMemoryScope {
    async fn find_user(&mut self, id: UserId) -> Result<Option<UserBalance>, LedgerError> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn apply_delta(&mut self, user: UserId, delta: Decimal) -> Result<Decimal, LedgerError> {
        let entry = self
            .working
            .users
            .get_mut(&user)
            .ok_or(LedgerError::UserNotFound(user))?;
        entry.balance = checked_balance(user, entry.balance, delta)?;
        Ok(entry.balance)
    }

    async fn find_transaction_type(
        &mut self,
        id: TransactionTypeId,
    ) -> Result<Option<TransactionType>, LedgerError> {
        Ok(self.working.types.get(&id).cloned())
    }

    async fn find_transaction(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, LedgerError> {
        Ok(self.working.transactions.get(&id).cloned())
    }

    async fn find_cancellation_of(
        &mut self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, LedgerError> {
        Ok(self.working.cancellation_of(id).cloned())
    }

    async fn insert_transaction(&mut self, tx: &Transaction) -> Result<(), LedgerError> {
        if let Some(counter_id) = tx.counter_transaction_id {
            if self.working.cancellation_of(counter_id).is_some() {
                return Err(LedgerError::AlreadyCancelled(counter_id));
            }
        }
        self.working.transactions.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn save_transaction(&mut self, tx: &Transaction) -> Result<(), LedgerError> {
        let stored = self
            .working
            .transactions
            .get_mut(&tx.id)
            .ok_or(LedgerError::TransactionNotFound(tx.id))?;
        *stored = tx.clone();
        Ok(())
    }

    async fn transition_status(
        &mut self,
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<bool, LedgerError> {
        match self.working.transactions.get_mut(&id) {
            Some(tx) if tx.status == from => {
                tx.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_transaction(&mut self, id: TransactionId) -> Result<bool, LedgerError> {
        Ok(self.working.transactions.remove(&id).is_some())
    }

    async fn append_audit(
        &mut self,
        transaction_id: TransactionId,
        sender_balance_after: Decimal,
        receiver_balance_after: Decimal,
    ) -> Result<AuditEntry, LedgerError> {
        let entry = AuditEntry {
            id: AuditEntryId::new(),
            transaction_id,
            sender_balance_after,
            receiver_balance_after,
            recorded_at: Utc::now(),
        };
        self.working.audit.push(entry.clone());
        Ok(entry)
    }

    async fn settlement_candidates(&mut self) -> Result<Vec<Transaction>, LedgerError> {
        let mut candidates: Vec<Transaction> = self
            .working
            .transactions
            .values()
            .filter(|tx| {
                tx.kind == TransactionKind::Deferred
                    && tx.status == TransactionStatus::Pending
                    && self.working.cancellation_of(tx.id).is_none()
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|tx| (tx.created_at, tx.id));
        Ok(candidates)
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), LedgerError> {
        self.savepoints.push((name.to_string(), self.working.clone()));
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), LedgerError> {
        let index = self.savepoint_index(name)?;
        self.savepoints.truncate(index);
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), LedgerError> {
        let index = self.savepoint_index(name)?;
        self.savepoints.truncate(index + 1);
        self.working = self.savepoints[index].1.clone();
        Ok(())
    }
}
