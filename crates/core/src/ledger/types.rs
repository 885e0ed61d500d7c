//! Ledger domain types.
//!
//! Transactions move points between two users. The shape of the movement is
//! decided by the transaction kind, resolved through the type catalog.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{AuditEntryId, TransactionId, TransactionTypeId, UserId};

/// The closed set of transaction shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Transfer settled at creation: sender pays receiver.
    Direct,
    /// Transfer recorded pending; on settlement the receiver pays the sender.
    Deferred,
    /// Compensating record that reverses a settled Deferred transfer.
    Cancellation,
}

impl TransactionKind {
    /// Returns the lowercase name used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Deferred => "deferred",
            Self::Cancellation => "cancellation",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Recorded, effect not applied yet.
    Pending,
    /// Effect applied.
    Settled,
}

impl TransactionStatus {
    /// Returns the lowercase name used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Settled => "settled",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog key of the built-in Direct type.
pub const DIRECT_TYPE: TransactionTypeId = TransactionTypeId(1);
/// Catalog key of the built-in Deferred type.
pub const DEFERRED_TYPE: TransactionTypeId = TransactionTypeId(2);
/// Catalog key of the built-in Cancellation type.
pub const CANCELLATION_TYPE: TransactionTypeId = TransactionTypeId(3);

/// Entry of the transaction type catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionType {
    /// Catalog key.
    pub id: TransactionTypeId,
    /// Display name.
    pub name: String,
    /// Shape of the transactions of this type.
    pub kind: TransactionKind,
}

/// A persisted ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier.
    pub id: TransactionId,
    /// Sending party.
    pub sender_id: UserId,
    /// Receiving party.
    pub receiver_id: UserId,
    /// Catalog type.
    pub type_id: TransactionTypeId,
    /// Kind resolved from the catalog type.
    pub kind: TransactionKind,
    /// Amount moved, never negative.
    pub amount: Decimal,
    /// Deferred transaction reversed by this one. Set only on Cancellations.
    pub counter_transaction_id: Option<TransactionId>,
    /// Free-form note.
    pub note: Option<String>,
    /// Lifecycle state.
    pub status: TransactionStatus,
    /// Sender balance right after the effect was applied.
    pub sender_balance_after: Option<Decimal>,
    /// Receiver balance right after the effect was applied.
    pub receiver_balance_after: Option<Decimal>,
    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
    /// When the transaction was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Returns true if the balance effect of this transaction is currently applied.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.kind == TransactionKind::Direct || self.status == TransactionStatus::Settled
    }

    /// Returns true if the transaction touches the given user.
    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.sender_id == user || self.receiver_id == user
    }
}

/// Input for creating a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransactionInput {
    /// Sending party.
    pub sender_id: UserId,
    /// Receiving party.
    pub receiver_id: UserId,
    /// Catalog type.
    pub type_id: TransactionTypeId,
    /// Amount to move.
    pub amount: Decimal,
    /// Deferred transaction to cancel. Required for Cancellations only.
    #[serde(default)]
    pub counter_transaction_id: Option<TransactionId>,
    /// Free-form note.
    #[serde(default)]
    pub note: Option<String>,
}

/// Partial update of a transaction. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTransactionInput {
    /// New sending party.
    #[serde(default)]
    pub sender_id: Option<UserId>,
    /// New receiving party.
    #[serde(default)]
    pub receiver_id: Option<UserId>,
    /// New catalog type.
    #[serde(default)]
    pub type_id: Option<TransactionTypeId>,
    /// New amount.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// New note.
    #[serde(default)]
    pub note: Option<String>,
}

/// A user and their current point balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Current balance. May go negative.
    pub balance: Decimal,
}

/// Append-only record of balances after a balance-affecting event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier.
    pub id: AuditEntryId,
    /// Transaction the event belongs to. May no longer exist.
    pub transaction_id: TransactionId,
    /// Sender balance after the event.
    pub sender_balance_after: Decimal,
    /// Receiver balance after the event.
    pub receiver_balance_after: Decimal,
    /// When the event was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Ids removed by a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    /// The deleted transaction.
    pub transaction_id: TransactionId,
    /// Its Cancellation, deleted along with it.
    pub cancellation_id: Option<TransactionId>,
    /// Whether any balance moved.
    pub balances_reverted: bool,
}

/// One batch settlement item that could not be settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementFailure {
    /// The Deferred transaction.
    pub id: TransactionId,
    /// Why it failed.
    pub reason: String,
}

impl std::fmt::Display for SettlementFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}: {}", self.id, self.reason)
    }
}

/// Result of a batch settlement run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettleReport {
    /// Transactions settled and committed.
    pub succeeded: usize,
    /// Eligible transactions found.
    pub total: usize,
    /// Items that failed, in processing order.
    pub failures: Vec<SettlementFailure>,
}
