//! Ledger error types.
//!
//! Every engine failure belongs to one of four categories. The category
//! decides the HTTP status; the variant decides the error code.

use tally_shared::AppError;
use tally_shared::types::{TransactionId, TransactionTypeId, UserId};
use thiserror::Error;

use super::types::SettlementFailure;

/// Broad class of a ledger error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Client input is malformed. Nothing changed.
    Validation,
    /// A referenced user or transaction does not exist.
    NotFound,
    /// The request is well-formed but the current state forbids it.
    Conflict,
    /// Store or engine failure.
    Internal,
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// A required field is absent.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Sender and receiver are the same user.
    #[error("Sender and receiver must be different users")]
    SameSenderReceiver,

    /// Amount is not a decimal number.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Amount is negative.
    #[error("Amount cannot be negative")]
    NegativeAmount,

    /// Type id is not in the catalog.
    #[error("Unknown transaction type: {0}")]
    UnknownTransactionType(TransactionTypeId),

    /// Cancellation without a counter-transaction reference.
    #[error("A cancellation requires counter_transaction_id")]
    CounterTransactionRequired,

    /// Counter-transaction reference on a non-Cancellation.
    #[error("counter_transaction_id is only allowed on cancellations")]
    CounterTransactionNotAllowed,

    /// Update tried to turn a transaction into a Cancellation.
    #[error("A transaction cannot be converted into a cancellation")]
    CannotConvertToCancellation,

    /// Batch create with no items.
    #[error("At least one transaction is required")]
    EmptyBatch,

    // ========== Not Found Errors ==========
    /// User not found.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Transaction not found.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// The Deferred transaction a Cancellation points to does not exist.
    #[error("Counter transaction not found: {0}")]
    CounterTransactionNotFound(TransactionId),

    // ========== State Errors ==========
    /// Deferred transaction is no longer pending.
    #[error("Transaction {0} is already settled")]
    AlreadySettled(TransactionId),

    /// Only Deferred transactions can be settled.
    #[error("Transaction {0} is not a deferred transaction and cannot be settled")]
    NotSettleable(TransactionId),

    /// Cancellations cannot be edited or deleted directly.
    #[error(
        "Transaction {0} is a cancellation; delete the deferred transaction it references instead"
    )]
    CancellationImmutable(TransactionId),

    /// A Cancellation may only reference a Deferred transaction.
    #[error("Counter transaction {0} is not a deferred transaction")]
    CounterNotDeferred(TransactionId),

    /// Deferred transaction already has a Cancellation.
    #[error("Transaction {0} has been cancelled")]
    AlreadyCancelled(TransactionId),

    /// Applying a delta would push a balance outside the storable range.
    #[error("Balance of user {0} would leave the supported range")]
    BalanceOutOfRange(UserId),

    /// Batch settlement settled nothing and at least one item failed.
    #[error("Batch settlement failed for all {} transaction(s)", failures.len())]
    BatchSettlementFailed {
        /// Per-item failures.
        failures: Vec<SettlementFailure>,
    },

    // ========== Concurrency Errors ==========
    /// Serialization failure or deadlock in the store.
    #[error("Concurrent modification detected, please retry")]
    ConcurrentModification,

    // ========== Database Errors ==========
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Returns the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingField(_)
            | Self::SameSenderReceiver
            | Self::InvalidAmount(_)
            | Self::NegativeAmount
            | Self::UnknownTransactionType(_)
            | Self::CounterTransactionRequired
            | Self::CounterTransactionNotAllowed
            | Self::CannotConvertToCancellation
            | Self::EmptyBatch => ErrorCategory::Validation,

            Self::UserNotFound(_)
            | Self::TransactionNotFound(_)
            | Self::CounterTransactionNotFound(_) => ErrorCategory::NotFound,

            Self::AlreadySettled(_)
            | Self::NotSettleable(_)
            | Self::CancellationImmutable(_)
            | Self::CounterNotDeferred(_)
            | Self::AlreadyCancelled(_)
            | Self::BalanceOutOfRange(_)
            | Self::BatchSettlementFailed { .. }
            | Self::ConcurrentModification => ErrorCategory::Conflict,

            Self::Database(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "MISSING_FIELD",
            Self::SameSenderReceiver => "SAME_SENDER_RECEIVER",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::NegativeAmount => "NEGATIVE_AMOUNT",
            Self::UnknownTransactionType(_) => "UNKNOWN_TRANSACTION_TYPE",
            Self::CounterTransactionRequired => "COUNTER_TRANSACTION_REQUIRED",
            Self::CounterTransactionNotAllowed => "COUNTER_TRANSACTION_NOT_ALLOWED",
            Self::CannotConvertToCancellation => "CANNOT_CONVERT_TO_CANCELLATION",
            Self::EmptyBatch => "EMPTY_BATCH",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            Self::CounterTransactionNotFound(_) => "COUNTER_TRANSACTION_NOT_FOUND",
            Self::AlreadySettled(_) => "ALREADY_SETTLED",
            Self::NotSettleable(_) => "NOT_SETTLEABLE",
            Self::CancellationImmutable(_) => "CANCELLATION_IMMUTABLE",
            Self::CounterNotDeferred(_) => "COUNTER_NOT_DEFERRED",
            Self::AlreadyCancelled(_) => "ALREADY_CANCELLED",
            Self::BalanceOutOfRange(_) => "BALANCE_OUT_OF_RANGE",
            Self::BatchSettlementFailed { .. } => "BATCH_SETTLEMENT_FAILED",
            Self::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::Validation => 400,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Conflict => 409,
            ErrorCategory::Internal => 500,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification)
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err.category() {
            ErrorCategory::Validation => Self::Validation(err.to_string()),
            ErrorCategory::NotFound => Self::NotFound(err.to_string()),
            ErrorCategory::Conflict => Self::Conflict(err.to_string()),
            ErrorCategory::Internal => match err {
                LedgerError::Database(msg) => Self::Database(msg),
                other => Self::Internal(other.to_string()),
            },
        }
    }
}
