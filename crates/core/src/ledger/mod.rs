//! Point ledger logic.
//!
//! This module implements the transaction lifecycle:
//! - Domain types for transactions, types, and audit entries
//! - Balance effects per transaction kind and status
//! - Input validation
//! - The store contract (`LedgerScope`) the engine runs against
//! - The ledger engine (create, update, delete, settle)
//! - Batch settlement
//! - An in-memory store

pub mod effect;
pub mod engine;
pub mod error;
pub mod memory;
pub mod settlement;
pub mod store;
pub mod types;
pub mod validation;

#[cfg(test)]
mod ledger_props;

pub use effect::{BalanceEffect, effect_for, effect_of};
pub use engine::LedgerEngine;
pub use error::{ErrorCategory, LedgerError};
pub use memory::{InMemoryLedger, InMemoryScope};
pub use settlement::SettlementProcessor;
pub use store::LedgerScope;
pub use types::{
    AuditEntry, BatchSettleReport, CANCELLATION_TYPE, CreateTransactionInput, DEFERRED_TYPE,
    DIRECT_TYPE, DeleteOutcome, SettlementFailure, Transaction, TransactionKind,
    TransactionStatus, TransactionType, UpdateTransactionInput, UserBalance,
};
pub use validation::{AMOUNT_LIMIT, parse_amount};
