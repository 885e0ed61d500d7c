//! Ledger engine: transaction lifecycle and balance mutation.
//!
//! Every operation runs inside a [`LedgerScope`] owned by the caller. The
//! engine validates, decides which balance effects to apply or reverse,
//! routes every balance change through [`LedgerScope::apply_delta`] and
//! writes the record and audit entry. It never commits; on error the caller
//! drops the scope and nothing is kept.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tally_shared::types::{TransactionId, UserId};
use tracing::info;

use super::effect::{BalanceEffect, effect_of, moves_balances, net_deltas};
use super::error::LedgerError;
use super::store::LedgerScope;
use super::types::{
    CreateTransactionInput, DeleteOutcome, Transaction, TransactionKind, TransactionStatus,
    UpdateTransactionInput, UserBalance,
};
use super::validation::{validate_amount, validate_parties};

/// Ledger engine.
///
/// Stateless; all state lives behind the scope passed to each call.
pub struct LedgerEngine;

impl LedgerEngine {
    /// Creates a transaction.
    ///
    /// - Direct: sender pays receiver immediately; created `Settled`.
    /// - Deferred: recorded `Pending`; balances untouched until settled.
    /// - Cancellation: copies parties and amount from the referenced Deferred
    ///   transaction. If that transaction is settled its effect is reversed
    ///   and the Cancellation is created `Settled`; otherwise nothing moves
    ///   and the Cancellation blocks later settlement.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input, `UserNotFound` or
    /// `CounterTransactionNotFound` for missing references, and a conflict
    /// error when the referenced transaction cannot be cancelled.
    pub async fn create<S>(
        scope: &mut S,
        input: CreateTransactionInput,
    ) -> Result<Transaction, LedgerError>
    where
        S: LedgerScope + ?Sized,
    {
        // A Cancellation's record takes parties and amount from its target,
        // but the request must still be well-formed on its own.
        validate_parties(input.sender_id, input.receiver_id)?;
        validate_amount(input.amount)?;

        let tx_type = scope
            .find_transaction_type(input.type_id)
            .await?
            .ok_or(LedgerError::UnknownTransactionType(input.type_id))?;

        if tx_type.kind != TransactionKind::Cancellation && input.counter_transaction_id.is_some() {
            return Err(LedgerError::CounterTransactionNotAllowed);
        }

        Self::require_user(scope, input.sender_id).await?;
        Self::require_user(scope, input.receiver_id).await?;

        let now = Utc::now();
        let mut tx = Transaction {
            id: TransactionId::new(),
            sender_id: input.sender_id,
            receiver_id: input.receiver_id,
            type_id: tx_type.id,
            kind: tx_type.kind,
            amount: input.amount,
            counter_transaction_id: None,
            note: input.note,
            status: TransactionStatus::Pending,
            sender_balance_after: None,
            receiver_balance_after: None,
            created_at: now,
            updated_at: now,
        };

        match tx_type.kind {
            TransactionKind::Direct => {
                let effect =
                    BalanceEffect::of_kind(tx.kind, tx.sender_id, tx.receiver_id, tx.amount);
                let balances = Self::apply_effects(scope, &[effect]).await?;
                tx.status = TransactionStatus::Settled;
                Self::record_balances(&mut tx, &balances)?;
            }
            TransactionKind::Deferred => {}
            TransactionKind::Cancellation => {
                let counter_id = input
                    .counter_transaction_id
                    .ok_or(LedgerError::CounterTransactionRequired)?;
                let target = Self::cancellable_target(scope, counter_id).await?;

                tx.sender_id = target.sender_id;
                tx.receiver_id = target.receiver_id;
                tx.amount = target.amount;
                tx.counter_transaction_id = Some(target.id);

                if target.status == TransactionStatus::Settled {
                    let effect =
                        BalanceEffect::of_kind(tx.kind, tx.sender_id, tx.receiver_id, tx.amount);
                    let balances = Self::apply_effects(scope, &[effect]).await?;
                    tx.status = TransactionStatus::Settled;
                    Self::record_balances(&mut tx, &balances)?;
                }
            }
        }

        scope.insert_transaction(&tx).await?;
        if let (Some(sender_after), Some(receiver_after)) =
            (tx.sender_balance_after, tx.receiver_balance_after)
        {
            scope.append_audit(tx.id, sender_after, receiver_after).await?;
        }

        info!(
            transaction_id = %tx.id,
            kind = %tx.kind,
            status = %tx.status,
            amount = %tx.amount,
            "transaction created"
        );
        Ok(tx)
    }

    /// Creates several transactions in the same scope.
    ///
    /// Items are created in order, so later items may cancel Deferred
    /// transactions created earlier in the list. The first failure aborts
    /// the whole list.
    ///
    /// # Errors
    ///
    /// Returns `EmptyBatch` for an empty list, or the first item's error.
    pub async fn create_many<S>(
        scope: &mut S,
        inputs: Vec<CreateTransactionInput>,
    ) -> Result<Vec<Transaction>, LedgerError>
    where
        S: LedgerScope + ?Sized,
    {
        if inputs.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }

        let mut created = Vec::with_capacity(inputs.len());
        for input in inputs {
            created.push(Self::create(scope, input).await?);
        }
        Ok(created)
    }

    /// Updates a transaction, moving balances so they match the new shape.
    ///
    /// The effect the transaction had is reversed and the effect it now has
    /// is applied, both as one ordered set of deltas. A Direct transaction
    /// turned Deferred goes back to `Pending`; a settled Deferred stays
    /// settled with its new parties and amount.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound`, `CancellationImmutable` for
    /// Cancellations, `AlreadyCancelled` for a Deferred that has a
    /// Cancellation, and validation errors for bad input.
    pub async fn update<S>(
        scope: &mut S,
        id: TransactionId,
        input: UpdateTransactionInput,
    ) -> Result<Transaction, LedgerError>
    where
        S: LedgerScope + ?Sized,
    {
        let current = scope
            .find_transaction(id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(id))?;

        if current.kind == TransactionKind::Cancellation {
            return Err(LedgerError::CancellationImmutable(id));
        }

        let (type_id, kind) = match input.type_id {
            Some(type_id) => {
                let tx_type = scope
                    .find_transaction_type(type_id)
                    .await?
                    .ok_or(LedgerError::UnknownTransactionType(type_id))?;
                (tx_type.id, tx_type.kind)
            }
            None => (current.type_id, current.kind),
        };
        if kind == TransactionKind::Cancellation {
            return Err(LedgerError::CannotConvertToCancellation);
        }

        let sender_id = input.sender_id.unwrap_or(current.sender_id);
        let receiver_id = input.receiver_id.unwrap_or(current.receiver_id);
        validate_parties(sender_id, receiver_id)?;
        let amount = input.amount.unwrap_or(current.amount);
        validate_amount(amount)?;

        Self::require_user(scope, sender_id).await?;
        Self::require_user(scope, receiver_id).await?;

        if current.kind == TransactionKind::Deferred
            && scope.find_cancellation_of(id).await?.is_some()
        {
            return Err(LedgerError::AlreadyCancelled(id));
        }

        let reversal = effect_of(&current).map(|effect| effect.reversed());
        let reapply = kind == TransactionKind::Direct
            || (kind == TransactionKind::Deferred
                && current.status == TransactionStatus::Settled
                && current.kind != TransactionKind::Direct);
        let new_effect =
            reapply.then(|| BalanceEffect::of_kind(kind, sender_id, receiver_id, amount));

        let status = match kind {
            TransactionKind::Direct => TransactionStatus::Settled,
            TransactionKind::Deferred if current.kind == TransactionKind::Direct => {
                TransactionStatus::Pending
            }
            _ => current.status,
        };

        let effects: Vec<BalanceEffect> = reversal.into_iter().chain(new_effect).collect();
        let moved = moves_balances(&net_deltas(&effects)?);
        let balances = Self::apply_effects(scope, &effects).await?;

        let mut updated = Transaction {
            sender_id,
            receiver_id,
            type_id,
            kind,
            amount,
            note: input.note.or(current.note.clone()),
            status,
            sender_balance_after: None,
            receiver_balance_after: None,
            updated_at: Utc::now(),
            ..current.clone()
        };
        if new_effect.is_some() {
            Self::record_balances(&mut updated, &balances)?;
        }

        scope.save_transaction(&updated).await?;

        if moved {
            let (audit_sender, audit_receiver) = match new_effect {
                Some(_) => (updated.sender_id, updated.receiver_id),
                None => (current.sender_id, current.receiver_id),
            };
            scope
                .append_audit(
                    updated.id,
                    Self::balance_of(&balances, audit_sender)?,
                    Self::balance_of(&balances, audit_receiver)?,
                )
                .await?;
        }

        info!(
            transaction_id = %updated.id,
            kind = %updated.kind,
            status = %updated.status,
            balances_moved = moved,
            "transaction updated"
        );
        Ok(updated)
    }

    /// Deletes a transaction and its Cancellation, reversing what they applied.
    ///
    /// The effects of the transaction and of its Cancellation are summed
    /// before reversal. A settled Deferred with an applied Cancellation
    /// therefore moves nothing.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound`, or `CancellationImmutable` when asked to
    /// delete a Cancellation directly.
    pub async fn delete<S>(scope: &mut S, id: TransactionId) -> Result<DeleteOutcome, LedgerError>
    where
        S: LedgerScope + ?Sized,
    {
        let tx = scope
            .find_transaction(id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(id))?;

        if tx.kind == TransactionKind::Cancellation {
            return Err(LedgerError::CancellationImmutable(id));
        }

        let cancellation = if tx.kind == TransactionKind::Deferred {
            scope.find_cancellation_of(id).await?
        } else {
            None
        };

        let reversals: Vec<BalanceEffect> = effect_of(&tx)
            .into_iter()
            .chain(cancellation.as_ref().and_then(effect_of))
            .map(|effect| effect.reversed())
            .collect();
        let moved = moves_balances(&net_deltas(&reversals)?);

        if moved {
            let balances = Self::apply_effects(scope, &reversals).await?;
            scope
                .append_audit(
                    tx.id,
                    Self::balance_of(&balances, tx.sender_id)?,
                    Self::balance_of(&balances, tx.receiver_id)?,
                )
                .await?;
        }

        if let Some(cancellation) = &cancellation {
            scope.delete_transaction(cancellation.id).await?;
        }
        scope.delete_transaction(tx.id).await?;

        info!(
            transaction_id = %tx.id,
            cancellation_id = ?cancellation.as_ref().map(|c| c.id),
            balances_reverted = moved,
            "transaction deleted"
        );
        Ok(DeleteOutcome {
            transaction_id: tx.id,
            cancellation_id: cancellation.map(|c| c.id),
            balances_reverted: moved,
        })
    }

    /// Settles a pending Deferred transaction: the receiver pays the sender.
    ///
    /// # Errors
    ///
    /// Returns `NotSettleable` for non-Deferred transactions,
    /// `AlreadySettled` if it is no longer pending (including when another
    /// writer settled it first), and `AlreadyCancelled` if a Cancellation
    /// references it.
    pub async fn settle<S>(scope: &mut S, id: TransactionId) -> Result<Transaction, LedgerError>
    where
        S: LedgerScope + ?Sized,
    {
        let tx = scope
            .find_transaction(id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(id))?;

        if tx.kind != TransactionKind::Deferred {
            return Err(LedgerError::NotSettleable(id));
        }
        if tx.status == TransactionStatus::Settled {
            return Err(LedgerError::AlreadySettled(id));
        }

        Self::settle_pending(scope, tx).await
    }

    /// Settles a Deferred transaction already known to be pending.
    pub(crate) async fn settle_pending<S>(
        scope: &mut S,
        mut tx: Transaction,
    ) -> Result<Transaction, LedgerError>
    where
        S: LedgerScope + ?Sized,
    {
        if scope.find_cancellation_of(tx.id).await?.is_some() {
            return Err(LedgerError::AlreadyCancelled(tx.id));
        }

        let flipped = scope
            .transition_status(tx.id, TransactionStatus::Pending, TransactionStatus::Settled)
            .await?;
        if !flipped {
            return Err(LedgerError::AlreadySettled(tx.id));
        }

        let effect = BalanceEffect::of_kind(
            TransactionKind::Deferred,
            tx.sender_id,
            tx.receiver_id,
            tx.amount,
        );
        let balances = Self::apply_effects(scope, &[effect]).await?;

        tx.status = TransactionStatus::Settled;
        tx.updated_at = Utc::now();
        Self::record_balances(&mut tx, &balances)?;
        scope.save_transaction(&tx).await?;

        let sender_after = Self::balance_of(&balances, tx.sender_id)?;
        let receiver_after = Self::balance_of(&balances, tx.receiver_id)?;
        scope.append_audit(tx.id, sender_after, receiver_after).await?;

        info!(transaction_id = %tx.id, amount = %tx.amount, "transaction settled");
        Ok(tx)
    }

    async fn require_user<S>(scope: &mut S, id: UserId) -> Result<UserBalance, LedgerError>
    where
        S: LedgerScope + ?Sized,
    {
        scope
            .find_user(id)
            .await?
            .ok_or(LedgerError::UserNotFound(id))
    }

    /// Loads the Deferred transaction a new Cancellation will reference.
    async fn cancellable_target<S>(
        scope: &mut S,
        counter_id: TransactionId,
    ) -> Result<Transaction, LedgerError>
    where
        S: LedgerScope + ?Sized,
    {
        let target = scope
            .find_transaction(counter_id)
            .await?
            .ok_or(LedgerError::CounterTransactionNotFound(counter_id))?;

        if target.kind != TransactionKind::Deferred {
            return Err(LedgerError::CounterNotDeferred(counter_id));
        }
        if scope.find_cancellation_of(counter_id).await?.is_some() {
            return Err(LedgerError::AlreadyCancelled(counter_id));
        }
        Ok(target)
    }

    /// Applies the summed deltas of `effects` in ascending user id order.
    ///
    /// Returns the resulting balance of every user touched.
    async fn apply_effects<S>(
        scope: &mut S,
        effects: &[BalanceEffect],
    ) -> Result<BTreeMap<UserId, Decimal>, LedgerError>
    where
        S: LedgerScope + ?Sized,
    {
        let mut balances = BTreeMap::new();
        for (user, delta) in net_deltas(effects)? {
            let balance = scope.apply_delta(user, delta).await?;
            balances.insert(user, balance);
        }
        Ok(balances)
    }

    fn balance_of(
        balances: &BTreeMap<UserId, Decimal>,
        user: UserId,
    ) -> Result<Decimal, LedgerError> {
        balances
            .get(&user)
            .copied()
            .ok_or_else(|| LedgerError::Internal(format!("no balance recorded for user {user}")))
    }

    fn record_balances(
        tx: &mut Transaction,
        balances: &BTreeMap<UserId, Decimal>,
    ) -> Result<(), LedgerError> {
        tx.sender_balance_after = Some(Self::balance_of(balances, tx.sender_id)?);
        tx.receiver_balance_after = Some(Self::balance_of(balances, tx.receiver_id)?);
        Ok(())
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
