//! Balance effects of transactions.
//!
//! An effect is the pair of signed deltas a transaction applies to its two
//! parties. Reversing a transaction applies the negated effect.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::UserId;

use super::error::LedgerError;
use super::types::{Transaction, TransactionKind, TransactionStatus};

/// Signed balance movement of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEffect {
    /// Sending party.
    pub sender_id: UserId,
    /// Receiving party.
    pub receiver_id: UserId,
    /// Delta applied to the sender.
    pub sender_delta: Decimal,
    /// Delta applied to the receiver.
    pub receiver_delta: Decimal,
}

impl BalanceEffect {
    /// The effect of a transaction of `kind` between the given parties.
    ///
    /// Direct and Cancellation move `amount` from sender to receiver.
    /// A settled Deferred moves it the other way.
    #[must_use]
    pub fn of_kind(
        kind: TransactionKind,
        sender_id: UserId,
        receiver_id: UserId,
        amount: Decimal,
    ) -> Self {
        let sender_delta = match kind {
            TransactionKind::Direct | TransactionKind::Cancellation => -amount,
            TransactionKind::Deferred => amount,
        };
        Self {
            sender_id,
            receiver_id,
            sender_delta,
            receiver_delta: -sender_delta,
        }
    }

    /// Returns the negated effect.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            sender_delta: -self.sender_delta,
            receiver_delta: -self.receiver_delta,
        }
    }

    /// Returns the deltas in ascending user id order.
    ///
    /// Applying deltas in this order makes concurrent writers lock the same
    /// balance rows in the same order.
    #[must_use]
    pub fn deltas(&self) -> [(UserId, Decimal); 2] {
        let sender = (self.sender_id, self.sender_delta);
        let receiver = (self.receiver_id, self.receiver_delta);
        if self.sender_id <= self.receiver_id {
            [sender, receiver]
        } else {
            [receiver, sender]
        }
    }
}

/// Returns the effect the transaction currently has on balances, if any.
#[must_use]
pub fn effect_of(tx: &Transaction) -> Option<BalanceEffect> {
    tx.is_applied()
        .then(|| BalanceEffect::of_kind(tx.kind, tx.sender_id, tx.receiver_id, tx.amount))
}

/// Returns the effect a transaction with the given shape would have.
#[must_use]
pub fn effect_for(
    kind: TransactionKind,
    status: TransactionStatus,
    sender_id: UserId,
    receiver_id: UserId,
    amount: Decimal,
) -> Option<BalanceEffect> {
    (kind == TransactionKind::Direct || status == TransactionStatus::Settled)
        .then(|| BalanceEffect::of_kind(kind, sender_id, receiver_id, amount))
}

/// Sums several effects into per-user deltas.
///
/// Every party of every effect has an entry, even when its net is zero.
/// The map iterates in ascending user id order.
///
/// # Errors
///
/// Returns `BalanceOutOfRange` if a user's net delta overflows.
pub fn net_deltas<'a, I>(effects: I) -> Result<BTreeMap<UserId, Decimal>, LedgerError>
where
    I: IntoIterator<Item = &'a BalanceEffect>,
{
    let mut net: BTreeMap<UserId, Decimal> = BTreeMap::new();
    for effect in effects {
        for (user, delta) in effect.deltas() {
            let sum = net.entry(user).or_insert(Decimal::ZERO);
            *sum = sum
                .checked_add(delta)
                .ok_or(LedgerError::BalanceOutOfRange(user))?;
        }
    }
    Ok(net)
}

/// Returns true if applying the net deltas would change any balance.
#[must_use]
pub fn moves_balances(net: &BTreeMap<UserId, Decimal>) -> bool {
    net.values().any(|delta| !delta.is_zero())
}
