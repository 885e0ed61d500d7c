//! Input validation for ledger operations.
//!
//! These checks run before the engine touches the store.

use std::str::FromStr;

use rust_decimal::Decimal;
use tally_shared::types::UserId;

use super::error::LedgerError;

/// Decimal places a stored amount can carry.
pub const MAX_AMOUNT_SCALE: u32 = 4;

/// Exclusive bound on the magnitude of amounts and balances: `10^16`.
///
/// Stored as `NUMERIC(20,4)`, which leaves 16 integer digits.
pub const AMOUNT_LIMIT: Decimal = Decimal::from_parts(0x6FC1_0000, 0x0023_86F2, 0, false, 0);

/// Parses a decimal amount transported as a string.
///
/// # Errors
///
/// Returns `InvalidAmount` if the text is not a decimal number or does not
/// fit the stored precision, and `NegativeAmount` if it is below zero.
pub fn parse_amount(raw: &str) -> Result<Decimal, LedgerError> {
    let trimmed = raw.trim();
    let amount = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| LedgerError::InvalidAmount(raw.to_string()))?;
    validate_amount(amount)?;
    Ok(amount)
}

/// Validates that an amount is not negative and fits the stored precision.
/// Zero is allowed.
///
/// # Errors
///
/// Returns `NegativeAmount` if the amount is below zero and `InvalidAmount`
/// if it has more than [`MAX_AMOUNT_SCALE`] decimal places or reaches
/// [`AMOUNT_LIMIT`].
pub fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(LedgerError::NegativeAmount);
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE || amount >= AMOUNT_LIMIT {
        return Err(LedgerError::InvalidAmount(amount.to_string()));
    }
    Ok(())
}

/// Adds `delta` to `balance`, failing when the result leaves the storable range.
///
/// # Errors
///
/// Returns `BalanceOutOfRange` for `user` on overflow or when the magnitude
/// of the result reaches [`AMOUNT_LIMIT`].
pub fn checked_balance(
    user: UserId,
    balance: Decimal,
    delta: Decimal,
) -> Result<Decimal, LedgerError> {
    balance
        .checked_add(delta)
        .filter(|next| next.abs() < AMOUNT_LIMIT)
        .ok_or(LedgerError::BalanceOutOfRange(user))
}

/// Validates that sender and receiver differ.
///
/// # Errors
///
/// Returns `SameSenderReceiver` if both ids are equal.
pub fn validate_parties(sender_id: UserId, receiver_id: UserId) -> Result<(), LedgerError> {
    if sender_id == receiver_id {
        return Err(LedgerError::SameSenderReceiver);
    }
    Ok(())
}
