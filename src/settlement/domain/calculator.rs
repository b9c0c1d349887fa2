//! Milestone payment arithmetic.
//!
//! All conversions go through integer smallest units. Reward amounts arrive
//! as [`Decimal`] values, are scaled to [`LEDGER_DECIMALS`] fractional digits,
//! and shares are applied with a floor division so a payment never exceeds
//! its share of the reward.

use super::{
    BASIS_POINTS_TOTAL, BasisPoints, DISPLAY_DECIMALS, LEDGER_DECIMALS, LedgerAmount,
    SettlementError,
};
use rust_decimal::Decimal;

/// Converts a decimal amount into ledger smallest units.
///
/// Digits beyond [`LEDGER_DECIMALS`] are truncated.
///
/// # Errors
///
/// Returns [`SettlementError::NegativeAmount`] for negative input and
/// [`SettlementError::Overflow`] when the scaled value exceeds `u128`.
pub fn to_ledger_units(amount: Decimal) -> Result<LedgerAmount, SettlementError> {
    let mantissa =
        u128::try_from(amount.mantissa()).map_err(|_| SettlementError::NegativeAmount(amount))?;
    let scale = amount.scale();

    let units = if scale > LEDGER_DECIMALS {
        mantissa.checked_div(power_of_ten(scale - LEDGER_DECIMALS)?)
    } else {
        mantissa.checked_mul(power_of_ten(LEDGER_DECIMALS - scale)?)
    };

    units.map(LedgerAmount::new).ok_or(SettlementError::Overflow)
}

/// Computes `floor(reward_units * share / 10000)`.
///
/// # Errors
///
/// Returns [`SettlementError`] when the reward cannot be converted into
/// ledger units.
pub fn milestone_payment(
    reward: Decimal,
    share: BasisPoints,
) -> Result<LedgerAmount, SettlementError> {
    let reward_units = to_ledger_units(reward)?;
    apply_share(reward_units, share)
}

/// Applies a basis-point share to an amount already in ledger units.
///
/// The amount is split into whole and partial basis-point blocks so the
/// product never exceeds the amount itself; any `u128` amount is accepted.
///
/// # Errors
///
/// Returns [`SettlementError::Overflow`] only if the share exceeds the whole,
/// which [`BasisPoints`] rules out.
pub fn apply_share(
    amount: LedgerAmount,
    share: BasisPoints,
) -> Result<LedgerAmount, SettlementError> {
    let total = u128::from(BASIS_POINTS_TOTAL);
    let share = u128::from(share.value());
    let units = amount.units();
    let whole = units
        .checked_div(total)
        .and_then(|blocks| blocks.checked_mul(share));
    let partial = units
        .checked_rem(total)
        .and_then(|rest| rest.checked_mul(share))
        .and_then(|rest| rest.checked_div(total));
    whole
        .zip(partial)
        .and_then(|(whole, partial)| whole.checked_add(partial))
        .map(LedgerAmount::new)
        .ok_or(SettlementError::Overflow)
}

/// Converts ledger units into a decimal with [`DISPLAY_DECIMALS`] fractional
/// digits, truncating any finer precision.
///
/// # Errors
///
/// Returns [`SettlementError::Overflow`] when the value exceeds the decimal
/// range.
pub fn to_display_decimal(amount: LedgerAmount) -> Result<Decimal, SettlementError> {
    let divisor = power_of_ten(LEDGER_DECIMALS - DISPLAY_DECIMALS)?;
    let truncated = amount
        .units()
        .checked_div(divisor)
        .ok_or(SettlementError::Overflow)?;
    let signed = i128::try_from(truncated).map_err(|_| SettlementError::Overflow)?;
    Decimal::try_from_i128_with_scale(signed, DISPLAY_DECIMALS)
        .map_err(|_| SettlementError::Overflow)
}

fn power_of_ten(exponent: u32) -> Result<u128, SettlementError> {
    10_u128
        .checked_pow(exponent)
        .ok_or(SettlementError::Overflow)
}
