//! Fixed-point ledger amounts and basis-point shares.

use super::SettlementError;
use std::fmt;

/// Number of fractional digits in the ledger's smallest unit.
pub const LEDGER_DECIMALS: u32 = 18;

/// Fractional digits kept when mirroring ledger amounts into the task store.
pub const DISPLAY_DECIMALS: u32 = 8;

/// Basis points representing the whole of an amount.
pub const BASIS_POINTS_TOTAL: u32 = 10_000;

/// Amount expressed in the ledger's smallest indivisible unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LedgerAmount(u128);

impl LedgerAmount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// The largest representable amount, used for unlimited allowances.
    pub const MAX: Self = Self(u128::MAX);

    /// Wraps a raw smallest-unit value.
    #[must_use]
    pub const fn new(units: u128) -> Self {
        Self(units)
    }

    /// Returns the raw smallest-unit value.
    #[must_use]
    pub const fn units(self) -> u128 {
        self.0
    }

    /// Returns `true` when the amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Subtracts `other`, returning `None` if the result would be negative.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(difference) => Some(Self(difference)),
            None => None,
        }
    }

    /// Subtracts `other`, clamping at zero.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for LedgerAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A share of a whole expressed in basis points (1/10000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BasisPoints(u32);

impl BasisPoints {
    /// Creates a validated share.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError::ShareOutOfRange`] when the value exceeds
    /// [`BASIS_POINTS_TOTAL`].
    pub const fn new(value: u32) -> Result<Self, SettlementError> {
        match Self::checked(value) {
            Some(points) => Ok(points),
            None => Err(SettlementError::ShareOutOfRange(value)),
        }
    }

    /// Creates a share, returning `None` when it exceeds the whole.
    #[must_use]
    pub const fn checked(value: u32) -> Option<Self> {
        if value > BASIS_POINTS_TOTAL {
            return None;
        }
        Some(Self(value))
    }

    /// Returns the share in basis points.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bp", self.0)
    }
}
