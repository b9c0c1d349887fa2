//! Identifiers and value types exchanged with the external ledger.

use super::{LedgerAmount, SettlementError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account address on the external ledger, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LedgerAddress(String);

impl LedgerAddress {
    const HEX_DIGITS: usize = 40;

    /// Creates a validated address.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError::InvalidAddress`] unless the value is `0x`
    /// followed by exactly 40 hexadecimal digits.
    pub fn new(value: impl Into<String>) -> Result<Self, SettlementError> {
        let raw = value.into();
        let trimmed = raw.trim();
        let Some(digits) = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        else {
            return Err(SettlementError::InvalidAddress(raw));
        };
        if digits.len() != Self::HEX_DIGITS || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(SettlementError::InvalidAddress(raw));
        }
        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    /// Returns the address as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LedgerAddress {
    type Error = SettlementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LedgerAddress> for String {
    fn from(value: LedgerAddress) -> Self {
        value.0
    }
}

impl fmt::Display for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an escrow held by the external ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EscrowId(u64);

impl EscrowId {
    /// Wraps a ledger-assigned escrow number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the ledger-assigned escrow number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EscrowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key attached to a mutating ledger call so replays return the first
/// receipt instead of moving funds twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Creates a key from a non-empty value.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError::EmptyIdempotencyKey`] for blank input.
    pub fn new(value: impl Into<String>) -> Result<Self, SettlementError> {
        let raw = value.into();
        if raw.trim().is_empty() {
            return Err(SettlementError::EmptyIdempotencyKey);
        }
        Ok(Self(raw))
    }

    /// Builds a key from an operation and the identifiers that make the
    /// transition unique.
    #[must_use]
    pub fn for_operation(operation: LedgerOperation, parts: &[&dyn fmt::Display]) -> Self {
        let mut key = operation.key_prefix().to_owned();
        for part in parts {
            key.push(':');
            key.push_str(&part.to_string());
        }
        Self(key)
    }

    /// Returns the key as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction reference returned by the ledger for a confirmed call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxReference(String);

impl TxReference {
    /// Wraps a ledger transaction reference.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the reference as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mutating ledger operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOperation {
    /// Lock creator funds in a new escrow.
    OpenEscrow,
    /// Bind the executor to an escrow.
    BindCounterparty,
    /// Pay part of the escrow to the executor.
    ReleaseFraction,
    /// Close the escrow and refund what remains.
    Cancel,
}

impl LedgerOperation {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenEscrow => "open_escrow",
            Self::BindCounterparty => "bind_counterparty",
            Self::ReleaseFraction => "release_fraction",
            Self::Cancel => "cancel",
        }
    }

    const fn key_prefix(self) -> &'static str {
        match self {
            Self::OpenEscrow => "open",
            Self::BindCounterparty => "bind",
            Self::ReleaseFraction => "release",
            Self::Cancel => "cancel",
        }
    }
}

impl TryFrom<&str> for LedgerOperation {
    type Error = SettlementError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "open_escrow" => Ok(Self::OpenEscrow),
            "bind_counterparty" => Ok(Self::BindCounterparty),
            "release_fraction" => Ok(Self::ReleaseFraction),
            "cancel" => Ok(Self::Cancel),
            _ => Err(SettlementError::UnknownOperation(value.to_owned())),
        }
    }
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confirmation of a mutating ledger call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReceipt {
    /// Ledger transaction reference.
    pub reference: TxReference,
    /// Escrow created by the call, set only for [`LedgerOperation::OpenEscrow`].
    pub escrow_id: Option<EscrowId>,
    /// `true` when the idempotency key had already been used and this is the
    /// original receipt rather than a new effect.
    pub replayed: bool,
}

impl LedgerReceipt {
    /// Creates a receipt for a fresh effect.
    #[must_use]
    pub const fn new(reference: TxReference) -> Self {
        Self {
            reference,
            escrow_id: None,
            replayed: false,
        }
    }

    /// Attaches the escrow created by the call.
    #[must_use]
    pub const fn with_escrow(mut self, escrow_id: EscrowId) -> Self {
        self.escrow_id = Some(escrow_id);
        self
    }

    /// Marks this receipt as a replay of an earlier call.
    #[must_use]
    pub const fn into_replay(mut self) -> Self {
        self.replayed = true;
        self
    }
}

/// Authoritative view of an escrow read from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowSnapshot {
    /// Escrow identifier.
    pub escrow_id: EscrowId,
    /// Address that funded the escrow.
    pub creator: LedgerAddress,
    /// Bound counterparty, if any.
    pub executor: Option<LedgerAddress>,
    /// Amount locked when the escrow opened.
    pub total: LedgerAmount,
    /// Cumulative amount released to the executor.
    pub paid: LedgerAmount,
    /// Whether the escrow has been cancelled.
    pub cancelled: bool,
}

impl EscrowSnapshot {
    /// Amount still locked in the escrow.
    #[must_use]
    pub const fn remaining(&self) -> LedgerAmount {
        if self.cancelled {
            return LedgerAmount::ZERO;
        }
        self.total.saturating_sub(self.paid)
    }
}
