//! Error types for settlement arithmetic and ledger value parsing.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors returned while constructing or converting settlement values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettlementError {
    /// A monetary amount was negative.
    #[error("amount must not be negative, got {0}")]
    NegativeAmount(Decimal),

    /// An intermediate value did not fit in the ledger's integer range.
    #[error("amount overflows the ledger's integer range")]
    Overflow,

    /// A basis-point share exceeded the whole.
    #[error("share of {0} basis points exceeds 10000")]
    ShareOutOfRange(u32),

    /// A ledger address was malformed.
    #[error("invalid ledger address '{0}', expected 0x followed by 40 hex digits")]
    InvalidAddress(String),

    /// An idempotency key was empty.
    #[error("idempotency key must not be empty")]
    EmptyIdempotencyKey,

    /// A stored ledger operation name was not recognized.
    #[error("unknown ledger operation '{0}'")]
    UnknownOperation(String),
}
