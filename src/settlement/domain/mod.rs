//! Domain model for ledger settlement.
//!
//! Amounts are carried as integers in the ledger's smallest unit and only
//! converted to decimals at the store boundary. Nothing here performs I/O.

mod amount;
pub mod calculator;
mod error;
mod ledger;

pub use amount::{BASIS_POINTS_TOTAL, BasisPoints, DISPLAY_DECIMALS, LEDGER_DECIMALS, LedgerAmount};
pub use error::SettlementError;
pub use ledger::{
    EscrowId, EscrowSnapshot, IdempotencyKey, LedgerAddress, LedgerOperation, LedgerReceipt,
    TxReference,
};
