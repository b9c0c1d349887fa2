//! Settlement against the external value-transfer ledger.
//!
//! This module owns everything that touches money: fixed-point payment
//! arithmetic, the ledger and allowance-authorization port contracts, and the
//! gateway service that turns raw ledger calls into confirmed-or-failed
//! operations. It follows the same hexagonal layout as [`crate::task`]:
//!
//! - Domain types and the payment calculator in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - The confirming gateway in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
