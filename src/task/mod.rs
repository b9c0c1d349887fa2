//! Task lifecycle, bidding and reputation.
//!
//! Tasks move from `pending` through bidding and executor selection into
//! three reviewed milestones, ending `completed` or `cancelled`. Services in
//! [`services`] sequence each transition with its ledger effect. The module
//! follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
