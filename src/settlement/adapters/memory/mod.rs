//! In-memory settlement adapters for tests and local runs.

mod authorizer;
mod ledger;

pub use authorizer::InMemoryAllowanceAuthorizer;
pub use ledger::{InMemoryEscrowLedger, LatencyPhase};
