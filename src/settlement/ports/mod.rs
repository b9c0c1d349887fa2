//! Port contracts for ledger settlement.
//!
//! [`EscrowLedger`] is the raw client boundary over the value-transfer
//! ledger. [`AllowanceAuthorizer`] is the external service that raises a
//! creator's spending allowance. [`EscrowGateway`] is the confirmed,
//! policy-enforcing surface consumed by the task services.

pub mod authorizer;
pub mod gateway;
pub mod ledger;

pub use authorizer::{AllowanceAuthorizer, AuthorizerError, AuthorizerResult};
pub use gateway::{EscrowGateway, GatewayError, GatewayResult};
#[cfg(test)]
pub use gateway::MockEscrowGateway;
pub use ledger::{EscrowLedger, LedgerError, LedgerResult};
