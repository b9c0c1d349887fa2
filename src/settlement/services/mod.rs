//! Settlement services.

mod gateway;

pub use gateway::{GatewaySettings, LedgerGateway};
