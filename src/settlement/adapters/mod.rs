//! Adapter implementations for settlement ports.

pub mod http;
pub mod memory;

pub use http::HttpAllowanceAuthorizer;
