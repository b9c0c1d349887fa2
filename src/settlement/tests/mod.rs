//! Unit tests for settlement arithmetic and the confirming gateway.

use crate::settlement::domain::LedgerAddress;


/// Builds a deterministic address whose last byte is `seed`.
fn address(seed: u8) -> LedgerAddress {
    LedgerAddress::new(format!("0x{seed:040x}")).expect("generated address is valid")
}
