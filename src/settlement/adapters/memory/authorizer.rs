//! In-memory allowance authorizer backed by [`InMemoryEscrowLedger`].

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::InMemoryEscrowLedger;
use crate::settlement::{
    domain::{LedgerAddress, LedgerAmount},
    ports::{AllowanceAuthorizer, AuthorizerError, AuthorizerResult},
};

/// Grants unlimited allowances directly on an in-memory ledger.
#[derive(Debug, Clone)]
pub struct InMemoryAllowanceAuthorizer {
    ledger: InMemoryEscrowLedger,
    calls: Arc<AtomicUsize>,
    refusing: Arc<AtomicBool>,
}

impl InMemoryAllowanceAuthorizer {
    /// Creates an authorizer that writes allowances into `ledger`.
    #[must_use]
    pub fn new(ledger: InMemoryEscrowLedger) -> Self {
        Self {
            ledger,
            calls: Arc::new(AtomicUsize::new(0)),
            refusing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes subsequent requests fail with [`AuthorizerError::Refused`].
    pub fn refuse_requests(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of allowance requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AllowanceAuthorizer for InMemoryAllowanceAuthorizer {
    async fn raise_allowance(
        &self,
        owner: &LedgerAddress,
        _token: &LedgerAddress,
        spender: &LedgerAddress,
    ) -> AuthorizerResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(AuthorizerError::Refused(format!(
                "allowance for {owner} refused"
            )));
        }
        self.ledger.approve(owner, spender, LedgerAmount::MAX);
        Ok(())
    }
}
