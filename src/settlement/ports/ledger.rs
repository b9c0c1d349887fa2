//! Raw client port for the external value-transfer ledger.

use crate::settlement::domain::{
    EscrowId, EscrowSnapshot, IdempotencyKey, LedgerAddress, LedgerAmount, LedgerReceipt,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for ledger client operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger client contract.
///
/// Every mutating call carries an [`IdempotencyKey`]. Implementations must
/// return the original receipt, marked as replayed, when a key is reused
/// instead of applying the effect again.
#[async_trait]
pub trait EscrowLedger: Send + Sync {
    /// Address of the escrow contract, the spender creators must authorize.
    fn escrow_address(&self) -> LedgerAddress;

    /// Address of the token held in escrow.
    fn token_address(&self) -> LedgerAddress;

    /// Locks `amount` from `creator` in a new escrow.
    async fn open_escrow(
        &self,
        creator: &LedgerAddress,
        amount: LedgerAmount,
        key: &IdempotencyKey,
    ) -> LedgerResult<LedgerReceipt>;

    /// Binds the executor that milestone payments are released to.
    async fn bind_counterparty(
        &self,
        escrow_id: EscrowId,
        executor: &LedgerAddress,
        key: &IdempotencyKey,
    ) -> LedgerResult<LedgerReceipt>;

    /// Releases `amount` from the escrow to its executor.
    async fn release_fraction(
        &self,
        escrow_id: EscrowId,
        amount: LedgerAmount,
        key: &IdempotencyKey,
    ) -> LedgerResult<LedgerReceipt>;

    /// Cancels the escrow, paying `executor_share` to the executor and
    /// refunding the remainder to the creator.
    async fn cancel(
        &self,
        escrow_id: EscrowId,
        executor_share: LedgerAmount,
        key: &IdempotencyKey,
    ) -> LedgerResult<LedgerReceipt>;

    /// Reads the token balance of an address.
    async fn balance_of(&self, address: &LedgerAddress) -> LedgerResult<LedgerAmount>;

    /// Reads how much `spender` may move on behalf of `owner`.
    async fn allowance(
        &self,
        owner: &LedgerAddress,
        spender: &LedgerAddress,
    ) -> LedgerResult<LedgerAmount>;

    /// Reads the authoritative state of an escrow.
    async fn escrow(&self, escrow_id: EscrowId) -> LedgerResult<Option<EscrowSnapshot>>;

    /// Looks up the receipt recorded for an idempotency key.
    async fn receipt_for(&self, key: &IdempotencyKey) -> LedgerResult<Option<LedgerReceipt>>;
}

/// Errors returned by ledger client implementations.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The ledger definitively rejected the call; no effect was applied.
    #[error("ledger rejected the call: {0}")]
    Rejected(String),

    /// The escrow does not exist on the ledger.
    #[error("escrow {0} not found on the ledger")]
    EscrowNotFound(EscrowId),

    /// The signer has too many unconfirmed transactions in flight.
    #[error("pending transaction limit exceeded for {0}")]
    PendingLimitExceeded(LedgerAddress),

    /// The ledger could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(Arc<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    /// Wraps a transport failure.
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Arc::new(err))
    }

    /// Returns `true` for failures worth retrying on idempotent reads.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::PendingLimitExceeded(_))
    }
}
