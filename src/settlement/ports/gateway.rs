//! Confirmed ledger gateway consumed by the task lifecycle services.

use super::{AuthorizerError, LedgerError};
use crate::settlement::domain::{
    EscrowId, EscrowSnapshot, IdempotencyKey, LedgerAddress, LedgerAmount, LedgerOperation,
    LedgerReceipt, TxReference,
};
use async_trait::async_trait;
use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Narrow, confirmed interface over the external ledger.
///
/// Each mutating operation either returns a receipt for an effect the ledger
/// has durably accepted or fails with an error meaning the effect did not
/// happen. There is no third, ambiguous outcome.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EscrowGateway: Send + Sync {
    /// Address creators must authorize as spender before escrow opens.
    fn escrow_address(&self) -> LedgerAddress;

    /// Verifies `owner` can fund `amount`, raising the allowance through the
    /// authorization service when the balance covers it.
    async fn ensure_spendable(&self, owner: &LedgerAddress, amount: LedgerAmount)
    -> GatewayResult<()>;

    /// Opens an escrow funded by `creator`.
    async fn open_escrow(
        &self,
        creator: &LedgerAddress,
        amount: LedgerAmount,
        key: &IdempotencyKey,
    ) -> GatewayResult<(EscrowId, LedgerReceipt)>;

    /// Binds the executor to an escrow.
    async fn bind_counterparty(
        &self,
        escrow_id: EscrowId,
        executor: &LedgerAddress,
        key: &IdempotencyKey,
    ) -> GatewayResult<LedgerReceipt>;

    /// Releases a milestone payment.
    async fn release_fraction(
        &self,
        escrow_id: EscrowId,
        amount: LedgerAmount,
        key: &IdempotencyKey,
    ) -> GatewayResult<LedgerReceipt>;

    /// Cancels the escrow and splits what remains.
    async fn cancel(
        &self,
        escrow_id: EscrowId,
        executor_share: LedgerAmount,
        key: &IdempotencyKey,
    ) -> GatewayResult<LedgerReceipt>;

    /// Reads a token balance.
    async fn get_balance(&self, address: &LedgerAddress) -> GatewayResult<LedgerAmount>;

    /// Reads an allowance.
    async fn get_allowance(
        &self,
        owner: &LedgerAddress,
        spender: &LedgerAddress,
    ) -> GatewayResult<LedgerAmount>;

    /// Reads the authoritative escrow state.
    async fn escrow_snapshot(&self, escrow_id: EscrowId) -> GatewayResult<Option<EscrowSnapshot>>;
}

/// Errors returned by the gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The owner's balance does not cover the requested amount.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientFunds {
        /// Amount requested in ledger units.
        required: LedgerAmount,
        /// Balance available in ledger units.
        available: LedgerAmount,
    },

    /// The ledger call failed without effect.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The allowance authorization service failed.
    #[error(transparent)]
    Authorization(#[from] AuthorizerError),

    /// Confirmation timed out and the ledger holds no receipt for the key.
    #[error("{operation} was not confirmed in time and the ledger has no receipt for key {key}")]
    Unconfirmed {
        /// Operation that timed out.
        operation: LedgerOperation,
        /// Idempotency key that was queried.
        key: IdempotencyKey,
    },

    /// The ledger confirmed escrow creation without naming the escrow.
    #[error("escrow creation {0} confirmed without an escrow identifier")]
    MissingEscrowId(TxReference),
}
