//! Confirming gateway over the raw ledger client.
//!
//! Mutating calls are serialized through a single signer lock and bounded by
//! a confirmation timeout. When the timeout fires the gateway asks the ledger
//! whether it holds a receipt for the call's idempotency key: a receipt
//! means the effect happened, its absence means it did not. Reads are retried
//! with linear backoff on transient failures; mutating calls never are.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::settlement::{
    domain::{
        EscrowId, EscrowSnapshot, IdempotencyKey, LedgerAddress, LedgerAmount, LedgerOperation,
        LedgerReceipt,
    },
    ports::{
        AllowanceAuthorizer, EscrowGateway, EscrowLedger, GatewayError, GatewayResult,
        LedgerResult,
    },
};

/// Timing policy for the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewaySettings {
    confirmation_timeout: Duration,
    authorization_settle_delay: Duration,
    read_retry_attempts: u32,
    read_retry_backoff: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewaySettings {
    /// Creates the default timing policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(60),
            authorization_settle_delay: Duration::from_secs(3),
            read_retry_attempts: 3,
            read_retry_backoff: Duration::from_millis(200),
        }
    }

    /// Sets how long a mutating call may take to confirm.
    #[must_use]
    pub const fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Sets the pause after an allowance increase before escrow opens.
    #[must_use]
    pub const fn with_authorization_settle_delay(mut self, delay: Duration) -> Self {
        self.authorization_settle_delay = delay;
        self
    }

    /// Sets how many times a failed read is retried.
    #[must_use]
    pub const fn with_read_retry_attempts(mut self, attempts: u32) -> Self {
        self.read_retry_attempts = attempts;
        self
    }

    /// Sets the base backoff between read retries.
    #[must_use]
    pub const fn with_read_retry_backoff(mut self, backoff: Duration) -> Self {
        self.read_retry_backoff = backoff;
        self
    }

    /// Confirmation timeout for mutating calls.
    #[must_use]
    pub const fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    /// Pause after an allowance increase.
    #[must_use]
    pub const fn authorization_settle_delay(&self) -> Duration {
        self.authorization_settle_delay
    }

    /// Retry budget for reads.
    #[must_use]
    pub const fn read_retry_attempts(&self) -> u32 {
        self.read_retry_attempts
    }

    /// Base backoff between read retries.
    #[must_use]
    pub const fn read_retry_backoff(&self) -> Duration {
        self.read_retry_backoff
    }
}

/// [`EscrowGateway`] implementation over an [`EscrowLedger`] client.
pub struct LedgerGateway<L, A>
where
    L: EscrowLedger,
    A: AllowanceAuthorizer,
{
    ledger: Arc<L>,
    authorizer: Arc<A>,
    settings: GatewaySettings,
    signer: Mutex<()>,
}

impl<L, A> LedgerGateway<L, A>
where
    L: EscrowLedger,
    A: AllowanceAuthorizer,
{
    /// Creates a gateway.
    #[must_use]
    pub fn new(ledger: Arc<L>, authorizer: Arc<A>, settings: GatewaySettings) -> Self {
        Self {
            ledger,
            authorizer,
            settings,
            signer: Mutex::new(()),
        }
    }

    /// Timing policy in effect.
    #[must_use]
    pub const fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    async fn read<T, F, Fut>(&self, what: &'static str, call: F) -> GatewayResult<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = LedgerResult<T>> + Send,
        T: Send,
    {
        let mut attempt: u32 = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.settings.read_retry_attempts => {
                    attempt = attempt.saturating_add(1);
                    warn!(read = what, attempt, error = %err, "retrying ledger read");
                    tokio::time::sleep(self.settings.read_retry_backoff.saturating_mul(attempt))
                        .await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn submit<F, Fut>(
        &self,
        operation: LedgerOperation,
        key: &IdempotencyKey,
        call: F,
    ) -> GatewayResult<LedgerReceipt>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = LedgerResult<LedgerReceipt>> + Send,
    {
        let _signer = self.signer.lock().await;
        match tokio::time::timeout(self.settings.confirmation_timeout, call()).await {
            Ok(Ok(receipt)) => {
                info!(
                    %operation,
                    %key,
                    reference = %receipt.reference,
                    replayed = receipt.replayed,
                    "ledger call confirmed"
                );
                Ok(receipt)
            }
            Ok(Err(err)) => {
                warn!(%operation, %key, error = %err, "ledger call failed");
                Err(err.into())
            }
            Err(_) => {
                warn!(
                    %operation,
                    %key,
                    timeout_ms = self.settings.confirmation_timeout.as_millis(),
                    "ledger confirmation timed out, looking up receipt"
                );
                let found = self
                    .read("receipt_for", || self.ledger.receipt_for(key))
                    .await?;
                found.ok_or_else(|| GatewayError::Unconfirmed {
                    operation,
                    key: key.clone(),
                })
            }
        }
    }
}

#[async_trait]
impl<L, A> EscrowGateway for LedgerGateway<L, A>
where
    L: EscrowLedger,
    A: AllowanceAuthorizer,
{
    fn escrow_address(&self) -> LedgerAddress {
        self.ledger.escrow_address()
    }

    async fn ensure_spendable(
        &self,
        owner: &LedgerAddress,
        amount: LedgerAmount,
    ) -> GatewayResult<()> {
        let balance = self
            .read("balance_of", || self.ledger.balance_of(owner))
            .await?;
        if balance < amount {
            return Err(GatewayError::InsufficientFunds {
                required: amount,
                available: balance,
            });
        }

        let spender = self.ledger.escrow_address();
        let allowance = self
            .read("allowance", || self.ledger.allowance(owner, &spender))
            .await?;
        if allowance >= amount {
            return Ok(());
        }

        warn!(
            %owner,
            %allowance,
            required = %amount,
            "allowance below escrow amount, requesting authorization"
        );
        let token = self.ledger.token_address();
        self.authorizer
            .raise_allowance(owner, &token, &spender)
            .await?;
        tokio::time::sleep(self.settings.authorization_settle_delay).await;
        Ok(())
    }

    async fn open_escrow(
        &self,
        creator: &LedgerAddress,
        amount: LedgerAmount,
        key: &IdempotencyKey,
    ) -> GatewayResult<(EscrowId, LedgerReceipt)> {
        let receipt = self
            .submit(LedgerOperation::OpenEscrow, key, || {
                self.ledger.open_escrow(creator, amount, key)
            })
            .await?;
        let escrow_id = receipt
            .escrow_id
            .ok_or_else(|| GatewayError::MissingEscrowId(receipt.reference.clone()))?;
        Ok((escrow_id, receipt))
    }

    async fn bind_counterparty(
        &self,
        escrow_id: EscrowId,
        executor: &LedgerAddress,
        key: &IdempotencyKey,
    ) -> GatewayResult<LedgerReceipt> {
        self.submit(LedgerOperation::BindCounterparty, key, || {
            self.ledger.bind_counterparty(escrow_id, executor, key)
        })
        .await
    }

    async fn release_fraction(
        &self,
        escrow_id: EscrowId,
        amount: LedgerAmount,
        key: &IdempotencyKey,
    ) -> GatewayResult<LedgerReceipt> {
        self.submit(LedgerOperation::ReleaseFraction, key, || {
            self.ledger.release_fraction(escrow_id, amount, key)
        })
        .await
    }

    async fn cancel(
        &self,
        escrow_id: EscrowId,
        executor_share: LedgerAmount,
        key: &IdempotencyKey,
    ) -> GatewayResult<LedgerReceipt> {
        self.submit(LedgerOperation::Cancel, key, || {
            self.ledger.cancel(escrow_id, executor_share, key)
        })
        .await
    }

    async fn get_balance(&self, address: &LedgerAddress) -> GatewayResult<LedgerAmount> {
        self.read("balance_of", || self.ledger.balance_of(address))
            .await
    }

    async fn get_allowance(
        &self,
        owner: &LedgerAddress,
        spender: &LedgerAddress,
    ) -> GatewayResult<LedgerAmount> {
        self.read("allowance", || self.ledger.allowance(owner, spender))
            .await
    }

    async fn escrow_snapshot(&self, escrow_id: EscrowId) -> GatewayResult<Option<EscrowSnapshot>> {
        self.read("escrow", || self.ledger.escrow(escrow_id)).await
    }
}
