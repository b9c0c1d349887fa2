//! In-memory escrow ledger.
//!
//! Models the escrow contract closely enough to exercise the gateway and the
//! lifecycle services: token balances, allowances, escrows, idempotent
//! receipts, and injectable latency and failures.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::settlement::{
    domain::{
        EscrowId, EscrowSnapshot, IdempotencyKey, LedgerAddress, LedgerAmount, LedgerOperation,
        LedgerReceipt, TxReference,
    },
    ports::{EscrowLedger, LedgerError, LedgerResult},
};

/// When injected latency is applied relative to the effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyPhase {
    /// Sleep before applying, so a timed-out caller leaves no effect.
    BeforeApply,
    /// Apply first, then sleep, so a timed-out caller leaves the effect in
    /// place with a receipt recorded.
    AfterApply,
}

/// Thread-safe in-memory ledger.
#[derive(Debug, Clone)]
pub struct InMemoryEscrowLedger {
    escrow_address: LedgerAddress,
    token_address: LedgerAddress,
    state: Arc<Mutex<LedgerState>>,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<LedgerAddress, LedgerAmount>,
    allowances: HashMap<(LedgerAddress, LedgerAddress), LedgerAmount>,
    escrows: BTreeMap<EscrowId, EscrowSnapshot>,
    receipts: HashMap<IdempotencyKey, LedgerReceipt>,
    next_escrow: u64,
    next_tx: u64,
    scripted_failures: HashMap<LedgerOperation, VecDeque<LedgerError>>,
    read_failures: VecDeque<LedgerError>,
    latency: HashMap<LedgerOperation, (Duration, LatencyPhase)>,
    applied: HashMap<LedgerOperation, usize>,
}

impl LedgerState {
    fn next_reference(&mut self) -> TxReference {
        self.next_tx += 1;
        TxReference::new(format!("0x{:064x}", self.next_tx))
    }

    fn balance(&self, address: &LedgerAddress) -> LedgerAmount {
        self.balances.get(address).copied().unwrap_or_default()
    }

    fn credit(&mut self, address: &LedgerAddress, amount: LedgerAmount) -> LedgerResult<()> {
        let entry = self.balances.entry(address.clone()).or_default();
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Rejected("balance overflow".to_owned()))?;
        Ok(())
    }

    fn escrow_mut(&mut self, escrow_id: EscrowId) -> LedgerResult<&mut EscrowSnapshot> {
        let escrow = self
            .escrows
            .get_mut(&escrow_id)
            .ok_or(LedgerError::EscrowNotFound(escrow_id))?;
        if escrow.cancelled {
            return Err(LedgerError::Rejected(format!(
                "escrow {escrow_id} is cancelled"
            )));
        }
        Ok(escrow)
    }
}

impl InMemoryEscrowLedger {
    /// Creates an empty ledger with the given contract addresses.
    #[must_use]
    pub fn new(escrow_address: LedgerAddress, token_address: LedgerAddress) -> Self {
        Self {
            escrow_address,
            token_address,
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credits `amount` to `address` out of thin air.
    pub fn fund(&self, address: &LedgerAddress, amount: LedgerAmount) {
        let mut state = self.lock();
        let entry = state.balances.entry(address.clone()).or_default();
        *entry = entry.checked_add(amount).unwrap_or(LedgerAmount::MAX);
    }

    /// Sets the allowance `owner` grants to `spender`.
    pub fn approve(&self, owner: &LedgerAddress, spender: &LedgerAddress, amount: LedgerAmount) {
        self.lock()
            .allowances
            .insert((owner.clone(), spender.clone()), amount);
    }

    /// Makes the next call to `operation` fail with `error` without effect.
    pub fn fail_next(&self, operation: LedgerOperation, error: LedgerError) {
        self.lock()
            .scripted_failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Makes the next read fail with `error`.
    pub fn fail_next_read(&self, error: LedgerError) {
        self.lock().read_failures.push_back(error);
    }

    /// Delays every call to `operation`.
    pub fn set_latency(&self, operation: LedgerOperation, delay: Duration, phase: LatencyPhase) {
        self.lock().latency.insert(operation, (delay, phase));
    }

    /// Removes injected latency for `operation`.
    pub fn clear_latency(&self, operation: LedgerOperation) {
        self.lock().latency.remove(&operation);
    }

    /// Number of times `operation` has taken effect, replays excluded.
    #[must_use]
    pub fn applied_count(&self, operation: LedgerOperation) -> usize {
        self.lock().applied.get(&operation).copied().unwrap_or_default()
    }

    /// Current balance of `address`.
    #[must_use]
    pub fn balance(&self, address: &LedgerAddress) -> LedgerAmount {
        self.lock().balance(address)
    }

    fn read_state<T>(&self, read: impl FnOnce(&LedgerState) -> T) -> LedgerResult<T> {
        let mut state = self.lock();
        if let Some(error) = state.read_failures.pop_front() {
            return Err(error);
        }
        Ok(read(&state))
    }

    async fn mutate<F>(
        &self,
        operation: LedgerOperation,
        key: &IdempotencyKey,
        apply: F,
    ) -> LedgerResult<LedgerReceipt>
    where
        F: FnOnce(&mut LedgerState) -> LedgerResult<LedgerReceipt> + Send,
    {
        let latency = self.lock().latency.get(&operation).copied();
        if let Some((delay, LatencyPhase::BeforeApply)) = latency {
            tokio::time::sleep(delay).await;
        }

        let receipt = {
            let mut state = self.lock();
            if let Some(existing) = state.receipts.get(key) {
                return Ok(existing.clone().into_replay());
            }
            if let Some(error) = state
                .scripted_failures
                .get_mut(&operation)
                .and_then(VecDeque::pop_front)
            {
                return Err(error);
            }
            let fresh = apply(&mut *state)?;
            state.receipts.insert(key.clone(), fresh.clone());
            *state.applied.entry(operation).or_default() += 1;
            fresh
        };

        if let Some((delay, LatencyPhase::AfterApply)) = latency {
            tokio::time::sleep(delay).await;
        }
        Ok(receipt)
    }
}

#[async_trait]
impl EscrowLedger for InMemoryEscrowLedger {
    fn escrow_address(&self) -> LedgerAddress {
        self.escrow_address.clone()
    }

    fn token_address(&self) -> LedgerAddress {
        self.token_address.clone()
    }

    async fn open_escrow(
        &self,
        creator: &LedgerAddress,
        amount: LedgerAmount,
        key: &IdempotencyKey,
    ) -> LedgerResult<LedgerReceipt> {
        let spender = self.escrow_address.clone();
        let creator_address = creator.clone();
        self.mutate(LedgerOperation::OpenEscrow, key, move |state| {
            let allowance_key = (creator_address.clone(), spender);
            let allowance = state
                .allowances
                .get(&allowance_key)
                .copied()
                .unwrap_or_default();
            if allowance < amount {
                return Err(LedgerError::Rejected(format!(
                    "allowance {allowance} below escrow amount {amount}"
                )));
            }
            let remaining_balance = state
                .balance(&creator_address)
                .checked_sub(amount)
                .ok_or_else(|| {
                    LedgerError::Rejected(format!("balance below escrow amount {amount}"))
                })?;

            state
                .balances
                .insert(creator_address.clone(), remaining_balance);
            if allowance != LedgerAmount::MAX {
                state
                    .allowances
                    .insert(allowance_key, allowance.saturating_sub(amount));
            }

            state.next_escrow += 1;
            let escrow_id = EscrowId::new(state.next_escrow);
            state.escrows.insert(
                escrow_id,
                EscrowSnapshot {
                    escrow_id,
                    creator: creator_address,
                    executor: None,
                    total: amount,
                    paid: LedgerAmount::ZERO,
                    cancelled: false,
                },
            );
            Ok(LedgerReceipt::new(state.next_reference()).with_escrow(escrow_id))
        })
        .await
    }

    async fn bind_counterparty(
        &self,
        escrow_id: EscrowId,
        executor: &LedgerAddress,
        key: &IdempotencyKey,
    ) -> LedgerResult<LedgerReceipt> {
        let executor_address = executor.clone();
        self.mutate(LedgerOperation::BindCounterparty, key, move |state| {
            let escrow = state.escrow_mut(escrow_id)?;
            if let Some(bound) = &escrow.executor {
                return Err(LedgerError::Rejected(format!(
                    "escrow {escrow_id} already bound to {bound}"
                )));
            }
            escrow.executor = Some(executor_address);
            Ok(LedgerReceipt::new(state.next_reference()))
        })
        .await
    }

    async fn release_fraction(
        &self,
        escrow_id: EscrowId,
        amount: LedgerAmount,
        key: &IdempotencyKey,
    ) -> LedgerResult<LedgerReceipt> {
        self.mutate(LedgerOperation::ReleaseFraction, key, move |state| {
            let escrow = state.escrow_mut(escrow_id)?;
            let executor = escrow.executor.clone().ok_or_else(|| {
                LedgerError::Rejected(format!("escrow {escrow_id} has no executor"))
            })?;
            let paid = escrow
                .paid
                .checked_add(amount)
                .filter(|paid| *paid <= escrow.total)
                .ok_or_else(|| {
                    LedgerError::Rejected(format!(
                        "release of {amount} exceeds escrow {escrow_id}"
                    ))
                })?;
            escrow.paid = paid;
            state.credit(&executor, amount)?;
            Ok(LedgerReceipt::new(state.next_reference()))
        })
        .await
    }

    async fn cancel(
        &self,
        escrow_id: EscrowId,
        executor_share: LedgerAmount,
        key: &IdempotencyKey,
    ) -> LedgerResult<LedgerReceipt> {
        self.mutate(LedgerOperation::Cancel, key, move |state| {
            let escrow = state.escrow_mut(escrow_id)?;
            let remaining = escrow.remaining();
            let refund = remaining.checked_sub(executor_share).ok_or_else(|| {
                LedgerError::Rejected(format!(
                    "executor share {executor_share} exceeds remaining {remaining}"
                ))
            })?;
            let executor = escrow.executor.clone();
            let creator = escrow.creator.clone();
            escrow.cancelled = true;
            escrow.paid = escrow
                .paid
                .checked_add(executor_share)
                .unwrap_or(escrow.total);

            if !executor_share.is_zero() {
                let bound = executor.ok_or_else(|| {
                    LedgerError::Rejected(format!("escrow {escrow_id} has no executor"))
                })?;
                state.credit(&bound, executor_share)?;
            }
            state.credit(&creator, refund)?;
            Ok(LedgerReceipt::new(state.next_reference()))
        })
        .await
    }

    async fn balance_of(&self, address: &LedgerAddress) -> LedgerResult<LedgerAmount> {
        self.read_state(|state| state.balance(address))
    }

    async fn allowance(
        &self,
        owner: &LedgerAddress,
        spender: &LedgerAddress,
    ) -> LedgerResult<LedgerAmount> {
        self.read_state(|state| {
            state
                .allowances
                .get(&(owner.clone(), spender.clone()))
                .copied()
                .unwrap_or_default()
        })
    }

    async fn escrow(&self, escrow_id: EscrowId) -> LedgerResult<Option<EscrowSnapshot>> {
        self.read_state(|state| state.escrows.get(&escrow_id).cloned())
    }

    async fn receipt_for(&self, key: &IdempotencyKey) -> LedgerResult<Option<LedgerReceipt>> {
        self.read_state(|state| state.receipts.get(key).cloned())
    }
}
