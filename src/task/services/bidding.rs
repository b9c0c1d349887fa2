//! Bid submission and executor selection.

use super::error::{MarketplaceError, MarketplaceResult};
use super::lifecycle::{forbidden, state_conflict};
use super::reputation::ReputationPolicy;
use super::requests::SettledTransition;
use super::support::{LedgerEffect, diverged, require_caller, require_task, require_user};
use crate::settlement::domain::{EscrowId, IdempotencyKey, LedgerAddress, LedgerOperation};
use crate::settlement::ports::{EscrowGateway, GatewayError};
use crate::task::{
    domain::{Bid, BidStatus, Task, TaskId, TaskStatus, UserId},
    ports::{TaskStore, TaskStoreError, TaskTransition},
};
use mockable::Clock;
use std::sync::Arc;

/// Bidding and selection service.
#[derive(Clone)]
pub struct BiddingService<S, G, C>
where
    S: TaskStore,
    G: EscrowGateway,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    gateway: Arc<G>,
    clock: Arc<C>,
    policy: ReputationPolicy,
}

impl<S, G, C> BiddingService<S, G, C>
where
    S: TaskStore,
    G: EscrowGateway,
    C: Clock + Send + Sync,
{
    /// Creates a new bidding service.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        gateway: Arc<G>,
        clock: Arc<C>,
        policy: ReputationPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            policy,
        }
    }

    /// Places or revises the caller's bid on a task.
    ///
    /// The first bid on a `pending` task moves it to `bidding` in the same
    /// store transaction. A revision replaces the message and keeps the
    /// credit snapshot taken at the first bid.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::InsufficientReputation`] below the credit
    /// floor, [`MarketplaceError::Forbidden`] for the creator, and
    /// [`MarketplaceError::StateConflict`] once bidding has closed.
    /// [`MarketplaceError::MissingEscrow`] is returned while the escrow is
    /// still being opened.
    pub async fn submit_bid(
        &self,
        caller: &UserId,
        task_id: TaskId,
        message: &str,
    ) -> MarketplaceResult<Bid> {
        let bidder = require_caller(&*self.store, caller).await?;
        let task = require_task(&*self.store, task_id).await?;

        let score = bidder.credit().score();
        if !self.policy.allows_bidding(score) {
            return Err(MarketplaceError::InsufficientReputation {
                score,
                floor: self.policy.bid_credit_floor(),
            });
        }
        if task.is_creator(caller) {
            return Err(forbidden(caller, task_id, "bid on"));
        }
        if !matches!(task.status(), TaskStatus::Pending | TaskStatus::Bidding) {
            return Err(state_conflict(&task, "bid on"));
        }
        // A pending task only opens for bids once its escrow is recorded.
        if task.escrow_id().is_none() {
            return Err(MarketplaceError::MissingEscrow(task_id));
        }

        let bid = Bid::new(task_id, caller.clone(), message, score, &*self.clock);
        let opening = if task.status() == TaskStatus::Pending {
            let mut opened = task.clone();
            opened.open_bidding(&*self.clock)?;
            Some(TaskTransition::new(TaskStatus::Pending, opened))
        } else {
            None
        };

        let stored = match self.store.record_bid(&bid, opening.as_ref()).await {
            Ok(stored) => stored,
            Err(TaskStoreError::StateConflict { .. }) if opening.is_some() => {
                // Another first bid opened the task concurrently.
                let current = require_task(&*self.store, task_id).await?;
                if current.status() != TaskStatus::Bidding {
                    return Err(state_conflict(&current, "bid on"));
                }
                self.store.record_bid(&bid, None).await?
            }
            Err(err) => return Err(err.into()),
        };

        tracing::info!(
            task_id = %task_id,
            bidder = %caller,
            bid_id = %stored.id(),
            credit_snapshot = stored.credit_snapshot(),
            "bid recorded"
        );
        Ok(stored)
    }

    /// Selects the executor from the pending bids, binds them on the ledger
    /// and rejects every other pending bid.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::StateConflict`] unless the task is
    /// `bidding`, [`MarketplaceError::SelectionTaken`] when a concurrent
    /// selection bound the escrow first,
    /// [`MarketplaceError::BidNotFound`] without a pending bid from
    /// `bidder`, a ledger failure when binding fails, or a divergence when the
    /// binding succeeded but a different selection was recorded.
    pub async fn select_bidder(
        &self,
        caller: &UserId,
        task_id: TaskId,
        bidder: &UserId,
    ) -> MarketplaceResult<SettledTransition> {
        let task = require_task(&*self.store, task_id).await?;
        if !task.is_creator(caller) {
            return Err(forbidden(caller, task_id, "select a bidder for"));
        }
        if task.status() != TaskStatus::Bidding {
            return Err(state_conflict(&task, "select a bidder for"));
        }
        let bid = match self.store.find_bid(task_id, bidder).await? {
            Some(bid) if bid.status() == BidStatus::Pending => bid,
            Some(_) => {
                // The bid was settled by a selection that committed after the
                // status check above.
                let current = require_task(&*self.store, task_id).await?;
                if current.status() != TaskStatus::Bidding {
                    return Err(state_conflict(&current, "select a bidder for"));
                }
                return Err(MarketplaceError::BidNotFound {
                    task_id,
                    bidder: bidder.clone(),
                });
            }
            None => {
                return Err(MarketplaceError::BidNotFound {
                    task_id,
                    bidder: bidder.clone(),
                });
            }
        };
        let escrow_id = task
            .escrow_id()
            .ok_or(MarketplaceError::MissingEscrow(task_id))?;
        let executor = require_user(&*self.store, bidder).await?;

        let key = IdempotencyKey::for_operation(
            LedgerOperation::BindCounterparty,
            &[&task_id, bidder],
        );
        let receipt = match self
            .gateway
            .bind_counterparty(escrow_id, executor.ledger_address(), &key)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                tracing::warn!(task_id = %task_id, bidder = %bidder, error = %err, "bind failed");
                let address = executor.ledger_address();
                return Err(self.resolve_failed_bind(&task, escrow_id, address, err).await);
            }
        };

        let effect = LedgerEffect {
            task_id,
            escrow_id: Some(escrow_id),
            operation: LedgerOperation::BindCounterparty,
            receipt: &receipt,
            amount: None,
        };
        let mut accepted = task.clone();
        if let Err(err) = accepted.assign_executor(bidder.clone(), &*self.clock) {
            return Err(self.diverge(effect, err.to_string()).await);
        }
        let transition = TaskTransition::new(TaskStatus::Bidding, accepted);
        if let Err(err) = self.store.commit_selection(&transition, bid.id()).await {
            return Err(self.resolve_lost_selection(effect, bidder, err).await);
        }

        tracing::info!(
            task_id = %task_id,
            executor = %bidder,
            bid_id = %bid.id(),
            reference = %receipt.reference,
            "executor selected and bound"
        );
        Ok(SettledTransition {
            task: transition.task,
            reference: Some(receipt.reference),
            amount: None,
        })
    }

    async fn diverge(&self, effect: LedgerEffect<'_>, detail: String) -> MarketplaceError {
        diverged(&*self.store, &*self.clock, effect, detail).await
    }

    /// A bind refused because another selection already claimed the task or
    /// the escrow is a conflict, not a retryable ledger failure.
    async fn resolve_failed_bind(
        &self,
        task: &Task,
        escrow_id: EscrowId,
        executor: &LedgerAddress,
        err: GatewayError,
    ) -> MarketplaceError {
        let current = self.store.find_task(task.id()).await.ok().flatten();
        if let Some(moved) = current.filter(|current| current.status() != TaskStatus::Bidding) {
            return state_conflict(&moved, "select a bidder for");
        }
        match self.gateway.escrow_snapshot(escrow_id).await {
            Ok(Some(snapshot))
                if snapshot
                    .executor
                    .as_ref()
                    .is_some_and(|bound| bound != executor) =>
            {
                MarketplaceError::SelectionTaken {
                    task_id: task.id(),
                }
            }
            _ => err.into(),
        }
    }

    /// A concurrent selection of the same bidder leaves the ledger binding
    /// correct; any other outcome leaves the ledger bound to someone the
    /// store does not know about.
    async fn resolve_lost_selection(
        &self,
        effect: LedgerEffect<'_>,
        bidder: &UserId,
        err: TaskStoreError,
    ) -> MarketplaceError {
        let current = self.store.find_task(effect.task_id).await.ok().flatten();
        match current {
            Some(task) if task.is_executor(bidder) => state_conflict(&task, "select a bidder for"),
            _ => self.diverge(effect, err.to_string()).await,
        }
    }
}
