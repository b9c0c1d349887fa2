//! Reputation policy and user account service.

use super::error::{MarketplaceError, MarketplaceResult};
use crate::settlement::domain::LedgerAddress;
use crate::task::{
    domain::{
        CreditHistoryEntry, ReputationChange, ReputationReason, TaskId, TaskStatus, UserAccount,
        UserId,
    },
    ports::TaskStore,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Default credit awarded to an executor on completion.
pub const DEFAULT_COMPLETION_BONUS: i64 = 100;

/// Default minimum credit score required to bid.
pub const DEFAULT_BID_CREDIT_FLOOR: i64 = 0;

/// Credit rules applied on completion, cancellation and bidding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReputationPolicy {
    completion_bonus: i64,
    bid_credit_floor: i64,
}

impl Default for ReputationPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReputationPolicy {
    /// Creates the default policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            completion_bonus: DEFAULT_COMPLETION_BONUS,
            bid_credit_floor: DEFAULT_BID_CREDIT_FLOOR,
        }
    }

    /// Sets the completion bonus.
    #[must_use]
    pub const fn with_completion_bonus(mut self, bonus: i64) -> Self {
        self.completion_bonus = bonus;
        self
    }

    /// Sets the bidding floor.
    #[must_use]
    pub const fn with_bid_credit_floor(mut self, floor: i64) -> Self {
        self.bid_credit_floor = floor;
        self
    }

    /// Returns the completion bonus.
    #[must_use]
    pub const fn completion_bonus(&self) -> i64 {
        self.completion_bonus
    }

    /// Returns the bidding floor.
    #[must_use]
    pub const fn bid_credit_floor(&self) -> i64 {
        self.bid_credit_floor
    }

    /// Returns `true` when `score` meets the bidding floor.
    #[must_use]
    pub const fn allows_bidding(&self, score: i64) -> bool {
        score >= self.bid_credit_floor
    }

    /// Credit the executor loses for walking away at `status`.
    ///
    /// `final_submitted` stays in the top bucket.
    #[must_use]
    pub const fn cancellation_penalty(status: TaskStatus) -> i64 {
        match status {
            TaskStatus::DesignApproved | TaskStatus::ImplementationSubmitted => 100,
            TaskStatus::ImplementationApproved | TaskStatus::FinalSubmitted => 200,
            TaskStatus::Pending
            | TaskStatus::Bidding
            | TaskStatus::Accepted
            | TaskStatus::DesignSubmitted
            | TaskStatus::Completed
            | TaskStatus::Cancelled => 0,
        }
    }

    /// Builds the completion reward for `executor`.
    #[must_use]
    pub fn completion_change(
        &self,
        executor: &UserId,
        task_id: TaskId,
        at: DateTime<Utc>,
    ) -> ReputationChange {
        ReputationChange {
            user_id: executor.clone(),
            task_id,
            delta: self.completion_bonus,
            reason: ReputationReason::TaskCompleted,
            recorded_at: at,
        }
    }

    /// Builds the penalty for an executor cancelling at `status`, or `None`
    /// when no penalty applies.
    #[must_use]
    pub fn cancellation_change(
        executor: &UserId,
        task_id: TaskId,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Option<ReputationChange> {
        let penalty = Self::cancellation_penalty(status);
        (penalty > 0).then(|| ReputationChange {
            user_id: executor.clone(),
            task_id,
            delta: penalty.saturating_neg(),
            reason: ReputationReason::ExecutorCancelled,
            recorded_at: at,
        })
    }
}

/// Registers users and exposes their credit records.
#[derive(Clone)]
pub struct ReputationService<S>
where
    S: TaskStore,
{
    store: Arc<S>,
}

impl<S> ReputationService<S>
where
    S: TaskStore,
{
    /// Creates a new reputation service.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Registers a user with a fresh credit profile.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Store`] when the user already exists or
    /// persistence fails.
    pub async fn register_user(
        &self,
        id: UserId,
        ledger_address: LedgerAddress,
    ) -> MarketplaceResult<UserAccount> {
        let account = UserAccount::new(id, ledger_address);
        self.store.insert_user(&account).await?;
        tracing::info!(user_id = %account.id(), "registered user");
        Ok(account)
    }

    /// Returns a user's account.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::UserNotFound`] for unknown users.
    pub async fn get_user(&self, id: &UserId) -> MarketplaceResult<UserAccount> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| MarketplaceError::UserNotFound(id.clone()))
    }

    /// Returns a user's credit history, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::UserNotFound`] for unknown users.
    pub async fn credit_history(&self, id: &UserId) -> MarketplaceResult<Vec<CreditHistoryEntry>> {
        self.get_user(id).await?;
        Ok(self.store.credit_history(id).await?)
    }
}
