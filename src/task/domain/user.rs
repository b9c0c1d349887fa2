//! Marketplace participants and their reputation counters.

use super::{ParseDomainValueError, TaskId, UserId};
use crate::settlement::domain::LedgerAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Credit score and task counters for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditProfile {
    score: i64,
    tasks_completed: u32,
    tasks_cancelled: u32,
}

impl CreditProfile {
    /// Creates a profile from stored counters.
    #[must_use]
    pub const fn new(score: i64, tasks_completed: u32, tasks_cancelled: u32) -> Self {
        Self {
            score,
            tasks_completed,
            tasks_cancelled,
        }
    }

    /// Returns the credit score.
    #[must_use]
    pub const fn score(&self) -> i64 {
        self.score
    }

    /// Returns the number of tasks completed as executor.
    #[must_use]
    pub const fn tasks_completed(&self) -> u32 {
        self.tasks_completed
    }

    /// Returns the number of penalized executor cancellations.
    #[must_use]
    pub const fn tasks_cancelled(&self) -> u32 {
        self.tasks_cancelled
    }

    /// Returns the profile after applying `change`.
    #[must_use]
    pub const fn apply(&self, change: &ReputationChange) -> Self {
        let (completed, cancelled) = match change.reason {
            ReputationReason::TaskCompleted => {
                (self.tasks_completed.saturating_add(1), self.tasks_cancelled)
            }
            ReputationReason::ExecutorCancelled => {
                (self.tasks_completed, self.tasks_cancelled.saturating_add(1))
            }
        };
        Self {
            score: self.score.saturating_add(change.delta),
            tasks_completed: completed,
            tasks_cancelled: cancelled,
        }
    }
}

/// A registered marketplace participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    id: UserId,
    ledger_address: LedgerAddress,
    credit: CreditProfile,
}

impl UserAccount {
    /// Creates an account with a fresh credit profile.
    #[must_use]
    pub fn new(id: UserId, ledger_address: LedgerAddress) -> Self {
        Self {
            id,
            ledger_address,
            credit: CreditProfile::default(),
        }
    }

    /// Replaces the credit profile.
    #[must_use]
    pub const fn with_credit(mut self, credit: CreditProfile) -> Self {
        self.credit = credit;
        self
    }

    /// Returns the user identifier.
    #[must_use]
    pub const fn id(&self) -> &UserId {
        &self.id
    }

    /// Returns the address funds are drawn from and paid to.
    #[must_use]
    pub const fn ledger_address(&self) -> &LedgerAddress {
        &self.ledger_address
    }

    /// Returns the credit profile.
    #[must_use]
    pub const fn credit(&self) -> CreditProfile {
        self.credit
    }
}

/// Why a reputation change was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationReason {
    /// The executor delivered the final milestone.
    TaskCompleted,
    /// The executor walked away from a task in progress.
    ExecutorCancelled,
}

impl ReputationReason {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskCompleted => "task_completed",
            Self::ExecutorCancelled => "executor_cancelled",
        }
    }
}

impl TryFrom<&str> for ReputationReason {
    type Error = ParseDomainValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "task_completed" => Ok(Self::TaskCompleted),
            "executor_cancelled" => Ok(Self::ExecutorCancelled),
            _ => Err(ParseDomainValueError::new("reputation reason", value)),
        }
    }
}

impl fmt::Display for ReputationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credit adjustment committed alongside a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReputationChange {
    /// User whose credit changes.
    pub user_id: UserId,
    /// Task that triggered the change.
    pub task_id: TaskId,
    /// Signed score delta.
    pub delta: i64,
    /// Cause of the change; also selects the counter incremented.
    pub reason: ReputationReason,
    /// When the change was decided.
    pub recorded_at: DateTime<Utc>,
}

/// One row of a user's credit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditHistoryEntry {
    /// User whose credit changed.
    pub user_id: UserId,
    /// Task that triggered the change.
    pub task_id: TaskId,
    /// Signed score delta.
    pub delta: i64,
    /// Cause of the change.
    pub reason: ReputationReason,
    /// Score before the change.
    pub score_before: i64,
    /// Score after the change.
    pub score_after: i64,
    /// When the change was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl CreditHistoryEntry {
    /// Builds the history row for `change` applied to `before`.
    #[must_use]
    pub fn record(change: &ReputationChange, before: CreditProfile) -> Self {
        let after = before.apply(change);
        Self {
            user_id: change.user_id.clone(),
            task_id: change.task_id,
            delta: change.delta,
            reason: change.reason,
            score_before: before.score(),
            score_after: after.score(),
            recorded_at: change.recorded_at,
        }
    }
}
