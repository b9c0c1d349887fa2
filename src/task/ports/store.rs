//! Store port for tasks, bids, submissions and reputation.
//!
//! Every write that changes a task's status is status-guarded: the store
//! applies it only if the persisted status still equals the transition's
//! expected status, and reports [`TaskStoreError::StateConflict`] otherwise.
//! Multi-row commits are atomic.

use crate::task::domain::{
    Bid, BidId, CreditHistoryEntry, DivergenceRecord, Milestone, ProjectId, ReputationChange,
    Submission, SubmissionId, Task, TaskId, TaskStatus, UserAccount, UserId, Visibility,
};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task store operations.
pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

/// A task's new state together with the status it must currently have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTransition {
    /// Status the persisted row must hold for the write to apply.
    pub expected: TaskStatus,
    /// Task state to persist.
    pub task: Task,
}

impl TaskTransition {
    /// Creates a transition guarded on `expected`.
    #[must_use]
    pub const fn new(expected: TaskStatus, task: Task) -> Self {
        Self { expected, task }
    }
}

/// Filters for task listings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Visibility to match.
    pub visibility: Option<Visibility>,
    /// Project to match.
    pub project_id: Option<ProjectId>,
    /// Status to match.
    pub status: Option<TaskStatus>,
    /// Creator to match.
    pub creator: Option<UserId>,
    /// Executor to match.
    pub executor: Option<UserId>,
    /// Only tasks this user has bid on.
    pub bidder: Option<UserId>,
}

impl TaskFilter {
    /// Returns `true` when `task` passes every filter except `bidder`.
    #[must_use]
    pub fn matches_task(&self, task: &Task) -> bool {
        self.visibility.is_none_or(|visibility| task.visibility() == visibility)
            && self
                .project_id
                .as_ref()
                .is_none_or(|project| task.project_id() == Some(project))
            && self.status.is_none_or(|status| task.status() == status)
            && self
                .creator
                .as_ref()
                .is_none_or(|creator| task.creator() == creator)
            && self
                .executor
                .as_ref()
                .is_none_or(|executor| task.executor() == Some(executor))
    }
}

/// A task listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    /// The task.
    pub task: Task,
    /// Number of bids still pending.
    pub pending_bids: u64,
}

/// Task store contract.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts a new task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateTask`] when the identifier exists.
    async fn insert_task(&self, task: &Task) -> TaskStoreResult<()>;

    /// Finds a task by identifier.
    async fn find_task(&self, id: TaskId) -> TaskStoreResult<Option<Task>>;

    /// Lists tasks matching `filter`, newest first.
    async fn list_tasks(&self, filter: &TaskFilter) -> TaskStoreResult<Vec<TaskSummary>>;

    /// Applies a status-guarded task update.
    async fn update_task(&self, transition: &TaskTransition) -> TaskStoreResult<()>;

    /// Inserts a bid or revises the message of the bidder's existing bid,
    /// applying `transition` in the same transaction when given.
    ///
    /// Returns the stored bid, which keeps the original credit snapshot on
    /// revision.
    async fn record_bid(
        &self,
        bid: &Bid,
        transition: Option<&TaskTransition>,
    ) -> TaskStoreResult<Bid>;

    /// Returns a task's bids, oldest first.
    async fn find_bids(&self, task_id: TaskId) -> TaskStoreResult<Vec<Bid>>;

    /// Finds the bid `bidder` placed on a task.
    async fn find_bid(&self, task_id: TaskId, bidder: &UserId) -> TaskStoreResult<Option<Bid>>;

    /// Atomically applies `transition`, accepts `accepted` and rejects every
    /// other pending bid on the task.
    async fn commit_selection(
        &self,
        transition: &TaskTransition,
        accepted: BidId,
    ) -> TaskStoreResult<()>;

    /// Atomically applies `transition` and inserts a pending submission.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicatePendingSubmission`] when the task
    /// already has a pending submission for the milestone.
    async fn commit_submission(
        &self,
        transition: &TaskTransition,
        submission: &Submission,
    ) -> TaskStoreResult<()>;

    /// Returns a task's submissions, newest first.
    async fn find_submissions(&self, task_id: TaskId) -> TaskStoreResult<Vec<Submission>>;

    /// Finds the pending submission for a milestone.
    async fn find_pending_submission(
        &self,
        task_id: TaskId,
        milestone: Milestone,
    ) -> TaskStoreResult<Option<Submission>>;

    /// Atomically applies `transition`, stores the reviewed submission and
    /// applies `reputation` with its history entry.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::SubmissionNotPending`] when the stored
    /// submission has already been reviewed.
    async fn commit_review(
        &self,
        transition: &TaskTransition,
        submission: &Submission,
        reputation: Option<&ReputationChange>,
    ) -> TaskStoreResult<()>;

    /// Atomically applies a cancellation and any executor penalty.
    async fn commit_cancellation(
        &self,
        transition: &TaskTransition,
        reputation: Option<&ReputationChange>,
    ) -> TaskStoreResult<()>;

    /// Registers a user.
    ///
    /// # Errors
    ///
    /// Returns [`TaskStoreError::DuplicateUser`] when the user exists.
    async fn insert_user(&self, user: &UserAccount) -> TaskStoreResult<()>;

    /// Finds a user.
    async fn find_user(&self, id: &UserId) -> TaskStoreResult<Option<UserAccount>>;

    /// Returns a user's credit history, newest first.
    async fn credit_history(&self, id: &UserId) -> TaskStoreResult<Vec<CreditHistoryEntry>>;

    /// Persists a divergence record.
    async fn record_divergence(&self, record: &DivergenceRecord) -> TaskStoreResult<()>;

    /// Returns divergence records, newest first.
    async fn list_divergences(&self) -> TaskStoreResult<Vec<DivergenceRecord>>;
}

/// Errors returned by task store implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskStoreError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The persisted status no longer matched the expected status.
    #[error("task {task_id} is no longer {expected}")]
    StateConflict {
        /// Task that was written.
        task_id: TaskId,
        /// Status the write was guarded on.
        expected: TaskStatus,
    },

    /// A pending submission already exists for the milestone.
    #[error("task {task_id} already has a pending {milestone} submission")]
    DuplicatePendingSubmission {
        /// Task submitted to.
        task_id: TaskId,
        /// Milestone submitted for.
        milestone: Milestone,
    },

    /// The submission was reviewed concurrently.
    #[error("submission {0} is no longer pending")]
    SubmissionNotPending(SubmissionId),

    /// The bid is missing or no longer pending.
    #[error("bid {0} is no longer pending")]
    BidNotPending(BidId),

    /// A user with the same identifier already exists.
    #[error("duplicate user: {0}")]
    DuplicateUser(UserId),

    /// The user was not found.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
