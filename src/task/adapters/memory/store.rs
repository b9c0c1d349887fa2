//! In-memory task store for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::task::{
    domain::{
        Bid, BidId, BidStatus, CreditHistoryEntry, DivergenceRecord, Milestone, PersistedBidData,
        ReputationChange, Submission, SubmissionStatus, Task, TaskId, UserAccount, UserId,
    },
    ports::{
        TaskFilter, TaskStore, TaskStoreError, TaskStoreResult, TaskSummary, TaskTransition,
    },
};

/// Thread-safe in-memory task store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<RwLock<InMemoryStoreState>>,
}

#[derive(Debug, Default)]
struct InMemoryStoreState {
    tasks: HashMap<TaskId, Task>,
    bids: HashMap<TaskId, Vec<Bid>>,
    submissions: HashMap<TaskId, Vec<Submission>>,
    users: HashMap<UserId, UserAccount>,
    credit_history: Vec<CreditHistoryEntry>,
    divergences: Vec<DivergenceRecord>,
    failing_writes: usize,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` writes fail with a persistence error and no
    /// effect. Divergence records are exempt.
    pub fn fail_next_writes(&self, count: usize) {
        if let Ok(mut state) = self.state.write() {
            state.failing_writes = count;
        }
    }

    fn read(&self) -> TaskStoreResult<RwLockReadGuard<'_, InMemoryStoreState>> {
        self.state
            .read()
            .map_err(|err| TaskStoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> TaskStoreResult<RwLockWriteGuard<'_, InMemoryStoreState>> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TaskStoreError::persistence(std::io::Error::other(err.to_string())))?;
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(TaskStoreError::persistence(std::io::Error::other(
                "injected write failure",
            )));
        }
        Ok(state)
    }
}

impl InMemoryStoreState {
    fn check_transition(&self, transition: &TaskTransition) -> TaskStoreResult<()> {
        let task_id = transition.task.id();
        let stored = self
            .tasks
            .get(&task_id)
            .ok_or(TaskStoreError::NotFound(task_id))?;
        if stored.status() != transition.expected {
            return Err(TaskStoreError::StateConflict {
                task_id,
                expected: transition.expected,
            });
        }
        Ok(())
    }

    fn apply_transition(&mut self, transition: &TaskTransition) {
        self.tasks
            .insert(transition.task.id(), transition.task.clone());
    }

    fn check_reputation(&self, reputation: Option<&ReputationChange>) -> TaskStoreResult<()> {
        match reputation {
            Some(change) if !self.users.contains_key(&change.user_id) => {
                Err(TaskStoreError::UserNotFound(change.user_id.clone()))
            }
            _ => Ok(()),
        }
    }

    fn apply_reputation(&mut self, reputation: Option<&ReputationChange>) {
        let Some(change) = reputation else {
            return;
        };
        let Some(user) = self.users.get_mut(&change.user_id) else {
            return;
        };
        let before = user.credit();
        *user = user.clone().with_credit(before.apply(change));
        self.credit_history
            .push(CreditHistoryEntry::record(change, before));
    }
}

fn with_bid_status(bid: &Bid, status: BidStatus, at: DateTime<Utc>) -> Bid {
    Bid::from_persisted(PersistedBidData {
        id: bid.id(),
        task_id: bid.task_id(),
        bidder: bid.bidder().clone(),
        message: bid.message().to_owned(),
        credit_snapshot: bid.credit_snapshot(),
        status,
        created_at: bid.created_at(),
        updated_at: at,
    })
}

fn revised_bid(existing: &Bid, revision: &Bid) -> Bid {
    Bid::from_persisted(PersistedBidData {
        id: existing.id(),
        task_id: existing.task_id(),
        bidder: existing.bidder().clone(),
        message: revision.message().to_owned(),
        credit_snapshot: existing.credit_snapshot(),
        status: existing.status(),
        created_at: existing.created_at(),
        updated_at: revision.updated_at(),
    })
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert_task(&self, task: &Task) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        if state.tasks.contains_key(&task.id()) {
            return Err(TaskStoreError::DuplicateTask(task.id()));
        }
        state.tasks.insert(task.id(), task.clone());
        Ok(())
    }

    async fn find_task(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        Ok(self.read()?.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> TaskStoreResult<Vec<TaskSummary>> {
        let state = self.read()?;
        let mut summaries: Vec<TaskSummary> = state
            .tasks
            .values()
            .filter(|task| filter.matches_task(task))
            .filter(|task| {
                filter.bidder.as_ref().is_none_or(|bidder| {
                    state
                        .bids
                        .get(&task.id())
                        .is_some_and(|bids| bids.iter().any(|bid| bid.bidder() == bidder))
                })
            })
            .map(|task| {
                let pending = state.bids.get(&task.id()).map_or(0, |bids| {
                    bids.iter()
                        .filter(|bid| bid.status() == BidStatus::Pending)
                        .count()
                });
                TaskSummary {
                    task: task.clone(),
                    pending_bids: u64::try_from(pending).unwrap_or(u64::MAX),
                }
            })
            .collect();
        summaries.sort_by_key(|summary| Reverse(summary.task.created_at()));
        Ok(summaries)
    }

    async fn update_task(&self, transition: &TaskTransition) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        state.check_transition(transition)?;
        state.apply_transition(transition);
        Ok(())
    }

    async fn record_bid(
        &self,
        bid: &Bid,
        transition: Option<&TaskTransition>,
    ) -> TaskStoreResult<Bid> {
        let mut state = self.write()?;
        if let Some(guarded) = transition {
            state.check_transition(guarded)?;
        }
        if !state.tasks.contains_key(&bid.task_id()) {
            return Err(TaskStoreError::NotFound(bid.task_id()));
        }

        let bids = state.bids.entry(bid.task_id()).or_default();
        let stored = if let Some(existing) = bids
            .iter_mut()
            .find(|existing| existing.bidder() == bid.bidder())
        {
            *existing = revised_bid(existing, bid);
            existing.clone()
        } else {
            bids.push(bid.clone());
            bid.clone()
        };

        if let Some(guarded) = transition {
            state.apply_transition(guarded);
        }
        Ok(stored)
    }

    async fn find_bids(&self, task_id: TaskId) -> TaskStoreResult<Vec<Bid>> {
        Ok(self.read()?.bids.get(&task_id).cloned().unwrap_or_default())
    }

    async fn find_bid(&self, task_id: TaskId, bidder: &UserId) -> TaskStoreResult<Option<Bid>> {
        Ok(self.read()?.bids.get(&task_id).and_then(|bids| {
            bids.iter()
                .find(|bid| bid.bidder() == bidder)
                .cloned()
        }))
    }

    async fn commit_selection(
        &self,
        transition: &TaskTransition,
        accepted: BidId,
    ) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        state.check_transition(transition)?;
        let task_id = transition.task.id();
        let decided_at = transition.task.updated_at();

        let bids = state.bids.get_mut(&task_id).ok_or(TaskStoreError::BidNotPending(accepted))?;
        let chosen_is_pending = bids
            .iter()
            .any(|bid| bid.id() == accepted && bid.status() == BidStatus::Pending);
        if !chosen_is_pending {
            return Err(TaskStoreError::BidNotPending(accepted));
        }
        for bid in bids.iter_mut() {
            if bid.status() != BidStatus::Pending {
                continue;
            }
            let status = if bid.id() == accepted {
                BidStatus::Accepted
            } else {
                BidStatus::Rejected
            };
            *bid = with_bid_status(bid, status, decided_at);
        }

        state.apply_transition(transition);
        Ok(())
    }

    async fn commit_submission(
        &self,
        transition: &TaskTransition,
        submission: &Submission,
    ) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        state.check_transition(transition)?;
        let task_id = transition.task.id();
        let milestone = submission.milestone();

        let submissions = state.submissions.entry(task_id).or_default();
        let has_pending = submissions.iter().any(|existing| {
            existing.milestone() == milestone && existing.status() == SubmissionStatus::Pending
        });
        if has_pending {
            return Err(TaskStoreError::DuplicatePendingSubmission { task_id, milestone });
        }
        submissions.push(submission.clone());

        state.apply_transition(transition);
        Ok(())
    }

    async fn find_submissions(&self, task_id: TaskId) -> TaskStoreResult<Vec<Submission>> {
        let mut submissions = self
            .read()?
            .submissions
            .get(&task_id)
            .cloned()
            .unwrap_or_default();
        submissions.sort_by_key(|submission| Reverse(submission.submitted_at()));
        Ok(submissions)
    }

    async fn find_pending_submission(
        &self,
        task_id: TaskId,
        milestone: Milestone,
    ) -> TaskStoreResult<Option<Submission>> {
        Ok(self.read()?.submissions.get(&task_id).and_then(|submissions| {
            submissions
                .iter()
                .find(|submission| {
                    submission.milestone() == milestone
                        && submission.status() == SubmissionStatus::Pending
                })
                .cloned()
        }))
    }

    async fn commit_review(
        &self,
        transition: &TaskTransition,
        submission: &Submission,
        reputation: Option<&ReputationChange>,
    ) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        state.check_transition(transition)?;
        state.check_reputation(reputation)?;

        let stored = state
            .submissions
            .get_mut(&submission.task_id())
            .and_then(|submissions| {
                submissions
                    .iter_mut()
                    .find(|stored| stored.id() == submission.id())
            })
            .filter(|stored| stored.status() == SubmissionStatus::Pending)
            .ok_or(TaskStoreError::SubmissionNotPending(submission.id()))?;
        *stored = submission.clone();

        state.apply_transition(transition);
        state.apply_reputation(reputation);
        Ok(())
    }

    async fn commit_cancellation(
        &self,
        transition: &TaskTransition,
        reputation: Option<&ReputationChange>,
    ) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        state.check_transition(transition)?;
        state.check_reputation(reputation)?;
        state.apply_transition(transition);
        state.apply_reputation(reputation);
        Ok(())
    }

    async fn insert_user(&self, user: &UserAccount) -> TaskStoreResult<()> {
        let mut state = self.write()?;
        if state.users.contains_key(user.id()) {
            return Err(TaskStoreError::DuplicateUser(user.id().clone()));
        }
        state.users.insert(user.id().clone(), user.clone());
        Ok(())
    }

    async fn find_user(&self, id: &UserId) -> TaskStoreResult<Option<UserAccount>> {
        Ok(self.read()?.users.get(id).cloned())
    }

    async fn credit_history(&self, id: &UserId) -> TaskStoreResult<Vec<CreditHistoryEntry>> {
        Ok(self
            .read()?
            .credit_history
            .iter()
            .rev()
            .filter(|entry| &entry.user_id == id)
            .cloned()
            .collect())
    }

    async fn record_divergence(&self, record: &DivergenceRecord) -> TaskStoreResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| TaskStoreError::persistence(std::io::Error::other(err.to_string())))?;
        state.divergences.push(record.clone());
        Ok(())
    }

    async fn list_divergences(&self) -> TaskStoreResult<Vec<DivergenceRecord>> {
        Ok(self.read()?.divergences.iter().rev().cloned().collect())
    }
}
