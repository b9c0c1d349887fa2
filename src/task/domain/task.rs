//! Task aggregate root.

use super::{Milestone, ProjectId, TaskDomainError, TaskId, TaskStatus, UserId, Visibility};
use crate::settlement::domain::{DISPLAY_DECIMALS, EscrowId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Validated input for a new task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    creator: UserId,
    name: String,
    description: String,
    acceptance_criteria: String,
    reward: Decimal,
    visibility: Visibility,
    project_id: Option<ProjectId>,
}

impl TaskDraft {
    /// Creates a global task draft.
    #[must_use]
    pub fn new(creator: UserId, name: impl Into<String>, reward: Decimal) -> Self {
        Self {
            creator,
            name: name.into(),
            description: String::new(),
            acceptance_criteria: String::new(),
            reward,
            visibility: Visibility::Global,
            project_id: None,
        }
    }

    /// Sets the task description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the acceptance criteria.
    #[must_use]
    pub fn with_acceptance_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.acceptance_criteria = criteria.into();
        self
    }

    /// Sets the visibility.
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Scopes the task to a project.
    #[must_use]
    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    escrow_id: Option<EscrowId>,
    creator: UserId,
    executor: Option<UserId>,
    project_id: Option<ProjectId>,
    name: String,
    description: String,
    acceptance_criteria: String,
    reward: Decimal,
    paid: Decimal,
    visibility: Visibility,
    status: TaskStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Ledger escrow, once opened.
    pub escrow_id: Option<EscrowId>,
    /// Task creator.
    pub creator: UserId,
    /// Selected executor.
    pub executor: Option<UserId>,
    /// Owning project.
    pub project_id: Option<ProjectId>,
    /// Task name.
    pub name: String,
    /// Task description.
    pub description: String,
    /// Acceptance criteria.
    pub acceptance_criteria: String,
    /// Total reward.
    pub reward: Decimal,
    /// Cumulative amount released.
    pub paid: Decimal,
    /// Visibility.
    pub visibility: Visibility,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest change timestamp.
    pub updated_at: DateTime<Utc>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Cancellation timestamp.
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a pending task with no escrow.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError`] when the name is blank, the reward is not
    /// positive or has more than eight fractional digits, or project
    /// visibility is requested without a project.
    pub fn new(draft: TaskDraft, clock: &impl Clock) -> Result<Self, TaskDomainError> {
        let TaskDraft {
            creator,
            name,
            description,
            acceptance_criteria,
            reward,
            visibility,
            project_id,
        } = draft;

        let trimmed_name = name.trim();
        if trimmed_name.is_empty() {
            return Err(TaskDomainError::EmptyTaskName);
        }
        if reward <= Decimal::ZERO {
            return Err(TaskDomainError::NonPositiveReward(reward));
        }
        let normalized_reward = reward.normalize();
        if normalized_reward.scale() > DISPLAY_DECIMALS {
            return Err(TaskDomainError::RewardTooPrecise(reward));
        }
        if visibility == Visibility::Project && project_id.is_none() {
            return Err(TaskDomainError::MissingProject);
        }

        let timestamp = clock.utc();
        Ok(Self {
            id: TaskId::new(),
            escrow_id: None,
            creator,
            executor: None,
            project_id,
            name: trimmed_name.to_owned(),
            description,
            acceptance_criteria,
            reward: normalized_reward,
            paid: Decimal::ZERO,
            visibility,
            status: TaskStatus::Pending,
            created_at: timestamp,
            updated_at: timestamp,
            completed_at: None,
            cancelled_at: None,
        })
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            escrow_id: data.escrow_id,
            creator: data.creator,
            executor: data.executor,
            project_id: data.project_id,
            name: data.name,
            description: data.description,
            acceptance_criteria: data.acceptance_criteria,
            reward: data.reward,
            paid: data.paid,
            visibility: data.visibility,
            status: data.status,
            created_at: data.created_at,
            updated_at: data.updated_at,
            completed_at: data.completed_at,
            cancelled_at: data.cancelled_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the ledger escrow, if one has been opened.
    #[must_use]
    pub const fn escrow_id(&self) -> Option<EscrowId> {
        self.escrow_id
    }

    /// Returns the creator.
    #[must_use]
    pub const fn creator(&self) -> &UserId {
        &self.creator
    }

    /// Returns the selected executor.
    #[must_use]
    pub const fn executor(&self) -> Option<&UserId> {
        self.executor.as_ref()
    }

    /// Returns the owning project.
    #[must_use]
    pub const fn project_id(&self) -> Option<&ProjectId> {
        self.project_id.as_ref()
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the acceptance criteria.
    #[must_use]
    pub fn acceptance_criteria(&self) -> &str {
        &self.acceptance_criteria
    }

    /// Returns the total reward.
    #[must_use]
    pub const fn reward(&self) -> Decimal {
        self.reward
    }

    /// Returns the cumulative amount released to the executor.
    #[must_use]
    pub const fn paid(&self) -> Decimal {
        self.paid
    }

    /// Returns the visibility.
    #[must_use]
    pub const fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest change timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the completion timestamp.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the cancellation timestamp.
    #[must_use]
    pub const fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    /// Returns `true` when `user` created the task.
    #[must_use]
    pub fn is_creator(&self, user: &UserId) -> bool {
        &self.creator == user
    }

    /// Returns `true` when `user` is the selected executor.
    #[must_use]
    pub fn is_executor(&self, user: &UserId) -> bool {
        self.executor.as_ref() == Some(user)
    }

    /// Records the escrow opened for this task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EscrowAlreadyAttached`] if an escrow is
    /// already recorded, or [`TaskDomainError::InvalidStateTransition`] unless
    /// the task is pending.
    pub fn attach_escrow(
        &mut self,
        escrow_id: EscrowId,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        if self.escrow_id.is_some() {
            return Err(TaskDomainError::EscrowAlreadyAttached(self.id));
        }
        self.require_status(TaskStatus::Pending, TaskStatus::Pending)?;
        self.escrow_id = Some(escrow_id);
        self.touch(clock);
        Ok(())
    }

    /// Moves a pending task to bidding on its first bid.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless the task is
    /// pending.
    pub fn open_bidding(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.transition(TaskStatus::Pending, TaskStatus::Bidding, clock)
    }

    /// Records the selected executor.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless the task is
    /// bidding.
    pub fn assign_executor(
        &mut self,
        executor: UserId,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.transition(TaskStatus::Bidding, TaskStatus::Accepted, clock)?;
        self.executor = Some(executor);
        Ok(())
    }

    /// Records that work for `milestone` was submitted.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless the task is
    /// in the milestone's required status.
    pub fn record_submission(
        &mut self,
        milestone: Milestone,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.transition(
            milestone.required_status(),
            milestone.submitted_status(),
            clock,
        )
    }

    /// Records approval of `milestone` and the payment released for it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless the
    /// milestone is awaiting review, or
    /// [`TaskDomainError::PaymentExceedsReward`] when the payment would push
    /// the paid amount above the reward.
    pub fn approve_milestone(
        &mut self,
        milestone: Milestone,
        payment: Decimal,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.require_status(milestone.submitted_status(), milestone.approved_status())?;
        let paid = self
            .paid
            .checked_add(payment)
            .filter(|total| *total <= self.reward)
            .ok_or(TaskDomainError::PaymentExceedsReward {
                task_id: self.id,
                payment,
            })?;

        self.paid = paid;
        self.status = milestone.approved_status();
        self.touch(clock);
        if milestone.is_final() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Returns a rejected milestone to its required status.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless the
    /// milestone is awaiting review.
    pub fn reject_milestone(
        &mut self,
        milestone: Milestone,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.transition(
            milestone.submitted_status(),
            milestone.required_status(),
            clock,
        )
    }

    /// Cancels the task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] when the task is
    /// already completed or cancelled.
    pub fn cancel(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition(TaskStatus::Cancelled));
        }
        self.status = TaskStatus::Cancelled;
        self.touch(clock);
        self.cancelled_at = Some(self.updated_at);
        Ok(())
    }

    /// Cancels a pending task whose escrow could not be opened, appending a
    /// system note to its description.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidStateTransition`] unless the task is
    /// pending.
    pub fn fail_escrow(&mut self, note: &str, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.require_status(TaskStatus::Pending, TaskStatus::Cancelled)?;
        if !self.description.is_empty() {
            self.description.push_str("\n\n");
        }
        self.description.push_str("[system] escrow creation failed: ");
        self.description.push_str(note);
        self.cancel(clock)
    }

    fn transition(
        &mut self,
        expected: TaskStatus,
        next: TaskStatus,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.require_status(expected, next)?;
        self.status = next;
        self.touch(clock);
        Ok(())
    }

    fn require_status(
        &self,
        expected: TaskStatus,
        next: TaskStatus,
    ) -> Result<(), TaskDomainError> {
        if self.status != expected {
            return Err(self.invalid_transition(next));
        }
        Ok(())
    }

    const fn invalid_transition(&self, to: TaskStatus) -> TaskDomainError {
        TaskDomainError::InvalidStateTransition {
            task_id: self.id,
            from: self.status,
            to,
        }
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}
