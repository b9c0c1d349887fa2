//! Request and response values for marketplace services.

use crate::settlement::domain::{LedgerAddress, TxReference};
use crate::task::domain::{
    Bid, Milestone, ProjectId, Submission, Task, TaskDraft, UserId, Visibility,
};
use rust_decimal::Decimal;
use serde::Serialize;

/// Request payload for creating a funded task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    name: String,
    reward: Decimal,
    description: String,
    acceptance_criteria: String,
    visibility: Visibility,
    project_id: Option<ProjectId>,
}

impl CreateTaskRequest {
    /// Creates a request for a globally visible task.
    #[must_use]
    pub fn new(name: impl Into<String>, reward: Decimal) -> Self {
        Self {
            name: name.into(),
            reward,
            description: String::new(),
            acceptance_criteria: String::new(),
            visibility: Visibility::Global,
            project_id: None,
        }
    }

    /// Sets the description.
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

    pub(super) fn into_draft(self, creator: UserId) -> TaskDraft {
        let draft = TaskDraft::new(creator, self.name, self.reward)
            .with_description(self.description)
            .with_acceptance_criteria(self.acceptance_criteria)
            .with_visibility(self.visibility);
        match self.project_id {
            Some(project) => draft.with_project(project),
            None => draft,
        }
    }
}

/// Request payload for submitting milestone work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitWorkRequest {
    milestone: Milestone,
    content: String,
    attachments: Vec<String>,
}

impl SubmitWorkRequest {
    /// Creates a submission request without attachments.
    #[must_use]
    pub fn new(milestone: Milestone, content: impl Into<String>) -> Self {
        Self {
            milestone,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    /// Sets attachment references.
    #[must_use]
    pub fn with_attachments(mut self, attachments: impl IntoIterator<Item = String>) -> Self {
        self.attachments = attachments.into_iter().collect();
        self
    }

    /// Returns the milestone.
    #[must_use]
    pub const fn milestone(&self) -> Milestone {
        self.milestone
    }

    pub(super) fn into_parts(self) -> (Milestone, String, Vec<String>) {
        (self.milestone, self.content, self.attachments)
    }
}

/// Outcome of a transition, with the ledger effect when money moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettledTransition {
    /// Task after the transition.
    pub task: Task,
    /// Ledger transaction reference, when the ledger was called.
    pub reference: Option<TxReference>,
    /// Amount moved, in display units.
    pub amount: Option<Decimal>,
}

/// Outcome of a milestone submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedWork {
    /// Task after the submission.
    pub task: Task,
    /// Stored submission.
    pub submission: Submission,
}

/// Task detail as seen by one caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDetail {
    /// The task.
    pub task: Task,
    /// Submissions, newest first.
    pub submissions: Vec<Submission>,
    /// Every bid for the creator; only the caller's own bid otherwise.
    pub bids: Vec<Bid>,
}

/// A user's token balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Balance {
    /// Address read.
    pub address: LedgerAddress,
    /// Balance in display units, eight fractional digits.
    pub amount: Decimal,
}
