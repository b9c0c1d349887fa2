//! Milestone work submissions.

use super::{Milestone, ParseDomainValueError, SubmissionId, TaskDomainError, TaskId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Review status of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Awaiting review.
    Pending,
    /// Approved and paid.
    Approved,
    /// Sent back with a reason.
    Rejected,
}

impl SubmissionStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl TryFrom<&str> for SubmissionStatus {
    type Error = ParseDomainValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ParseDomainValueError::new("submission status", value)),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work submitted by the executor for one milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    id: SubmissionId,
    task_id: TaskId,
    milestone: Milestone,
    content: String,
    attachments: Vec<String>,
    status: SubmissionStatus,
    rejection_reason: Option<String>,
    submitted_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSubmissionData {
    /// Submission identifier.
    pub id: SubmissionId,
    /// Owning task.
    pub task_id: TaskId,
    /// Milestone submitted for.
    pub milestone: Milestone,
    /// Submitted content.
    pub content: String,
    /// Attachment references.
    pub attachments: Vec<String>,
    /// Review status.
    pub status: SubmissionStatus,
    /// Reason given on rejection.
    pub rejection_reason: Option<String>,
    /// Submission timestamp.
    pub submitted_at: DateTime<Utc>,
    /// Review timestamp.
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// Creates a pending submission.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptySubmissionContent`] for blank content.
    pub fn new(
        task_id: TaskId,
        milestone: Milestone,
        content: impl Into<String>,
        attachments: Vec<String>,
        clock: &impl Clock,
    ) -> Result<Self, TaskDomainError> {
        let body = content.into();
        if body.trim().is_empty() {
            return Err(TaskDomainError::EmptySubmissionContent);
        }
        Ok(Self {
            id: SubmissionId::new(),
            task_id,
            milestone,
            content: body,
            attachments,
            status: SubmissionStatus::Pending,
            rejection_reason: None,
            submitted_at: clock.utc(),
            reviewed_at: None,
        })
    }

    /// Reconstructs a submission from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedSubmissionData) -> Self {
        Self {
            id: data.id,
            task_id: data.task_id,
            milestone: data.milestone,
            content: data.content,
            attachments: data.attachments,
            status: data.status,
            rejection_reason: data.rejection_reason,
            submitted_at: data.submitted_at,
            reviewed_at: data.reviewed_at,
        }
    }

    /// Returns the submission identifier.
    #[must_use]
    pub const fn id(&self) -> SubmissionId {
        self.id
    }

    /// Returns the owning task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the milestone.
    #[must_use]
    pub const fn milestone(&self) -> Milestone {
        self.milestone
    }

    /// Returns the submitted content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns attachment references.
    #[must_use]
    pub fn attachments(&self) -> &[String] {
        &self.attachments
    }

    /// Returns the review status.
    #[must_use]
    pub const fn status(&self) -> SubmissionStatus {
        self.status
    }

    /// Returns the rejection reason.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    /// Returns the submission timestamp.
    #[must_use]
    pub const fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Returns the review timestamp.
    #[must_use]
    pub const fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.reviewed_at
    }

    /// Marks the submission approved.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::SubmissionNotPending`] once reviewed.
    pub fn approve(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.require_pending()?;
        self.status = SubmissionStatus::Approved;
        self.reviewed_at = Some(clock.utc());
        Ok(())
    }

    /// Marks the submission rejected with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyRejectionReason`] for a blank reason
    /// or [`TaskDomainError::SubmissionNotPending`] once reviewed.
    pub fn reject(
        &mut self,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        let text = reason.into();
        if text.trim().is_empty() {
            return Err(TaskDomainError::EmptyRejectionReason);
        }
        self.require_pending()?;
        self.status = SubmissionStatus::Rejected;
        self.rejection_reason = Some(text);
        self.reviewed_at = Some(clock.utc());
        Ok(())
    }

    const fn require_pending(&self) -> Result<(), TaskDomainError> {
        match self.status {
            SubmissionStatus::Pending => Ok(()),
            SubmissionStatus::Approved | SubmissionStatus::Rejected => {
                Err(TaskDomainError::SubmissionNotPending(self.id))
            }
        }
    }
}
