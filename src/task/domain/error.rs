//! Error types for marketplace domain validation and parsing.

use super::{BidId, SubmissionId, TaskId, TaskStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors returned while constructing or mutating domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// A user identifier was empty after trimming.
    #[error("user identifier must not be empty")]
    EmptyUserId,

    /// A project identifier was empty after trimming.
    #[error("project identifier must not be empty")]
    EmptyProjectId,

    /// The task name was empty after trimming.
    #[error("task name must not be empty")]
    EmptyTaskName,

    /// The reward was zero or negative.
    #[error("reward must be positive, got {0}")]
    NonPositiveReward(Decimal),

    /// The reward carried more fractional digits than the store mirrors.
    #[error("reward {0} has more than 8 fractional digits")]
    RewardTooPrecise(Decimal),

    /// Project visibility was requested without a project.
    #[error("project visibility requires a project identifier")]
    MissingProject,

    /// Submission content was empty after trimming.
    #[error("submission content must not be empty")]
    EmptySubmissionContent,

    /// A rejection was issued without a reason.
    #[error("rejection reason must not be empty")]
    EmptyRejectionReason,

    /// The task is not in the state the operation requires.
    #[error("task {task_id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        /// Task being transitioned.
        task_id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// The task already references a ledger escrow.
    #[error("task {0} already has an escrow")]
    EscrowAlreadyAttached(TaskId),

    /// Recording a payment would push the paid amount above the reward.
    #[error("payment of {payment} on task {task_id} would exceed its reward")]
    PaymentExceedsReward {
        /// Task being paid.
        task_id: TaskId,
        /// Payment that was refused.
        payment: Decimal,
    },

    /// A bid is no longer pending.
    #[error("bid {0} is no longer pending")]
    BidNotPending(BidId),

    /// A submission is no longer pending.
    #[error("submission {0} is no longer pending")]
    SubmissionNotPending(SubmissionId),
}

/// Error returned while parsing stored enumeration values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseDomainValueError {
    /// Name of the value being parsed.
    pub kind: &'static str,
    /// Unrecognized input.
    pub value: String,
}

impl ParseDomainValueError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}
