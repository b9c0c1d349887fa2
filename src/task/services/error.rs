//! Caller-facing failures for marketplace operations.

use crate::settlement::domain::{EscrowId, LedgerOperation, SettlementError, TxReference};
use crate::settlement::ports::GatewayError;
use crate::task::domain::{Milestone, TaskDomainError, TaskId, TaskStatus, UserId};
use crate::task::ports::TaskStoreError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type for marketplace service operations.
pub type MarketplaceResult<T> = Result<T, MarketplaceError>;

/// Stable failure categories reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller is not a registered user.
    Unauthorized,
    /// The caller's role does not permit the action.
    Forbidden,
    /// A referenced record does not exist.
    NotFound,
    /// The task is not in the state the action requires.
    StateConflict,
    /// The input was malformed.
    ValidationError,
    /// The creator cannot fund the reward.
    InsufficientFunds,
    /// The bidder's credit score is below the floor.
    InsufficientReputation,
    /// The ledger call failed without effect.
    LedgerFailure,
    /// The ledger moved funds but the store did not record it.
    Divergence,
    /// The store failed before any ledger mutation.
    Internal,
}

impl ErrorKind {
    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::StateConflict => "state_conflict",
            Self::ValidationError => "validation_error",
            Self::InsufficientFunds => "insufficient_funds",
            Self::InsufficientReputation => "insufficient_reputation",
            Self::LedgerFailure => "ledger_failure",
            Self::Divergence => "divergence",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a failed call may simply be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrySafety {
    /// Nothing happened; retry freely.
    Safe,
    /// The ledger moved funds; manual reconciliation is required.
    ContactSupport,
}

/// Context carried by a ledger-ahead-of-store divergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DivergenceReport {
    /// Task whose store row lags the ledger.
    pub task_id: TaskId,
    /// Escrow the effect landed on, when known.
    pub escrow_id: Option<EscrowId>,
    /// Confirmed ledger operation.
    pub operation: LedgerOperation,
    /// Ledger transaction reference.
    pub reference: TxReference,
    /// Amount moved, in display units.
    pub amount: Option<Decimal>,
    /// Why the store did not record the effect.
    pub detail: String,
}

/// Failures returned by marketplace services.
#[derive(Debug, Error)]
pub enum MarketplaceError {
    /// The caller has no user record.
    #[error("caller {0} is not a registered user")]
    Unauthorized(UserId),

    /// The caller may not perform the action on this task.
    #[error("{caller} may not {action} task {task_id}")]
    Forbidden {
        /// Caller identity.
        caller: UserId,
        /// Task acted on.
        task_id: TaskId,
        /// Attempted action.
        action: &'static str,
    },

    /// The task does not exist.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// A referenced user does not exist.
    #[error("user {0} not found")]
    UserNotFound(UserId),

    /// The named bidder has no pending bid on the task.
    #[error("no pending bid from {bidder} on task {task_id}")]
    BidNotFound {
        /// Task bid on.
        task_id: TaskId,
        /// Named bidder.
        bidder: UserId,
    },

    /// The task has no pending submission for the milestone.
    #[error("task {task_id} has no pending {milestone} submission")]
    SubmissionNotFound {
        /// Task reviewed.
        task_id: TaskId,
        /// Milestone reviewed.
        milestone: Milestone,
    },

    /// The task's current status does not allow the action.
    #[error("cannot {action} task {task_id} while it is {status}")]
    StateConflict {
        /// Task acted on.
        task_id: TaskId,
        /// Status read from the store.
        status: TaskStatus,
        /// Attempted action.
        action: &'static str,
    },

    /// The task has no escrow to settle against.
    #[error("task {0} has no escrow")]
    MissingEscrow(TaskId),

    /// A concurrent selection already bound another executor to the escrow.
    #[error("task {task_id} already has an executor bound on the ledger")]
    SelectionTaken {
        /// Task acted on.
        task_id: TaskId,
    },

    /// A concurrent request already recorded the replayed ledger effect.
    #[error("task {task_id} was already settled by ledger call {reference}")]
    AlreadySettled {
        /// Task acted on.
        task_id: TaskId,
        /// Replayed ledger reference.
        reference: TxReference,
    },

    /// The bidder's credit score is below the configured floor.
    #[error("credit score {score} is below the bidding floor of {floor}")]
    InsufficientReputation {
        /// Bidder's current score.
        score: i64,
        /// Configured floor.
        floor: i64,
    },

    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// An amount could not be settled.
    #[error(transparent)]
    Amount(#[from] SettlementError),

    /// The ledger gateway failed without moving funds.
    #[error(transparent)]
    Ledger(#[from] GatewayError),

    /// The ledger moved funds and the store failed to record it.
    #[error(
        "ledger {} {} for task {} confirmed but not recorded: {}",
        .0.operation, .0.reference, .0.task_id, .0.detail
    )]
    Divergence(Box<DivergenceReport>),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] TaskStoreError),
}

impl MarketplaceError {
    /// Returns the stable failure category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::TaskNotFound(_)
            | Self::UserNotFound(_)
            | Self::BidNotFound { .. }
            | Self::SubmissionNotFound { .. } => ErrorKind::NotFound,
            Self::StateConflict { .. }
            | Self::MissingEscrow(_)
            | Self::SelectionTaken { .. }
            | Self::AlreadySettled { .. } => ErrorKind::StateConflict,
            Self::InsufficientReputation { .. } => ErrorKind::InsufficientReputation,
            Self::Domain(err) => domain_kind(err),
            Self::Amount(_) => ErrorKind::ValidationError,
            Self::Ledger(GatewayError::InsufficientFunds { .. }) => ErrorKind::InsufficientFunds,
            Self::Ledger(_) => ErrorKind::LedgerFailure,
            Self::Divergence(_) => ErrorKind::Divergence,
            Self::Store(err) => store_kind(err),
        }
    }

    /// Returns whether the caller may retry.
    #[must_use]
    pub const fn retry_safety(&self) -> RetrySafety {
        match self {
            Self::Divergence(_) => RetrySafety::ContactSupport,
            _ => RetrySafety::Safe,
        }
    }

    /// Returns the divergence context, if this is a divergence.
    #[must_use]
    pub fn divergence(&self) -> Option<&DivergenceReport> {
        match self {
            Self::Divergence(report) => Some(report.as_ref()),
            _ => None,
        }
    }
}

const fn domain_kind(err: &TaskDomainError) -> ErrorKind {
    match err {
        TaskDomainError::InvalidStateTransition { .. }
        | TaskDomainError::EscrowAlreadyAttached(_)
        | TaskDomainError::BidNotPending(_)
        | TaskDomainError::SubmissionNotPending(_) => ErrorKind::StateConflict,
        _ => ErrorKind::ValidationError,
    }
}

const fn store_kind(err: &TaskStoreError) -> ErrorKind {
    match err {
        TaskStoreError::StateConflict { .. }
        | TaskStoreError::DuplicatePendingSubmission { .. }
        | TaskStoreError::SubmissionNotPending(_)
        | TaskStoreError::BidNotPending(_)
        | TaskStoreError::DuplicateUser(_)
        | TaskStoreError::DuplicateTask(_) => ErrorKind::StateConflict,
        TaskStoreError::NotFound(_) | TaskStoreError::UserNotFound(_) => ErrorKind::NotFound,
        TaskStoreError::Persistence(_) => ErrorKind::Internal,
    }
}
