//! Bids placed by prospective executors.

use super::{BidId, ParseDomainValueError, TaskDomainError, TaskId, UserId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bid status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    /// Awaiting the creator's selection.
    Pending,
    /// Selected; the bidder is the executor.
    Accepted,
    /// Another bid was selected.
    Rejected,
}

impl BidStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl TryFrom<&str> for BidStatus {
    type Error = ParseDomainValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ParseDomainValueError::new("bid status", value)),
        }
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bidder's offer to execute a task.
///
/// The credit score snapshot is taken when the bidder first bids and is kept
/// when the bid is revised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    id: BidId,
    task_id: TaskId,
    bidder: UserId,
    message: String,
    credit_snapshot: i64,
    status: BidStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted bid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedBidData {
    /// Bid identifier.
    pub id: BidId,
    /// Task bid on.
    pub task_id: TaskId,
    /// Bidder.
    pub bidder: UserId,
    /// Latest message.
    pub message: String,
    /// Credit score at first bid.
    pub credit_snapshot: i64,
    /// Status.
    pub status: BidStatus,
    /// First bid timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest revision timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Bid {
    /// Creates a pending bid.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        bidder: UserId,
        message: impl Into<String>,
        credit_snapshot: i64,
        clock: &impl Clock,
    ) -> Self {
        let timestamp = clock.utc();
        Self {
            id: BidId::new(),
            task_id,
            bidder,
            message: message.into(),
            credit_snapshot,
            status: BidStatus::Pending,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs a bid from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedBidData) -> Self {
        Self {
            id: data.id,
            task_id: data.task_id,
            bidder: data.bidder,
            message: data.message,
            credit_snapshot: data.credit_snapshot,
            status: data.status,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the bid identifier.
    #[must_use]
    pub const fn id(&self) -> BidId {
        self.id
    }

    /// Returns the task bid on.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the bidder.
    #[must_use]
    pub const fn bidder(&self) -> &UserId {
        &self.bidder
    }

    /// Returns the latest message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the credit score captured at first bid.
    #[must_use]
    pub const fn credit_snapshot(&self) -> i64 {
        self.credit_snapshot
    }

    /// Returns the status.
    #[must_use]
    pub const fn status(&self) -> BidStatus {
        self.status
    }

    /// Returns the first bid timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest revision timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replaces the message, keeping the original credit snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::BidNotPending`] once the bid is decided.
    pub fn revise(
        &mut self,
        message: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.require_pending()?;
        self.message = message.into();
        self.updated_at = clock.utc();
        Ok(())
    }

    /// Marks the bid as selected.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::BidNotPending`] once the bid is decided.
    pub fn accept(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.decide(BidStatus::Accepted, clock)
    }

    /// Marks the bid as passed over.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::BidNotPending`] once the bid is decided.
    pub fn reject(&mut self, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.decide(BidStatus::Rejected, clock)
    }

    fn decide(&mut self, status: BidStatus, clock: &impl Clock) -> Result<(), TaskDomainError> {
        self.require_pending()?;
        self.status = status;
        self.updated_at = clock.utc();
        Ok(())
    }

    const fn require_pending(&self) -> Result<(), TaskDomainError> {
        match self.status {
            BidStatus::Pending => Ok(()),
            BidStatus::Accepted | BidStatus::Rejected => {
                Err(TaskDomainError::BidNotPending(self.id))
            }
        }
    }
}
