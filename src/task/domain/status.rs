//! Task lifecycle status and visibility.

use super::ParseDomainValueError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task lifecycle status.
///
/// The happy path runs strictly in declaration order from
/// [`TaskStatus::Pending`] to [`TaskStatus::Completed`]. Rejections step back
/// one approval and [`TaskStatus::Cancelled`] is reachable from any
/// non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created; escrow may or may not be open yet.
    Pending,
    /// At least one bid has been placed.
    Bidding,
    /// An executor has been selected and bound to the escrow.
    Accepted,
    /// Design work awaits review.
    DesignSubmitted,
    /// Design approved and paid.
    DesignApproved,
    /// Implementation work awaits review.
    ImplementationSubmitted,
    /// Implementation approved and paid.
    ImplementationApproved,
    /// Final delivery awaits review.
    FinalSubmitted,
    /// Final delivery approved; reward fully paid.
    Completed,
    /// Task abandoned; remaining escrow refunded.
    Cancelled,
}

impl TaskStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Bidding => "bidding",
            Self::Accepted => "accepted",
            Self::DesignSubmitted => "design_submitted",
            Self::DesignApproved => "design_approved",
            Self::ImplementationSubmitted => "implementation_submitted",
            Self::ImplementationApproved => "implementation_approved",
            Self::FinalSubmitted => "final_submitted",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for statuses no transition leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns `true` when the lifecycle permits moving to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if matches!(next, Self::Cancelled) {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Self::Pending, Self::Bidding)
                | (Self::Bidding, Self::Accepted)
                | (Self::Accepted, Self::DesignSubmitted)
                | (Self::DesignSubmitted, Self::DesignApproved | Self::Accepted)
                | (Self::DesignApproved, Self::ImplementationSubmitted)
                | (
                    Self::ImplementationSubmitted,
                    Self::ImplementationApproved | Self::DesignApproved
                )
                | (Self::ImplementationApproved, Self::FinalSubmitted)
                | (
                    Self::FinalSubmitted,
                    Self::Completed | Self::ImplementationApproved
                )
        )
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseDomainValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "bidding" => Ok(Self::Bidding),
            "accepted" => Ok(Self::Accepted),
            "design_submitted" => Ok(Self::DesignSubmitted),
            "design_approved" => Ok(Self::DesignApproved),
            "implementation_submitted" => Ok(Self::ImplementationSubmitted),
            "implementation_approved" => Ok(Self::ImplementationApproved),
            "final_submitted" => Ok(Self::FinalSubmitted),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseDomainValueError::new("task status", value)),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may discover a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Listed only within its project.
    Project,
    /// Listed marketplace-wide.
    Global,
}

impl Visibility {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Global => "global",
        }
    }
}

impl TryFrom<&str> for Visibility {
    type Error = ParseDomainValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "global" => Ok(Self::Global),
            _ => Err(ParseDomainValueError::new("visibility", value)),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
