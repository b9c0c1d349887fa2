//! Milestone phases and their fixed reward shares.

use super::{ParseDomainValueError, TaskStatus};
use crate::settlement::domain::{BASIS_POINTS_TOTAL, BasisPoints};
use serde::{Deserialize, Serialize};
use std::fmt;

const DESIGN_SHARE_BP: u32 = 3_000;
const IMPLEMENTATION_SHARE_BP: u32 = 5_000;
const FINAL_SHARE_BP: u32 = 2_000;

const _: () = assert!(
    DESIGN_SHARE_BP + IMPLEMENTATION_SHARE_BP + FINAL_SHARE_BP == BASIS_POINTS_TOTAL,
    "milestone shares must sum to the whole reward"
);

const fn share(value: u32) -> BasisPoints {
    match BasisPoints::checked(value) {
        Some(points) => points,
        None => panic!("milestone share exceeds the whole reward"),
    }
}

const DESIGN_SHARE: BasisPoints = share(DESIGN_SHARE_BP);
const IMPLEMENTATION_SHARE: BasisPoints = share(IMPLEMENTATION_SHARE_BP);
const FINAL_SHARE: BasisPoints = share(FINAL_SHARE_BP);

/// One of the three work phases a task is paid out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    /// Design phase, 30% of the reward.
    Design,
    /// Implementation phase, 50% of the reward.
    Implementation,
    /// Final delivery, 20% of the reward.
    Final,
}

impl Milestone {
    /// Every milestone in delivery order.
    pub const ALL: [Self; 3] = [Self::Design, Self::Implementation, Self::Final];

    /// Share of the reward released when this milestone is approved.
    #[must_use]
    pub const fn share(self) -> BasisPoints {
        match self {
            Self::Design => DESIGN_SHARE,
            Self::Implementation => IMPLEMENTATION_SHARE,
            Self::Final => FINAL_SHARE,
        }
    }

    /// Status a task must be in before work for this milestone is submitted.
    ///
    /// A rejected submission returns the task to this status.
    #[must_use]
    pub const fn required_status(self) -> TaskStatus {
        match self {
            Self::Design => TaskStatus::Accepted,
            Self::Implementation => TaskStatus::DesignApproved,
            Self::Final => TaskStatus::ImplementationApproved,
        }
    }

    /// Status while a submission for this milestone awaits review.
    #[must_use]
    pub const fn submitted_status(self) -> TaskStatus {
        match self {
            Self::Design => TaskStatus::DesignSubmitted,
            Self::Implementation => TaskStatus::ImplementationSubmitted,
            Self::Final => TaskStatus::FinalSubmitted,
        }
    }

    /// Status after this milestone is approved.
    #[must_use]
    pub const fn approved_status(self) -> TaskStatus {
        match self {
            Self::Design => TaskStatus::DesignApproved,
            Self::Implementation => TaskStatus::ImplementationApproved,
            Self::Final => TaskStatus::Completed,
        }
    }

    /// Returns `true` when approval completes the task.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Final)
    }

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Design => "design",
            Self::Implementation => "implementation",
            Self::Final => "final",
        }
    }
}

impl TryFrom<&str> for Milestone {
    type Error = ParseDomainValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "design" => Ok(Self::Design),
            "implementation" => Ok(Self::Implementation),
            "final" => Ok(Self::Final),
            _ => Err(ParseDomainValueError::new("milestone", value)),
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
