//! Domain model for the task marketplace.
//!
//! Tasks move through a fixed milestone lifecycle. Bids, submissions and
//! reputation counters hang off a task by reference. Money crosses this
//! boundary only as display decimals; ledger units stay in
//! [`crate::settlement`].

mod bid;
mod divergence;
mod error;
mod ids;
mod milestone;
mod status;
mod submission;
mod task;
mod user;

pub use bid::{Bid, BidStatus, PersistedBidData};
pub use divergence::DivergenceRecord;
pub use error::{ParseDomainValueError, TaskDomainError};
pub use ids::{BidId, ProjectId, SubmissionId, TaskId, UserId};
pub use milestone::Milestone;
pub use status::{TaskStatus, Visibility};
pub use submission::{PersistedSubmissionData, Submission, SubmissionStatus};
pub use task::{PersistedTaskData, Task, TaskDraft};
pub use user::{CreditHistoryEntry, CreditProfile, ReputationChange, ReputationReason, UserAccount};
