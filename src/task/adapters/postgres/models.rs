//! Diesel row models for marketplace persistence.

use super::schema::{credit_history, ledger_divergences, task_bids, task_submissions, tasks, users};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query and insert row for users.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    /// Subject identifier.
    pub id: String,
    /// Ledger address.
    pub ledger_address: String,
    /// Credit score.
    pub credit_score: i64,
    /// Completed task counter.
    pub tasks_completed: i32,
    /// Penalized cancellation counter.
    pub tasks_cancelled: i32,
}

/// Query and insert row for tasks.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct TaskRow {
    /// Internal task identifier.
    pub id: uuid::Uuid,
    /// Ledger escrow identifier.
    pub escrow_id: Option<i64>,
    /// Creator.
    pub creator_id: String,
    /// Executor.
    pub executor_id: Option<String>,
    /// Owning project.
    pub project_id: Option<String>,
    /// Task name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Acceptance criteria.
    pub acceptance_criteria: String,
    /// Reward as a decimal string.
    pub reward: String,
    /// Paid amount as a decimal string.
    pub paid: String,
    /// Visibility.
    pub visibility: String,
    /// Lifecycle status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Cancellation timestamp.
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Query and insert row for bids.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = task_bids)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BidRow {
    /// Bid identifier.
    pub id: uuid::Uuid,
    /// Task bid on.
    pub task_id: uuid::Uuid,
    /// Bidder.
    pub bidder_id: String,
    /// Latest message.
    pub message: String,
    /// Credit score at first bid.
    pub credit_snapshot: i64,
    /// Bid status.
    pub status: String,
    /// First bid timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest revision timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Query and insert row for submissions.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = task_submissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SubmissionRow {
    /// Submission identifier.
    pub id: uuid::Uuid,
    /// Owning task.
    pub task_id: uuid::Uuid,
    /// Milestone.
    pub milestone: String,
    /// Submitted content.
    pub content: String,
    /// Attachment references as a JSON array.
    pub attachments: Value,
    /// Review status.
    pub status: String,
    /// Rejection reason.
    pub rejection_reason: Option<String>,
    /// Submission timestamp.
    pub submitted_at: DateTime<Utc>,
    /// Review timestamp.
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Query row for credit history.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = credit_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreditHistoryRow {
    /// User whose credit changed.
    pub user_id: String,
    /// Triggering task.
    pub task_id: uuid::Uuid,
    /// Score delta.
    pub delta: i64,
    /// Change reason.
    pub reason: String,
    /// Score before.
    pub score_before: i64,
    /// Score after.
    pub score_after: i64,
    /// Recording timestamp.
    pub recorded_at: DateTime<Utc>,
}

/// Insert model for credit history.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = credit_history)]
pub struct NewCreditHistoryRow {
    /// User whose credit changed.
    pub user_id: String,
    /// Triggering task.
    pub task_id: uuid::Uuid,
    /// Score delta.
    pub delta: i64,
    /// Change reason.
    pub reason: String,
    /// Score before.
    pub score_before: i64,
    /// Score after.
    pub score_after: i64,
    /// Recording timestamp.
    pub recorded_at: DateTime<Utc>,
}

/// Query and insert row for divergence records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = ledger_divergences)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DivergenceRow {
    /// Record identifier.
    pub id: uuid::Uuid,
    /// Affected task.
    pub task_id: uuid::Uuid,
    /// Affected escrow.
    pub escrow_id: Option<i64>,
    /// Confirmed ledger operation.
    pub operation: String,
    /// Ledger transaction reference.
    pub reference: String,
    /// Amount moved.
    pub amount: Option<String>,
    /// Store failure detail.
    pub detail: String,
    /// Detection timestamp.
    pub detected_at: DateTime<Utc>,
}
