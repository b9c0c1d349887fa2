//! `PostgreSQL` task store.
//!
//! Status guards are enforced with `UPDATE ... WHERE id = $1 AND status = $2`;
//! a zero row count is resolved into [`TaskStoreError::StateConflict`] or
//! [`TaskStoreError::NotFound`]. Multi-row commits run in one transaction.

use super::{
    models::{
        BidRow, CreditHistoryRow, DivergenceRow, NewCreditHistoryRow, SubmissionRow, TaskRow,
        UserRow,
    },
    schema::{credit_history, ledger_divergences, task_bids, task_submissions, tasks, users},
};
use crate::settlement::domain::{EscrowId, LedgerAddress, LedgerOperation, TxReference};
use crate::task::{
    domain::{
        Bid, BidId, BidStatus, CreditHistoryEntry, CreditProfile, DivergenceRecord, Milestone,
        PersistedBidData, PersistedSubmissionData, PersistedTaskData, ProjectId, ReputationChange,
        ReputationReason, Submission, SubmissionId, SubmissionStatus, Task, TaskId, TaskStatus,
        UserAccount, UserId, Visibility,
    },
    ports::{
        TaskFilter, TaskStore, TaskStoreError, TaskStoreResult, TaskSummary, TaskTransition,
    },
};
use async_trait::async_trait;
use diesel::dsl::{count_star, exists};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::upsert::excluded;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

/// `PostgreSQL` connection pool type used by the task store.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed task store.
#[derive(Debug, Clone)]
pub struct PostgresTaskStore {
    pool: TaskPgPool,
}

impl PostgresTaskStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskStoreError::persistence)?
    }
}

impl From<DieselError> for TaskStoreError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn insert_task(&self, task: &Task) -> TaskStoreResult<()> {
        let task_id = task.id();
        let creator = task.creator().clone();
        let row = task_to_row(task)?;

        self.run_blocking(move |connection| {
            diesel::insert_into(tasks::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        TaskStoreError::DuplicateTask(task_id)
                    }
                    DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                        TaskStoreError::UserNotFound(creator)
                    }
                    _ => TaskStoreError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn find_task(&self, id: TaskId) -> TaskStoreResult<Option<Task>> {
        self.run_blocking(move |connection| {
            let row = tasks::table
                .filter(tasks::id.eq(id.into_inner()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> TaskStoreResult<Vec<TaskSummary>> {
        let criteria = filter.clone();
        self.run_blocking(move |connection| {
            let rows = filtered_tasks(&criteria)
                .order(tasks::created_at.desc())
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?;

            let task_ids: Vec<uuid::Uuid> = rows.iter().map(|row| row.id).collect();
            let pending: HashMap<uuid::Uuid, i64> = task_bids::table
                .filter(task_bids::task_id.eq_any(task_ids))
                .filter(task_bids::status.eq(BidStatus::Pending.as_str()))
                .group_by(task_bids::task_id)
                .select((task_bids::task_id, count_star()))
                .load::<(uuid::Uuid, i64)>(connection)?
                .into_iter()
                .collect();

            rows.into_iter()
                .map(|row| -> TaskStoreResult<TaskSummary> {
                    let count = pending.get(&row.id).copied().unwrap_or_default();
                    Ok(TaskSummary {
                        pending_bids: u64::try_from(count).map_err(TaskStoreError::persistence)?,
                        task: row_to_task(row)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn update_task(&self, transition: &TaskTransition) -> TaskStoreResult<()> {
        let guarded = transition.clone();
        self.run_blocking(move |connection| apply_transition(connection, &guarded))
            .await
    }

    async fn record_bid(
        &self,
        bid: &Bid,
        transition: Option<&TaskTransition>,
    ) -> TaskStoreResult<Bid> {
        let row = bid_to_row(bid);
        let guarded = transition.cloned();
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                match guarded.as_ref() {
                    Some(change) => apply_transition(tx, change)?,
                    None => require_task(tx, TaskId::from_uuid(row.task_id))?,
                }
                let stored = diesel::insert_into(task_bids::table)
                    .values(&row)
                    .on_conflict((task_bids::task_id, task_bids::bidder_id))
                    .do_update()
                    .set((
                        task_bids::message.eq(excluded(task_bids::message)),
                        task_bids::updated_at.eq(excluded(task_bids::updated_at)),
                    ))
                    .returning(BidRow::as_returning())
                    .get_result::<BidRow>(tx)?;
                row_to_bid(stored)
            })
        })
        .await
    }

    async fn find_bids(&self, task_id: TaskId) -> TaskStoreResult<Vec<Bid>> {
        self.run_blocking(move |connection| {
            task_bids::table
                .filter(task_bids::task_id.eq(task_id.into_inner()))
                .order((task_bids::created_at.asc(), task_bids::id.asc()))
                .select(BidRow::as_select())
                .load::<BidRow>(connection)?
                .into_iter()
                .map(row_to_bid)
                .collect()
        })
        .await
    }

    async fn find_bid(&self, task_id: TaskId, bidder: &UserId) -> TaskStoreResult<Option<Bid>> {
        let bidder_id = bidder.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = task_bids::table
                .filter(task_bids::task_id.eq(task_id.into_inner()))
                .filter(task_bids::bidder_id.eq(bidder_id))
                .select(BidRow::as_select())
                .first::<BidRow>(connection)
                .optional()?;
            row.map(row_to_bid).transpose()
        })
        .await
    }

    async fn commit_selection(
        &self,
        transition: &TaskTransition,
        accepted: BidId,
    ) -> TaskStoreResult<()> {
        let guarded = transition.clone();
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                apply_transition(tx, &guarded)?;
                let task_id = guarded.task.id().into_inner();
                let decided_at = guarded.task.updated_at();

                let chosen = diesel::update(
                    task_bids::table
                        .filter(task_bids::id.eq(accepted.into_inner()))
                        .filter(task_bids::task_id.eq(task_id))
                        .filter(task_bids::status.eq(BidStatus::Pending.as_str())),
                )
                .set((
                    task_bids::status.eq(BidStatus::Accepted.as_str()),
                    task_bids::updated_at.eq(decided_at),
                ))
                .execute(tx)?;
                if chosen == 0 {
                    return Err(TaskStoreError::BidNotPending(accepted));
                }

                diesel::update(
                    task_bids::table
                        .filter(task_bids::task_id.eq(task_id))
                        .filter(task_bids::status.eq(BidStatus::Pending.as_str())),
                )
                .set((
                    task_bids::status.eq(BidStatus::Rejected.as_str()),
                    task_bids::updated_at.eq(decided_at),
                ))
                .execute(tx)?;
                Ok(())
            })
        })
        .await
    }

    async fn commit_submission(
        &self,
        transition: &TaskTransition,
        submission: &Submission,
    ) -> TaskStoreResult<()> {
        let guarded = transition.clone();
        let task_id = submission.task_id();
        let milestone = submission.milestone();
        let row = submission_to_row(submission)?;
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                apply_transition(tx, &guarded)?;
                diesel::insert_into(task_submissions::table)
                    .values(&row)
                    .execute(tx)
                    .map_err(|err| match err {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            TaskStoreError::DuplicatePendingSubmission { task_id, milestone }
                        }
                        _ => TaskStoreError::persistence(err),
                    })?;
                Ok(())
            })
        })
        .await
    }

    async fn find_submissions(&self, task_id: TaskId) -> TaskStoreResult<Vec<Submission>> {
        self.run_blocking(move |connection| {
            task_submissions::table
                .filter(task_submissions::task_id.eq(task_id.into_inner()))
                .order(task_submissions::submitted_at.desc())
                .select(SubmissionRow::as_select())
                .load::<SubmissionRow>(connection)?
                .into_iter()
                .map(row_to_submission)
                .collect()
        })
        .await
    }

    async fn find_pending_submission(
        &self,
        task_id: TaskId,
        milestone: Milestone,
    ) -> TaskStoreResult<Option<Submission>> {
        self.run_blocking(move |connection| {
            let row = task_submissions::table
                .filter(task_submissions::task_id.eq(task_id.into_inner()))
                .filter(task_submissions::milestone.eq(milestone.as_str()))
                .filter(task_submissions::status.eq(SubmissionStatus::Pending.as_str()))
                .select(SubmissionRow::as_select())
                .first::<SubmissionRow>(connection)
                .optional()?;
            row.map(row_to_submission).transpose()
        })
        .await
    }

    async fn commit_review(
        &self,
        transition: &TaskTransition,
        submission: &Submission,
        reputation: Option<&ReputationChange>,
    ) -> TaskStoreResult<()> {
        let guarded = transition.clone();
        let reviewed = submission.clone();
        let change = reputation.cloned();
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                apply_transition(tx, &guarded)?;
                let updated = diesel::update(
                    task_submissions::table
                        .filter(task_submissions::id.eq(reviewed.id().into_inner()))
                        .filter(task_submissions::status.eq(SubmissionStatus::Pending.as_str())),
                )
                .set((
                    task_submissions::status.eq(reviewed.status().as_str()),
                    task_submissions::rejection_reason.eq(reviewed.rejection_reason()),
                    task_submissions::reviewed_at.eq(reviewed.reviewed_at()),
                ))
                .execute(tx)?;
                if updated == 0 {
                    return Err(TaskStoreError::SubmissionNotPending(reviewed.id()));
                }
                if let Some(adjustment) = change.as_ref() {
                    apply_reputation(tx, adjustment)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn commit_cancellation(
        &self,
        transition: &TaskTransition,
        reputation: Option<&ReputationChange>,
    ) -> TaskStoreResult<()> {
        let guarded = transition.clone();
        let change = reputation.cloned();
        self.run_blocking(move |connection| {
            connection.transaction::<_, TaskStoreError, _>(|tx| {
                apply_transition(tx, &guarded)?;
                if let Some(adjustment) = change.as_ref() {
                    apply_reputation(tx, adjustment)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn insert_user(&self, user: &UserAccount) -> TaskStoreResult<()> {
        let user_id = user.id().clone();
        let row = user_to_row(user)?;
        self.run_blocking(move |connection| {
            diesel::insert_into(users::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        TaskStoreError::DuplicateUser(user_id)
                    }
                    _ => TaskStoreError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn find_user(&self, id: &UserId) -> TaskStoreResult<Option<UserAccount>> {
        let user_id = id.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = users::table
                .filter(users::id.eq(user_id))
                .select(UserRow::as_select())
                .first::<UserRow>(connection)
                .optional()?;
            row.map(row_to_user).transpose()
        })
        .await
    }

    async fn credit_history(&self, id: &UserId) -> TaskStoreResult<Vec<CreditHistoryEntry>> {
        let user_id = id.as_str().to_owned();
        self.run_blocking(move |connection| {
            credit_history::table
                .filter(credit_history::user_id.eq(user_id))
                .order((credit_history::recorded_at.desc(), credit_history::id.desc()))
                .select(CreditHistoryRow::as_select())
                .load::<CreditHistoryRow>(connection)?
                .into_iter()
                .map(row_to_history)
                .collect()
        })
        .await
    }

    async fn record_divergence(&self, record: &DivergenceRecord) -> TaskStoreResult<()> {
        let row = divergence_to_row(record)?;
        self.run_blocking(move |connection| {
            diesel::insert_into(ledger_divergences::table)
                .values(&row)
                .execute(connection)?;
            Ok(())
        })
        .await
    }

    async fn list_divergences(&self) -> TaskStoreResult<Vec<DivergenceRecord>> {
        self.run_blocking(move |connection| {
            ledger_divergences::table
                .order(ledger_divergences::detected_at.desc())
                .select(DivergenceRow::as_select())
                .load::<DivergenceRow>(connection)?
                .into_iter()
                .map(row_to_divergence)
                .collect()
        })
        .await
    }
}

fn filtered_tasks(filter: &TaskFilter) -> tasks::BoxedQuery<'static, diesel::pg::Pg> {
    let mut query = tasks::table.into_boxed();
    if let Some(visibility) = filter.visibility {
        query = query.filter(tasks::visibility.eq(visibility.as_str()));
    }
    if let Some(project) = filter.project_id.as_ref() {
        query = query.filter(tasks::project_id.eq(project.as_str().to_owned()));
    }
    if let Some(status) = filter.status {
        query = query.filter(tasks::status.eq(status.as_str()));
    }
    if let Some(creator) = filter.creator.as_ref() {
        query = query.filter(tasks::creator_id.eq(creator.as_str().to_owned()));
    }
    if let Some(executor) = filter.executor.as_ref() {
        query = query.filter(tasks::executor_id.eq(executor.as_str().to_owned()));
    }
    if let Some(bidder) = filter.bidder.as_ref() {
        query = query.filter(
            tasks::id.eq_any(
                task_bids::table
                    .filter(task_bids::bidder_id.eq(bidder.as_str().to_owned()))
                    .select(task_bids::task_id),
            ),
        );
    }
    query
}

fn apply_transition(
    connection: &mut PgConnection,
    transition: &TaskTransition,
) -> TaskStoreResult<()> {
    let task_id = transition.task.id();
    let row = task_to_row(&transition.task)?;
    let updated = diesel::update(
        tasks::table
            .filter(tasks::id.eq(task_id.into_inner()))
            .filter(tasks::status.eq(transition.expected.as_str())),
    )
    .set(&row)
    .execute(connection)?;

    if updated > 0 {
        return Ok(());
    }
    require_task(connection, task_id)?;
    Err(TaskStoreError::StateConflict {
        task_id,
        expected: transition.expected,
    })
}

fn require_task(connection: &mut PgConnection, task_id: TaskId) -> TaskStoreResult<()> {
    let found = diesel::select(exists(
        tasks::table.filter(tasks::id.eq(task_id.into_inner())),
    ))
    .get_result::<bool>(connection)?;
    if found {
        Ok(())
    } else {
        Err(TaskStoreError::NotFound(task_id))
    }
}

fn apply_reputation(
    connection: &mut PgConnection,
    change: &ReputationChange,
) -> TaskStoreResult<()> {
    let user_id = change.user_id.as_str();
    let row = users::table
        .filter(users::id.eq(user_id))
        .for_update()
        .select(UserRow::as_select())
        .first::<UserRow>(connection)
        .optional()?
        .ok_or_else(|| TaskStoreError::UserNotFound(change.user_id.clone()))?;

    let before = credit_from_row(&row)?;
    let after = before.apply(change);
    diesel::update(users::table.filter(users::id.eq(user_id)))
        .set((
            users::credit_score.eq(after.score()),
            users::tasks_completed.eq(to_counter(after.tasks_completed())?),
            users::tasks_cancelled.eq(to_counter(after.tasks_cancelled())?),
        ))
        .execute(connection)?;

    let entry = CreditHistoryEntry::record(change, before);
    diesel::insert_into(credit_history::table)
        .values(NewCreditHistoryRow {
            user_id: entry.user_id.as_str().to_owned(),
            task_id: entry.task_id.into_inner(),
            delta: entry.delta,
            reason: entry.reason.as_str().to_owned(),
            score_before: entry.score_before,
            score_after: entry.score_after,
            recorded_at: entry.recorded_at,
        })
        .execute(connection)?;
    Ok(())
}

fn to_counter(value: u32) -> TaskStoreResult<i32> {
    i32::try_from(value).map_err(TaskStoreError::persistence)
}

fn escrow_to_column(escrow_id: Option<EscrowId>) -> TaskStoreResult<Option<i64>> {
    escrow_id
        .map(|id| i64::try_from(id.value()).map_err(TaskStoreError::persistence))
        .transpose()
}

fn escrow_from_column(escrow_id: Option<i64>) -> TaskStoreResult<Option<EscrowId>> {
    escrow_id
        .map(|id| {
            u64::try_from(id)
                .map(EscrowId::new)
                .map_err(TaskStoreError::persistence)
        })
        .transpose()
}

fn parse_decimal(value: &str) -> TaskStoreResult<Decimal> {
    Decimal::from_str(value).map_err(TaskStoreError::persistence)
}

fn parse_user(value: String) -> TaskStoreResult<UserId> {
    UserId::new(value).map_err(TaskStoreError::persistence)
}

fn task_to_row(task: &Task) -> TaskStoreResult<TaskRow> {
    Ok(TaskRow {
        id: task.id().into_inner(),
        escrow_id: escrow_to_column(task.escrow_id())?,
        creator_id: task.creator().as_str().to_owned(),
        executor_id: task.executor().map(|user| user.as_str().to_owned()),
        project_id: task.project_id().map(|project| project.as_str().to_owned()),
        name: task.name().to_owned(),
        description: task.description().to_owned(),
        acceptance_criteria: task.acceptance_criteria().to_owned(),
        reward: task.reward().to_string(),
        paid: task.paid().to_string(),
        visibility: task.visibility().as_str().to_owned(),
        status: task.status().as_str().to_owned(),
        created_at: task.created_at(),
        updated_at: task.updated_at(),
        completed_at: task.completed_at(),
        cancelled_at: task.cancelled_at(),
    })
}

fn row_to_task(row: TaskRow) -> TaskStoreResult<Task> {
    let TaskRow {
        id,
        escrow_id,
        creator_id,
        executor_id,
        project_id,
        name,
        description,
        acceptance_criteria,
        reward,
        paid,
        visibility,
        status,
        created_at,
        updated_at,
        completed_at,
        cancelled_at,
    } = row;

    Ok(Task::from_persisted(PersistedTaskData {
        id: TaskId::from_uuid(id),
        escrow_id: escrow_from_column(escrow_id)?,
        creator: parse_user(creator_id)?,
        executor: executor_id.map(parse_user).transpose()?,
        project_id: project_id
            .map(ProjectId::new)
            .transpose()
            .map_err(TaskStoreError::persistence)?,
        name,
        description,
        acceptance_criteria,
        reward: parse_decimal(&reward)?,
        paid: parse_decimal(&paid)?,
        visibility: Visibility::try_from(visibility.as_str())
            .map_err(TaskStoreError::persistence)?,
        status: TaskStatus::try_from(status.as_str()).map_err(TaskStoreError::persistence)?,
        created_at,
        updated_at,
        completed_at,
        cancelled_at,
    }))
}

fn bid_to_row(bid: &Bid) -> BidRow {
    BidRow {
        id: bid.id().into_inner(),
        task_id: bid.task_id().into_inner(),
        bidder_id: bid.bidder().as_str().to_owned(),
        message: bid.message().to_owned(),
        credit_snapshot: bid.credit_snapshot(),
        status: bid.status().as_str().to_owned(),
        created_at: bid.created_at(),
        updated_at: bid.updated_at(),
    }
}

fn row_to_bid(row: BidRow) -> TaskStoreResult<Bid> {
    Ok(Bid::from_persisted(PersistedBidData {
        id: BidId::from_uuid(row.id),
        task_id: TaskId::from_uuid(row.task_id),
        bidder: parse_user(row.bidder_id)?,
        message: row.message,
        credit_snapshot: row.credit_snapshot,
        status: BidStatus::try_from(row.status.as_str()).map_err(TaskStoreError::persistence)?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

fn submission_to_row(submission: &Submission) -> TaskStoreResult<SubmissionRow> {
    Ok(SubmissionRow {
        id: submission.id().into_inner(),
        task_id: submission.task_id().into_inner(),
        milestone: submission.milestone().as_str().to_owned(),
        content: submission.content().to_owned(),
        attachments: serde_json::to_value(submission.attachments())
            .map_err(TaskStoreError::persistence)?,
        status: submission.status().as_str().to_owned(),
        rejection_reason: submission.rejection_reason().map(str::to_owned),
        submitted_at: submission.submitted_at(),
        reviewed_at: submission.reviewed_at(),
    })
}

fn row_to_submission(row: SubmissionRow) -> TaskStoreResult<Submission> {
    Ok(Submission::from_persisted(PersistedSubmissionData {
        id: SubmissionId::from_uuid(row.id),
        task_id: TaskId::from_uuid(row.task_id),
        milestone: Milestone::try_from(row.milestone.as_str())
            .map_err(TaskStoreError::persistence)?,
        content: row.content,
        attachments: serde_json::from_value(row.attachments)
            .map_err(TaskStoreError::persistence)?,
        status: SubmissionStatus::try_from(row.status.as_str())
            .map_err(TaskStoreError::persistence)?,
        rejection_reason: row.rejection_reason,
        submitted_at: row.submitted_at,
        reviewed_at: row.reviewed_at,
    }))
}

fn user_to_row(user: &UserAccount) -> TaskStoreResult<UserRow> {
    let credit = user.credit();
    Ok(UserRow {
        id: user.id().as_str().to_owned(),
        ledger_address: user.ledger_address().as_str().to_owned(),
        credit_score: credit.score(),
        tasks_completed: to_counter(credit.tasks_completed())?,
        tasks_cancelled: to_counter(credit.tasks_cancelled())?,
    })
}

fn credit_from_row(row: &UserRow) -> TaskStoreResult<CreditProfile> {
    let completed = u32::try_from(row.tasks_completed).map_err(TaskStoreError::persistence)?;
    let cancelled = u32::try_from(row.tasks_cancelled).map_err(TaskStoreError::persistence)?;
    Ok(CreditProfile::new(row.credit_score, completed, cancelled))
}

fn row_to_user(row: UserRow) -> TaskStoreResult<UserAccount> {
    let credit = credit_from_row(&row)?;
    let address = LedgerAddress::new(row.ledger_address).map_err(TaskStoreError::persistence)?;
    Ok(UserAccount::new(parse_user(row.id)?, address).with_credit(credit))
}

fn row_to_history(row: CreditHistoryRow) -> TaskStoreResult<CreditHistoryEntry> {
    Ok(CreditHistoryEntry {
        user_id: parse_user(row.user_id)?,
        task_id: TaskId::from_uuid(row.task_id),
        delta: row.delta,
        reason: ReputationReason::try_from(row.reason.as_str())
            .map_err(TaskStoreError::persistence)?,
        score_before: row.score_before,
        score_after: row.score_after,
        recorded_at: row.recorded_at,
    })
}

fn divergence_to_row(record: &DivergenceRecord) -> TaskStoreResult<DivergenceRow> {
    Ok(DivergenceRow {
        id: record.id,
        task_id: record.task_id.into_inner(),
        escrow_id: escrow_to_column(record.escrow_id)?,
        operation: record.operation.as_str().to_owned(),
        reference: record.reference.as_str().to_owned(),
        amount: record.amount.map(|amount| amount.to_string()),
        detail: record.detail.clone(),
        detected_at: record.detected_at,
    })
}

fn row_to_divergence(row: DivergenceRow) -> TaskStoreResult<DivergenceRecord> {
    Ok(DivergenceRecord {
        id: row.id,
        task_id: TaskId::from_uuid(row.task_id),
        escrow_id: escrow_from_column(row.escrow_id)?,
        operation: LedgerOperation::try_from(row.operation.as_str())
            .map_err(TaskStoreError::persistence)?,
        reference: TxReference::new(row.reference),
        amount: row.amount.as_deref().map(parse_decimal).transpose()?,
        detail: row.detail,
        detected_at: row.detected_at,
    })
}
