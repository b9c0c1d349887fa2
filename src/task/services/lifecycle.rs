//! Task lifecycle orchestration.
//!
//! Every money-moving transition follows the same saga: validate role and
//! status against the store, perform the confirmed ledger call, then commit
//! the store transition guarded on the status read at the start. A failed
//! ledger call leaves the store untouched. A failed commit after a confirmed
//! ledger call is reported as a divergence and never retried here.

use super::error::{MarketplaceError, MarketplaceResult};
use super::reputation::ReputationPolicy;
use super::requests::{
    Balance, CreateTaskRequest, SettledTransition, SubmitWorkRequest, SubmittedWork, TaskDetail,
};
use super::support::{LedgerEffect, diverged, require_caller, require_task};
use crate::settlement::domain::{
    IdempotencyKey, LedgerAmount, LedgerOperation, LedgerReceipt,
    calculator::{milestone_payment, to_display_decimal, to_ledger_units},
};
use crate::settlement::ports::{EscrowGateway, GatewayError};
use crate::task::{
    domain::{
        Milestone, ReputationChange, Submission, SubmissionStatus, Task, TaskDomainError, TaskId,
        TaskStatus, UserId,
    },
    ports::{TaskFilter, TaskStore, TaskSummary, TaskTransition},
};
use mockable::Clock;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Task lifecycle orchestration service.
#[derive(Clone)]
pub struct TaskLifecycleService<S, G, C>
where
    S: TaskStore,
    G: EscrowGateway,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    gateway: Arc<G>,
    clock: Arc<C>,
    policy: ReputationPolicy,
}

impl<S, G, C> TaskLifecycleService<S, G, C>
where
    S: TaskStore,
    G: EscrowGateway,
    C: Clock + Send + Sync,
{
    /// Creates a new task lifecycle service.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        gateway: Arc<G>,
        clock: Arc<C>,
        policy: ReputationPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            policy,
        }
    }

    /// Creates a task and locks its reward in a new escrow.
    ///
    /// The task row is inserted `pending` before the escrow opens. If the
    /// ledger refuses the escrow the task is cancelled with a system note.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError`] for unknown callers, invalid input,
    /// insufficient funds, ledger failures, or a divergence when the escrow
    /// opened but could not be recorded.
    pub async fn create_task(
        &self,
        caller: &UserId,
        request: CreateTaskRequest,
    ) -> MarketplaceResult<SettledTransition> {
        let creator = require_caller(&*self.store, caller).await?;
        let task = Task::new(request.into_draft(caller.clone()), &*self.clock)?;
        let amount = to_ledger_units(task.reward())?;
        // Every milestone must be payable before any funds are locked.
        for milestone in Milestone::ALL {
            to_display_decimal(milestone_payment(task.reward(), milestone.share())?)?;
        }

        self.gateway
            .ensure_spendable(creator.ledger_address(), amount)
            .await?;
        self.store.insert_task(&task).await?;

        let key = IdempotencyKey::for_operation(LedgerOperation::OpenEscrow, &[&task.id()]);
        let (escrow_id, receipt) = match self
            .gateway
            .open_escrow(creator.ledger_address(), amount, &key)
            .await
        {
            Ok(opened) => opened,
            Err(GatewayError::MissingEscrowId(reference)) => {
                let receipt = LedgerReceipt::new(reference);
                let effect = LedgerEffect {
                    task_id: task.id(),
                    escrow_id: None,
                    operation: LedgerOperation::OpenEscrow,
                    receipt: &receipt,
                    amount: Some(task.reward()),
                };
                let cause = "ledger receipt carried no escrow identifier";
                return Err(self.diverge(effect, cause.to_owned()).await);
            }
            Err(err) => {
                self.record_escrow_failure(task, &err).await;
                return Err(err.into());
            }
        };

        let effect = LedgerEffect {
            task_id: task.id(),
            escrow_id: Some(escrow_id),
            operation: LedgerOperation::OpenEscrow,
            receipt: &receipt,
            amount: Some(task.reward()),
        };
        let mut funded = task.clone();
        if let Err(err) = funded.attach_escrow(escrow_id, &*self.clock) {
            return Err(self.diverge(effect, err.to_string()).await);
        }
        let transition = TaskTransition::new(TaskStatus::Pending, funded);
        if let Err(err) = self.store.update_task(&transition).await {
            return Err(self.diverge(effect, err.to_string()).await);
        }

        tracing::info!(
            task_id = %task.id(),
            escrow_id = %escrow_id,
            reference = %receipt.reference,
            reward = %task.reward(),
            "task created and escrow opened"
        );
        Ok(SettledTransition {
            task: transition.task,
            reference: Some(receipt.reference),
            amount: Some(task.reward()),
        })
    }

    async fn record_escrow_failure(&self, task: Task, err: &GatewayError) {
        tracing::warn!(task_id = %task.id(), error = %err, "escrow creation failed");
        let mut failed = task;
        if failed.fail_escrow(&err.to_string(), &*self.clock).is_err() {
            return;
        }
        let transition = TaskTransition::new(TaskStatus::Pending, failed);
        if let Err(store_err) = self.store.update_task(&transition).await {
            tracing::warn!(
                task_id = %transition.task.id(),
                error = %store_err,
                "failed to record escrow creation failure"
            );
        }
    }

    /// Returns a task with its submissions and the bids the caller may see.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError`] for unknown callers or tasks.
    pub async fn get_task(
        &self,
        caller: &UserId,
        task_id: TaskId,
    ) -> MarketplaceResult<TaskDetail> {
        require_caller(&*self.store, caller).await?;
        let task = require_task(&*self.store, task_id).await?;
        let submissions = self.store.find_submissions(task_id).await?;
        let bids = if task.is_creator(caller) {
            self.store.find_bids(task_id).await?
        } else {
            self.store
                .find_bid(task_id, caller)
                .await?
                .into_iter()
                .collect()
        };
        Ok(TaskDetail {
            task,
            submissions,
            bids,
        })
    }

    /// Lists tasks matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Store`] when the store fails.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> MarketplaceResult<Vec<TaskSummary>> {
        Ok(self.store.list_tasks(filter).await?)
    }

    /// Records the executor's work for a milestone.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError`] when the caller is not the executor, the
    /// task is not awaiting this milestone, or the content is blank.
    pub async fn submit_work(
        &self,
        caller: &UserId,
        task_id: TaskId,
        request: SubmitWorkRequest,
    ) -> MarketplaceResult<SubmittedWork> {
        let task = require_task(&*self.store, task_id).await?;
        if !task.is_executor(caller) {
            return Err(forbidden(caller, task_id, "submit work for"));
        }
        let (milestone, content, attachments) = request.into_parts();
        require_status(&task, milestone.required_status(), "submit work for")?;

        let submission = Submission::new(task_id, milestone, content, attachments, &*self.clock)?;
        let mut submitted = task.clone();
        submitted.record_submission(milestone, &*self.clock)?;
        let transition = TaskTransition::new(task.status(), submitted);
        self.store.commit_submission(&transition, &submission).await?;

        tracing::info!(
            task_id = %task_id,
            milestone = %milestone,
            submission_id = %submission.id(),
            "milestone work submitted"
        );
        Ok(SubmittedWork {
            task: transition.task,
            submission,
        })
    }

    /// Approves a milestone and releases its share of the reward.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError`] when the caller is not the creator, the
    /// milestone is not awaiting review, the release fails (nothing moved),
    /// or the release succeeded but could not be recorded (divergence).
    pub async fn approve_milestone(
        &self,
        caller: &UserId,
        task_id: TaskId,
        milestone: Milestone,
    ) -> MarketplaceResult<SettledTransition> {
        let task = require_task(&*self.store, task_id).await?;
        if !task.is_creator(caller) {
            return Err(forbidden(caller, task_id, "approve"));
        }
        require_status(&task, milestone.submitted_status(), "approve")?;
        let submission = self.pending_submission(task_id, milestone).await?;
        let escrow_id = task
            .escrow_id()
            .ok_or(MarketplaceError::MissingEscrow(task_id))?;

        let payment_units = milestone_payment(task.reward(), milestone.share())?;
        let payment = to_display_decimal(payment_units)?;
        let key =
            IdempotencyKey::for_operation(LedgerOperation::ReleaseFraction, &[&submission.id()]);
        let receipt = self
            .gateway
            .release_fraction(escrow_id, payment_units, &key)
            .await
            .inspect_err(|err| {
                tracing::warn!(
                    task_id = %task_id,
                    milestone = %milestone,
                    error = %err,
                    "release failed"
                );
            })?;

        let effect = LedgerEffect {
            task_id,
            escrow_id: Some(escrow_id),
            operation: LedgerOperation::ReleaseFraction,
            receipt: &receipt,
            amount: Some(payment),
        };
        let (approved, reviewed, reputation) =
            match self.approved_state(&task, submission, milestone, payment) {
                Ok(state) => state,
                Err(err) => return Err(self.diverge(effect, err.to_string()).await),
            };
        let transition = TaskTransition::new(task.status(), approved);
        if let Err(err) = self
            .store
            .commit_review(&transition, &reviewed, reputation.as_ref())
            .await
        {
            if receipt.replayed && self.submission_approved(task_id, &reviewed).await {
                return Err(MarketplaceError::AlreadySettled {
                    task_id,
                    reference: receipt.reference,
                });
            }
            return Err(self.diverge(effect, err.to_string()).await);
        }

        tracing::info!(
            task_id = %task_id,
            milestone = %milestone,
            amount = %payment,
            reference = %receipt.reference,
            status = %transition.task.status(),
            "milestone approved and paid"
        );
        Ok(SettledTransition {
            task: transition.task,
            reference: Some(receipt.reference),
            amount: Some(payment),
        })
    }

    fn approved_state(
        &self,
        task: &Task,
        submission: Submission,
        milestone: Milestone,
        payment: Decimal,
    ) -> Result<(Task, Submission, Option<ReputationChange>), TaskDomainError> {
        let mut approved = task.clone();
        approved.approve_milestone(milestone, payment, &*self.clock)?;
        let mut reviewed = submission;
        reviewed.approve(&*self.clock)?;
        let reputation = match (milestone.is_final(), approved.executor()) {
            (true, Some(executor)) => Some(self.policy.completion_change(
                executor,
                task.id(),
                approved.updated_at(),
            )),
            _ => None,
        };
        Ok((approved, reviewed, reputation))
    }

    async fn submission_approved(&self, task_id: TaskId, reviewed: &Submission) -> bool {
        self.store
            .find_submissions(task_id)
            .await
            .is_ok_and(|submissions| {
                submissions.iter().any(|stored| {
                    stored.id() == reviewed.id() && stored.status() == SubmissionStatus::Approved
                })
            })
    }

    /// Rejects a milestone submission and returns the task to the previous
    /// approved status. No funds move.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError`] when the caller is not the creator, the
    /// milestone is not awaiting review, or the reason is blank.
    pub async fn reject_milestone(
        &self,
        caller: &UserId,
        task_id: TaskId,
        milestone: Milestone,
        reason: &str,
    ) -> MarketplaceResult<SettledTransition> {
        let task = require_task(&*self.store, task_id).await?;
        if !task.is_creator(caller) {
            return Err(forbidden(caller, task_id, "reject"));
        }
        require_status(&task, milestone.submitted_status(), "reject")?;
        let mut reviewed = self.pending_submission(task_id, milestone).await?;
        reviewed.reject(reason, &*self.clock)?;

        let mut reverted = task.clone();
        reverted.reject_milestone(milestone, &*self.clock)?;
        let transition = TaskTransition::new(task.status(), reverted);
        self.store.commit_review(&transition, &reviewed, None).await?;

        tracing::info!(
            task_id = %task_id,
            milestone = %milestone,
            status = %transition.task.status(),
            "milestone rejected"
        );
        Ok(SettledTransition {
            task: transition.task,
            reference: None,
            amount: None,
        })
    }

    /// Cancels a task and refunds the remaining escrow to the creator.
    ///
    /// An executor cancelling mid-task loses credit according to
    /// [`ReputationPolicy::cancellation_penalty`].
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError`] when the caller is neither creator nor
    /// executor, the task is already terminal or has no escrow yet, the
    /// ledger cancel fails, or the cancel succeeded but could not be recorded
    /// (divergence).
    pub async fn cancel_task(
        &self,
        caller: &UserId,
        task_id: TaskId,
    ) -> MarketplaceResult<SettledTransition> {
        let task = require_task(&*self.store, task_id).await?;
        if !task.is_creator(caller) && !task.is_executor(caller) {
            return Err(forbidden(caller, task_id, "cancel"));
        }
        if task.status().is_terminal() {
            return Err(state_conflict(&task, "cancel"));
        }
        let refund = task.reward().checked_sub(task.paid());

        // Without an escrow the task is still being created, or its creation
        // diverged and awaits manual reconciliation.
        let escrow_id = task
            .escrow_id()
            .ok_or(MarketplaceError::MissingEscrow(task_id))?;

        let key = IdempotencyKey::for_operation(LedgerOperation::Cancel, &[&task_id]);
        let receipt = self
            .gateway
            .cancel(escrow_id, LedgerAmount::ZERO, &key)
            .await
            .inspect_err(|err| {
                tracing::warn!(task_id = %task_id, error = %err, "escrow cancel failed");
            })?;

        let effect = LedgerEffect {
            task_id,
            escrow_id: Some(escrow_id),
            operation: LedgerOperation::Cancel,
            receipt: &receipt,
            amount: refund,
        };
        let (cancelled, penalty) = match self.cancelled_state(&task, caller) {
            Ok(state) => state,
            Err(err) => return Err(self.diverge(effect, err.to_string()).await),
        };
        let transition = TaskTransition::new(task.status(), cancelled);
        if let Err(err) = self
            .store
            .commit_cancellation(&transition, penalty.as_ref())
            .await
        {
            if receipt.replayed && self.task_cancelled(task_id).await {
                return Err(MarketplaceError::AlreadySettled {
                    task_id,
                    reference: receipt.reference,
                });
            }
            return Err(self.diverge(effect, err.to_string()).await);
        }

        tracing::info!(
            task_id = %task_id,
            cancelled_by = %caller,
            previous_status = %task.status(),
            penalty = penalty.as_ref().map_or(0, |change| change.delta),
            reference = %receipt.reference,
            "task cancelled and escrow refunded"
        );
        Ok(SettledTransition {
            task: transition.task,
            reference: Some(receipt.reference),
            amount: refund,
        })
    }

    fn cancelled_state(
        &self,
        task: &Task,
        caller: &UserId,
    ) -> Result<(Task, Option<ReputationChange>), TaskDomainError> {
        let mut cancelled = task.clone();
        cancelled.cancel(&*self.clock)?;
        let penalty = if task.is_executor(caller) {
            ReputationPolicy::cancellation_change(
                caller,
                task.id(),
                task.status(),
                cancelled.updated_at(),
            )
        } else {
            None
        };
        Ok((cancelled, penalty))
    }

    async fn task_cancelled(&self, task_id: TaskId) -> bool {
        self.store
            .find_task(task_id)
            .await
            .is_ok_and(|stored| stored.is_some_and(|task| task.status() == TaskStatus::Cancelled))
    }

    /// Reads the caller's token balance.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError`] for unknown callers or ledger read
    /// failures.
    pub async fn get_balance(&self, caller: &UserId) -> MarketplaceResult<Balance> {
        let account = require_caller(&*self.store, caller).await?;
        let units = self.gateway.get_balance(account.ledger_address()).await?;
        Ok(Balance {
            address: account.ledger_address().clone(),
            amount: to_display_decimal(units)?,
        })
    }

    async fn diverge(&self, effect: LedgerEffect<'_>, detail: String) -> MarketplaceError {
        diverged(&*self.store, &*self.clock, effect, detail).await
    }

    async fn pending_submission(
        &self,
        task_id: TaskId,
        milestone: Milestone,
    ) -> MarketplaceResult<Submission> {
        self.store
            .find_pending_submission(task_id, milestone)
            .await?
            .ok_or(MarketplaceError::SubmissionNotFound { task_id, milestone })
    }
}

pub(super) fn forbidden(
    caller: &UserId,
    task_id: TaskId,
    action: &'static str,
) -> MarketplaceError {
    MarketplaceError::Forbidden {
        caller: caller.clone(),
        task_id,
        action,
    }
}

pub(super) const fn state_conflict(task: &Task, action: &'static str) -> MarketplaceError {
    MarketplaceError::StateConflict {
        task_id: task.id(),
        status: task.status(),
        action,
    }
}

fn require_status(
    task: &Task,
    required: TaskStatus,
    action: &'static str,
) -> MarketplaceResult<()> {
    if task.status() == required {
        Ok(())
    } else {
        Err(state_conflict(task, action))
    }
}
