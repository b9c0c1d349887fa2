//! Lookups and divergence reporting shared by the marketplace services.

use super::error::{DivergenceReport, MarketplaceError, MarketplaceResult};
use crate::settlement::domain::{EscrowId, LedgerOperation, LedgerReceipt};
use crate::task::{
    domain::{DivergenceRecord, Task, TaskId, UserAccount, UserId},
    ports::TaskStore,
};
use mockable::Clock;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Loads the caller's account; unknown callers are unauthorized.
pub(super) async fn require_caller<S: TaskStore>(
    store: &S,
    caller: &UserId,
) -> MarketplaceResult<UserAccount> {
    store
        .find_user(caller)
        .await?
        .ok_or_else(|| MarketplaceError::Unauthorized(caller.clone()))
}

/// Loads a user referenced by the request.
pub(super) async fn require_user<S: TaskStore>(
    store: &S,
    id: &UserId,
) -> MarketplaceResult<UserAccount> {
    store
        .find_user(id)
        .await?
        .ok_or_else(|| MarketplaceError::UserNotFound(id.clone()))
}

pub(super) async fn require_task<S: TaskStore>(store: &S, id: TaskId) -> MarketplaceResult<Task> {
    store
        .find_task(id)
        .await?
        .ok_or(MarketplaceError::TaskNotFound(id))
}

/// A confirmed ledger effect the store still has to mirror.
pub(super) struct LedgerEffect<'a> {
    pub(super) task_id: TaskId,
    pub(super) escrow_id: Option<EscrowId>,
    pub(super) operation: LedgerOperation,
    pub(super) receipt: &'a LedgerReceipt,
    pub(super) amount: Option<Decimal>,
}

/// Logs a ledger-ahead-of-store divergence, records it for manual
/// reconciliation and returns the caller-facing error.
///
/// Recording is best-effort; a failure to record is logged and does not mask
/// the divergence.
pub(super) async fn diverged<S: TaskStore>(
    store: &S,
    clock: &impl Clock,
    effect: LedgerEffect<'_>,
    detail: String,
) -> MarketplaceError {
    let report = DivergenceReport {
        task_id: effect.task_id,
        escrow_id: effect.escrow_id,
        operation: effect.operation,
        reference: effect.receipt.reference.clone(),
        amount: effect.amount,
        detail,
    };
    tracing::error!(
        task_id = %report.task_id,
        escrow_id = ?report.escrow_id,
        reference = %report.reference,
        amount = ?report.amount,
        operation = %report.operation,
        detail = %report.detail,
        "ledger effect confirmed but not recorded in the store"
    );

    let record = DivergenceRecord {
        id: Uuid::new_v4(),
        task_id: report.task_id,
        escrow_id: report.escrow_id,
        operation: report.operation,
        reference: report.reference.clone(),
        amount: report.amount,
        detail: report.detail.clone(),
        detected_at: clock.utc(),
    };
    if let Err(err) = store.record_divergence(&record).await {
        tracing::error!(
            task_id = %report.task_id,
            reference = %report.reference,
            error = %err,
            "failed to record divergence"
        );
    }
    MarketplaceError::Divergence(Box::new(report))
}
