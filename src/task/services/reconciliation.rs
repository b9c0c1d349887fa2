//! Comparison of the store mirror against the ledger escrow.

use super::error::MarketplaceResult;
use super::support::require_task;
use crate::settlement::domain::{EscrowId, LedgerAddress, calculator::to_display_decimal};
use crate::settlement::ports::EscrowGateway;
use crate::task::{
    domain::{DivergenceRecord, Task, TaskId, TaskStatus},
    ports::TaskStore,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// A field on which the store and the ledger disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum Discrepancy {
    /// Cumulative paid amount differs.
    Paid {
        /// Amount recorded in the store.
        store: Decimal,
        /// Amount released on the ledger.
        ledger: Decimal,
    },
    /// Cancellation flag differs.
    Cancelled {
        /// Whether the store shows the task cancelled.
        store: bool,
        /// Whether the ledger shows the escrow cancelled.
        ledger: bool,
    },
    /// Bound executor differs.
    Executor {
        /// Executor address according to the store.
        store: Option<LedgerAddress>,
        /// Counterparty bound on the ledger.
        ledger: Option<LedgerAddress>,
    },
}

/// Outcome of a reconciliation inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "discrepancies", rename_all = "snake_case")]
pub enum ReconciliationStatus {
    /// Store and ledger agree.
    Consistent,
    /// Store and ledger disagree on the listed fields.
    Diverged(Vec<Discrepancy>),
    /// The task never received an escrow.
    NoEscrow,
    /// The task references an escrow the ledger does not know.
    EscrowMissing,
}

/// Reconciliation report for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Task inspected.
    pub task_id: TaskId,
    /// Escrow inspected, when the task has one.
    pub escrow_id: Option<EscrowId>,
    /// Inspection outcome.
    pub status: ReconciliationStatus,
}

impl ReconciliationReport {
    /// Returns `true` when no discrepancy was found.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        matches!(
            self.status,
            ReconciliationStatus::Consistent | ReconciliationStatus::NoEscrow
        )
    }
}

/// Read-only inspection of store and ledger state for manual reconciliation.
#[derive(Clone)]
pub struct ReconciliationService<S, G>
where
    S: TaskStore,
    G: EscrowGateway,
{
    store: Arc<S>,
    gateway: Arc<G>,
}

impl<S, G> ReconciliationService<S, G>
where
    S: TaskStore,
    G: EscrowGateway,
{
    /// Creates a new reconciliation service.
    #[must_use]
    pub const fn new(store: Arc<S>, gateway: Arc<G>) -> Self {
        Self { store, gateway }
    }

    /// Compares a task's paid amount, cancellation and executor with its
    /// escrow on the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`super::MarketplaceError`] when the task is unknown or either
    /// side cannot be read.
    pub async fn inspect(&self, task_id: TaskId) -> MarketplaceResult<ReconciliationReport> {
        let task = require_task(&*self.store, task_id).await?;
        let Some(escrow_id) = task.escrow_id() else {
            return Ok(ReconciliationReport {
                task_id,
                escrow_id: None,
                status: ReconciliationStatus::NoEscrow,
            });
        };
        let Some(snapshot) = self.gateway.escrow_snapshot(escrow_id).await? else {
            tracing::warn!(task_id = %task_id, escrow_id = %escrow_id, "escrow missing on ledger");
            return Ok(ReconciliationReport {
                task_id,
                escrow_id: Some(escrow_id),
                status: ReconciliationStatus::EscrowMissing,
            });
        };

        let mut discrepancies = Vec::new();
        let ledger_paid = to_display_decimal(snapshot.paid)?;
        if ledger_paid != task.paid() {
            discrepancies.push(Discrepancy::Paid {
                store: task.paid(),
                ledger: ledger_paid,
            });
        }
        let store_cancelled = task.status() == TaskStatus::Cancelled;
        if store_cancelled != snapshot.cancelled {
            discrepancies.push(Discrepancy::Cancelled {
                store: store_cancelled,
                ledger: snapshot.cancelled,
            });
        }
        let store_executor = self.executor_address(&task).await?;
        if store_executor != snapshot.executor {
            discrepancies.push(Discrepancy::Executor {
                store: store_executor,
                ledger: snapshot.executor,
            });
        }

        let status = if discrepancies.is_empty() {
            ReconciliationStatus::Consistent
        } else {
            tracing::warn!(
                task_id = %task_id,
                escrow_id = %escrow_id,
                discrepancies = discrepancies.len(),
                "store and ledger disagree"
            );
            ReconciliationStatus::Diverged(discrepancies)
        };
        Ok(ReconciliationReport {
            task_id,
            escrow_id: Some(escrow_id),
            status,
        })
    }

    /// Lists recorded divergences, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`super::MarketplaceError::Store`] when persistence fails.
    pub async fn list_divergences(&self) -> MarketplaceResult<Vec<DivergenceRecord>> {
        Ok(self.store.list_divergences().await?)
    }

    async fn executor_address(&self, task: &Task) -> MarketplaceResult<Option<LedgerAddress>> {
        let Some(executor) = task.executor() else {
            return Ok(None);
        };
        let account = self.store.find_user(executor).await?;
        Ok(account.map(|user| user.ledger_address().clone()))
    }
}
