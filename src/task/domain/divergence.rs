//! Records of ledger effects the task store failed to mirror.

use super::TaskId;
use crate::settlement::domain::{EscrowId, LedgerOperation, TxReference};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A ledger-ahead-of-store inconsistency awaiting manual reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceRecord {
    /// Record identifier.
    pub id: Uuid,
    /// Task whose store row lags the ledger.
    pub task_id: TaskId,
    /// Escrow the effect landed on, when known.
    pub escrow_id: Option<EscrowId>,
    /// Ledger operation that was confirmed.
    pub operation: LedgerOperation,
    /// Ledger transaction reference.
    pub reference: TxReference,
    /// Amount moved, in display units.
    pub amount: Option<Decimal>,
    /// Store failure that left the divergence.
    pub detail: String,
    /// When the divergence was detected.
    pub detected_at: DateTime<Utc>,
}
