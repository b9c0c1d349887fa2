//! Application services orchestrating tasks, bids, the ledger and reputation.

mod bidding;
mod error;
mod lifecycle;
mod reconciliation;
mod reputation;
mod requests;
mod support;

pub use bidding::BiddingService;
pub use error::{
    DivergenceReport, ErrorKind, MarketplaceError, MarketplaceResult, RetrySafety,
};
pub use lifecycle::TaskLifecycleService;
pub use reconciliation::{
    Discrepancy, ReconciliationReport, ReconciliationService, ReconciliationStatus,
};
pub use reputation::{
    DEFAULT_BID_CREDIT_FLOOR, DEFAULT_COMPLETION_BONUS, ReputationPolicy, ReputationService,
};
pub use requests::{
    Balance, CreateTaskRequest, SettledTransition, SubmitWorkRequest, SubmittedWork, TaskDetail,
};
