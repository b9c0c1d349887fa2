//! Service wiring shared by every entry point.

use crate::config::MarketplaceConfig;
use crate::settlement::ports::EscrowGateway;
use crate::task::{
    ports::TaskStore,
    services::{BiddingService, ReconciliationService, ReputationService, TaskLifecycleService},
};
use mockable::Clock;
use std::sync::Arc;

/// The marketplace services built over one store, gateway and clock.
#[derive(Clone)]
pub struct MarketplaceContext<S, G, C>
where
    S: TaskStore,
    G: EscrowGateway,
    C: Clock + Send + Sync,
{
    /// Task creation, submission, review and cancellation.
    pub lifecycle: TaskLifecycleService<S, G, C>,
    /// Bidding and executor selection.
    pub bidding: BiddingService<S, G, C>,
    /// User registration and credit records.
    pub reputation: ReputationService<S>,
    /// Store-versus-ledger inspection.
    pub reconciliation: ReconciliationService<S, G>,
}

impl<S, G, C> MarketplaceContext<S, G, C>
where
    S: TaskStore,
    G: EscrowGateway,
    C: Clock + Send + Sync,
{
    /// Builds every service with the policy from `config`.
    #[must_use]
    pub fn new(store: Arc<S>, gateway: Arc<G>, clock: Arc<C>, config: &MarketplaceConfig) -> Self {
        let policy = config.reputation_policy();
        tracing::debug!(
            bid_credit_floor = policy.bid_credit_floor(),
            completion_bonus = policy.completion_bonus(),
            "building marketplace services"
        );
        Self {
            lifecycle: TaskLifecycleService::new(
                Arc::clone(&store),
                Arc::clone(&gateway),
                Arc::clone(&clock),
                policy,
            ),
            bidding: BiddingService::new(
                Arc::clone(&store),
                Arc::clone(&gateway),
                clock,
                policy,
            ),
            reputation: ReputationService::new(Arc::clone(&store)),
            reconciliation: ReconciliationService::new(store, gateway),
        }
    }
}
