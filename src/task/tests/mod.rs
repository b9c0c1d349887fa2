//! Unit tests for the task marketplace.

use std::sync::Arc;
use std::time::Duration;

use crate::config::MarketplaceConfig;
use crate::context::MarketplaceContext;
use crate::settlement::{
    adapters::memory::{InMemoryAllowanceAuthorizer, InMemoryEscrowLedger},
    domain::{LedgerAddress, LedgerAmount, calculator::to_ledger_units},
    services::{GatewaySettings, LedgerGateway},
};
use crate::task::{
    adapters::memory::InMemoryTaskStore,
    domain::{Milestone, Task, TaskId, UserId},
    services::{CreateTaskRequest, SubmitWorkRequest},
};
use mockable::DefaultClock;
use rust_decimal::Decimal;


type TestGateway = LedgerGateway<InMemoryEscrowLedger, InMemoryAllowanceAuthorizer>;
type TestContext = MarketplaceContext<InMemoryTaskStore, TestGateway, DefaultClock>;

/// Builds a deterministic address whose last byte is `seed`.
fn address(seed: u8) -> LedgerAddress {
    LedgerAddress::new(format!("0x{seed:040x}")).expect("generated address is valid")
}

fn user(name: &str) -> UserId {
    UserId::new(name).expect("valid user id")
}

fn units(amount: i64) -> LedgerAmount {
    to_ledger_units(Decimal::from(amount)).expect("amount converts")
}

/// Services over an in-memory store and ledger, with a funded creator and
/// two registered bidders.
struct Marketplace {
    store: Arc<InMemoryTaskStore>,
    ledger: InMemoryEscrowLedger,
    context: TestContext,
    creator: UserId,
    alice: UserId,
    bob: UserId,
}

impl Marketplace {
    async fn new() -> Self {
        Self::with_config(&MarketplaceConfig::default()).await
    }

    async fn with_config(config: &MarketplaceConfig) -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        let ledger = InMemoryEscrowLedger::new(address(0xe5), address(0x70));
        let authorizer = InMemoryAllowanceAuthorizer::new(ledger.clone());
        let settings = GatewaySettings::default()
            .with_confirmation_timeout(Duration::from_millis(200))
            .with_authorization_settle_delay(Duration::ZERO)
            .with_read_retry_backoff(Duration::from_millis(1));
        let gateway = Arc::new(LedgerGateway::new(
            Arc::new(ledger.clone()),
            Arc::new(authorizer),
            settings,
        ));
        let context = MarketplaceContext::new(
            Arc::clone(&store),
            gateway,
            Arc::new(DefaultClock),
            config,
        );
        let marketplace = Self {
            store,
            ledger,
            context,
            creator: user("creator"),
            alice: user("alice"),
            bob: user("bob"),
        };
        marketplace.register(&marketplace.creator, 0x01).await;
        marketplace.register(&marketplace.alice, 0x02).await;
        marketplace.register(&marketplace.bob, 0x03).await;
        marketplace.ledger.fund(&address(0x01), units(1_000));
        marketplace
    }

    async fn register(&self, id: &UserId, seed: u8) {
        self.context
            .reputation
            .register_user(id.clone(), address(seed))
            .await
            .expect("user registration should succeed");
    }

    async fn create_task(&self, reward: i64) -> Task {
        self.context
            .lifecycle
            .create_task(
                &self.creator,
                CreateTaskRequest::new("Build the widget", Decimal::from(reward))
                    .with_description("A widget")
                    .with_acceptance_criteria("It works"),
            )
            .await
            .expect("task creation should succeed")
            .task
    }

    /// Creates a task, has Alice bid, and selects her.
    async fn accepted_task(&self, reward: i64) -> TaskId {
        let task = self.create_task(reward).await;
        self.context
            .bidding
            .submit_bid(&self.alice, task.id(), "I can do it")
            .await
            .expect("bid should succeed");
        self.context
            .bidding
            .select_bidder(&self.creator, task.id(), &self.alice)
            .await
            .expect("selection should succeed");
        task.id()
    }

    async fn submit(&self, task_id: TaskId, milestone: Milestone) {
        self.context
            .lifecycle
            .submit_work(
                &self.alice,
                task_id,
                SubmitWorkRequest::new(milestone, format!("{milestone} deliverable")),
            )
            .await
            .expect("submission should succeed");
    }

    async fn approve(&self, task_id: TaskId, milestone: Milestone) -> Option<Decimal> {
        self.context
            .lifecycle
            .approve_milestone(&self.creator, task_id, milestone)
            .await
            .expect("approval should succeed")
            .amount
    }

    async fn task(&self, task_id: TaskId) -> Task {
        use crate::task::ports::TaskStore;
        self.store
            .find_task(task_id)
            .await
            .expect("lookup should succeed")
            .expect("task should exist")
    }
}
