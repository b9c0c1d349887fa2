//! Shared harness for in-memory marketplace integration tests.

use milestone_escrow::{
    api::{ApiRequest, ApiResponse, MarketplaceApi, Operation},
    config::MarketplaceConfig,
    context::MarketplaceContext,
    settlement::{
        adapters::memory::{InMemoryAllowanceAuthorizer, InMemoryEscrowLedger},
        domain::{LedgerAddress, LedgerAmount, calculator::to_ledger_units},
        services::{GatewaySettings, LedgerGateway},
    },
    task::{adapters::memory::InMemoryTaskStore, domain::UserId},
};
use mockable::DefaultClock;
use rstest::fixture;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Gateway over the in-memory ledger.
pub type TestGateway = LedgerGateway<InMemoryEscrowLedger, InMemoryAllowanceAuthorizer>;

/// Services over the in-memory store and ledger.
pub type TestContext = MarketplaceContext<InMemoryTaskStore, TestGateway, DefaultClock>;

/// Dispatcher over [`TestContext`].
pub type TestApi = MarketplaceApi<InMemoryTaskStore, TestGateway, DefaultClock>;

/// Confirmation timeout used by the harness gateway.
pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_millis(200);

/// Builds a deterministic ledger address ending in `seed`.
///
/// # Panics
///
/// Never in practice: the generated address is always well formed.
#[must_use]
pub fn address(seed: u8) -> LedgerAddress {
    LedgerAddress::new(format!("0x{seed:040x}")).expect("generated address is valid")
}

/// Parses a user identifier.
///
/// # Panics
///
/// Panics when `name` is blank.
#[must_use]
pub fn user(name: &str) -> UserId {
    UserId::new(name).expect("valid user id")
}

/// Converts whole tokens into ledger units.
///
/// # Panics
///
/// Panics when the amount is negative.
#[must_use]
pub fn tokens(amount: i64) -> LedgerAmount {
    to_ledger_units(Decimal::from(amount)).expect("amount converts")
}

/// In-memory marketplace with a funded creator and two registered bidders.
pub struct Harness {
    /// Backing store.
    pub store: Arc<InMemoryTaskStore>,
    /// Backing ledger.
    pub ledger: InMemoryEscrowLedger,
    /// Allowance authorizer wired into the gateway.
    pub authorizer: InMemoryAllowanceAuthorizer,
    /// Request dispatcher over the wired services.
    pub api: TestApi,
}

impl Harness {
    /// Builds the harness with `config`.
    ///
    /// # Panics
    ///
    /// Panics when user registration fails.
    pub async fn with_config(config: &MarketplaceConfig) -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        let ledger = InMemoryEscrowLedger::new(address(0xe5), address(0x70));
        let authorizer = InMemoryAllowanceAuthorizer::new(ledger.clone());
        let settings = GatewaySettings::default()
            .with_confirmation_timeout(CONFIRMATION_TIMEOUT)
            .with_authorization_settle_delay(Duration::ZERO)
            .with_read_retry_backoff(Duration::from_millis(1));
        let gateway = Arc::new(LedgerGateway::new(
            Arc::new(ledger.clone()),
            Arc::new(authorizer.clone()),
            settings,
        ));
        let context = MarketplaceContext::new(
            Arc::clone(&store),
            gateway,
            Arc::new(DefaultClock),
            config,
        );
        let harness = Self {
            store,
            ledger,
            authorizer,
            api: MarketplaceApi::new(context),
        };
        for (name, seed) in [("creator", 0x01), ("alice", 0x02), ("bob", 0x03)] {
            harness
                .context()
                .reputation
                .register_user(user(name), address(seed))
                .await
                .expect("user registration should succeed");
        }
        harness.ledger.fund(&address(0x01), tokens(1_000));
        harness
    }

    /// Returns the wired services.
    #[must_use]
    pub const fn context(&self) -> &TestContext {
        self.api.context()
    }

    /// Sends `body` for `operation` as `caller`.
    pub async fn call(&self, caller: &str, operation: Operation, body: Value) -> ApiResponse {
        self.api
            .handle(ApiRequest::new(Some(user(caller)), operation).with_body(body))
            .await
    }
}

/// Provides the default configuration.
#[fixture]
pub fn config() -> MarketplaceConfig {
    MarketplaceConfig::default()
}
