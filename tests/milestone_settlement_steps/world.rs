//! Shared world state for milestone settlement BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use milestone_escrow::{
    config::MarketplaceConfig,
    context::MarketplaceContext,
    settlement::{
        adapters::memory::{InMemoryAllowanceAuthorizer, InMemoryEscrowLedger},
        domain::LedgerAddress,
        services::{GatewaySettings, LedgerGateway},
    },
    task::{
        adapters::memory::InMemoryTaskStore,
        domain::{TaskId, UserId},
        services::{MarketplaceError, SettledTransition},
    },
};
use mockable::DefaultClock;
use rstest::fixture;
use std::collections::HashMap;

/// Services used by the BDD world.
pub type TestContext = MarketplaceContext<
    InMemoryTaskStore,
    LedgerGateway<InMemoryEscrowLedger, InMemoryAllowanceAuthorizer>,
    DefaultClock,
>;

/// Scenario world for milestone settlement behaviour tests.
pub struct SettlementWorld {
    pub store: Arc<InMemoryTaskStore>,
    pub ledger: InMemoryEscrowLedger,
    pub context: TestContext,
    pub addresses: HashMap<String, LedgerAddress>,
    pub creator: Option<UserId>,
    pub task_id: Option<TaskId>,
    pub last_settlement: Option<SettledTransition>,
    pub last_error: Option<MarketplaceError>,
}

impl SettlementWorld {
    /// Creates a world over an empty store and ledger.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        let ledger = InMemoryEscrowLedger::new(seeded_address(0xe5), seeded_address(0x70));
        let authorizer = InMemoryAllowanceAuthorizer::new(ledger.clone());
        let settings = GatewaySettings::default()
            .with_confirmation_timeout(Duration::from_secs(1))
            .with_authorization_settle_delay(Duration::ZERO);
        let gateway = LedgerGateway::new(Arc::new(ledger.clone()), Arc::new(authorizer), settings);
        let context = MarketplaceContext::new(
            Arc::clone(&store),
            Arc::new(gateway),
            Arc::new(DefaultClock),
            &MarketplaceConfig::default(),
        );

        Self {
            store,
            ledger,
            context,
            addresses: HashMap::new(),
            creator: None,
            task_id: None,
            last_settlement: None,
            last_error: None,
        }
    }

    /// Returns the task the scenario works on.
    pub fn task_id(&self) -> Result<TaskId, eyre::Report> {
        self.task_id
            .ok_or_else(|| eyre::eyre!("missing task in scenario world"))
    }

    /// Returns the creator of the scenario task.
    pub fn creator(&self) -> Result<UserId, eyre::Report> {
        self.creator
            .clone()
            .ok_or_else(|| eyre::eyre!("missing creator in scenario world"))
    }

    /// Returns the ledger address registered for `name`.
    pub fn address_of(&self, name: &str) -> Result<&LedgerAddress, eyre::Report> {
        self.addresses
            .get(name)
            .ok_or_else(|| eyre::eyre!("user {name} is not registered in scenario world"))
    }

    /// Allocates the next ledger address for a newly registered user.
    pub fn next_address(&self) -> LedgerAddress {
        let seed = u8::try_from(self.addresses.len()).unwrap_or(u8::MAX).saturating_add(1);
        seeded_address(seed)
    }

    /// Records the outcome of a settling operation.
    pub fn record(&mut self, result: Result<SettledTransition, MarketplaceError>) {
        match result {
            Ok(settled) => {
                self.last_settlement = Some(settled);
                self.last_error = None;
            }
            Err(err) => self.last_error = Some(err),
        }
    }
}

impl Default for SettlementWorld {
    fn default() -> Self {
        Self::new()
    }
}

fn seeded_address(seed: u8) -> LedgerAddress {
    LedgerAddress::new(format!("0x{seed:040x}")).expect("generated address is valid")
}

/// Parses a user identifier from a scenario parameter.
pub fn user(name: &str) -> Result<UserId, eyre::Report> {
    UserId::new(name).map_err(|err| eyre::eyre!("invalid user {name}: {err}"))
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> SettlementWorld {
    SettlementWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
