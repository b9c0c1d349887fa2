//! Marketplace services over `PostgreSQL` and the in-memory ledger.

use super::helpers::{TestDatabase, address, test_runtime, user};
use milestone_escrow::{
    config::MarketplaceConfig,
    context::MarketplaceContext,
    settlement::{
        adapters::memory::{InMemoryAllowanceAuthorizer, InMemoryEscrowLedger},
        domain::{LedgerOperation, calculator::to_ledger_units},
        services::{GatewaySettings, LedgerGateway},
    },
    task::{
        adapters::postgres::PostgresTaskStore,
        domain::{Milestone, TaskId, TaskStatus},
        services::{CreateTaskRequest, ErrorKind, SubmitWorkRequest},
    },
};
use mockable::DefaultClock;
use pg_embedded_setup_unpriv::{TestCluster, test_support::shared_test_cluster};
use rstest::rstest;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

type PostgresContext = MarketplaceContext<
    PostgresTaskStore,
    LedgerGateway<InMemoryEscrowLedger, InMemoryAllowanceAuthorizer>,
    DefaultClock,
>;

// Field order matters: the context's pool must close before the database drops.
struct Market {
    context: PostgresContext,
    ledger: InMemoryEscrowLedger,
    _db: TestDatabase,
}

async fn open_market(db: TestDatabase, store: PostgresTaskStore) -> eyre::Result<Market> {
    let ledger = InMemoryEscrowLedger::new(address(0xe5), address(0x70));
    let authorizer = InMemoryAllowanceAuthorizer::new(ledger.clone());
    let settings = GatewaySettings::default()
        .with_confirmation_timeout(Duration::from_secs(2))
        .with_authorization_settle_delay(Duration::ZERO);
    let context = MarketplaceContext::new(
        Arc::new(store),
        Arc::new(LedgerGateway::new(
            Arc::new(ledger.clone()),
            Arc::new(authorizer),
            settings,
        )),
        Arc::new(DefaultClock),
        &MarketplaceConfig::default(),
    );
    for (name, seed) in [("creator", 0x01), ("alice", 0x02)] {
        context
            .reputation
            .register_user(user(name), address(seed))
            .await?;
    }
    ledger.fund(&address(0x01), to_ledger_units(Decimal::from(500))?);
    Ok(Market {
        context,
        ledger,
        _db: db,
    })
}

async fn accepted_task(context: &PostgresContext, reward: i64) -> eyre::Result<TaskId> {
    let created = context
        .lifecycle
        .create_task(
            &user("creator"),
            CreateTaskRequest::new("Migrate the schema", Decimal::from(reward)),
        )
        .await?;
    let id = created.task.id();
    context.bidding.submit_bid(&user("alice"), id, "ready").await?;
    context
        .bidding
        .select_bidder(&user("creator"), id, &user("alice"))
        .await?;
    Ok(id)
}

#[rstest]
fn milestones_settle_through_the_database(shared_test_cluster: &'static TestCluster) {
    let rt = test_runtime();
    let (db, store) =
        TestDatabase::create(shared_test_cluster, "service_flow").expect("database setup");
    let market = rt
        .block_on(open_market(db, store))
        .expect("market setup");
    let context = &market.context;
    let id = rt
        .block_on(accepted_task(context, 10))
        .expect("task accepted");

    for milestone in [Milestone::Design, Milestone::Implementation, Milestone::Final] {
        rt.block_on(context.lifecycle.submit_work(
            &user("alice"),
            id,
            SubmitWorkRequest::new(milestone, "delivered"),
        ))
        .expect("work submitted");
        rt.block_on(
            context
                .lifecycle
                .approve_milestone(&user("creator"), id, milestone),
        )
        .expect("milestone approved");
    }

    let detail = rt
        .block_on(context.lifecycle.get_task(&user("creator"), id))
        .expect("task loads");
    assert_eq!(detail.task.status(), TaskStatus::Completed);
    assert_eq!(detail.task.paid(), Decimal::from(10));
    assert_eq!(
        market.ledger.balance(&address(0x02)),
        to_ledger_units(Decimal::from(10)).expect("amount converts")
    );
    let report = rt
        .block_on(context.reconciliation.inspect(id))
        .expect("inspection succeeds");
    assert!(report.is_consistent(), "{report:?}");
    let alice = rt
        .block_on(context.reputation.get_user(&user("alice")))
        .expect("alice registered");
    assert_eq!(alice.credit().score(), 100);
}

#[rstest]
fn replayed_approval_conflicts_without_paying_twice(shared_test_cluster: &'static TestCluster) {
    let rt = test_runtime();
    let (db, store) =
        TestDatabase::create(shared_test_cluster, "service_replay").expect("database setup");
    let market = rt
        .block_on(open_market(db, store))
        .expect("market setup");
    let context = &market.context;
    let id = rt
        .block_on(accepted_task(context, 20))
        .expect("task accepted");
    rt.block_on(context.lifecycle.submit_work(
        &user("alice"),
        id,
        SubmitWorkRequest::new(Milestone::Design, "mockups"),
    ))
    .expect("work submitted");
    rt.block_on(
        context
            .lifecycle
            .approve_milestone(&user("creator"), id, Milestone::Design),
    )
    .expect("first approval");

    let err = rt
        .block_on(
            context
                .lifecycle
                .approve_milestone(&user("creator"), id, Milestone::Design),
        )
        .expect_err("design already approved");

    assert_eq!(err.kind(), ErrorKind::StateConflict);
    assert_eq!(market.ledger.applied_count(LedgerOperation::ReleaseFraction), 1);
}

#[rstest]
fn executor_cancellation_refunds_and_penalises(shared_test_cluster: &'static TestCluster) {
    let rt = test_runtime();
    let (db, store) =
        TestDatabase::create(shared_test_cluster, "service_cancel").expect("database setup");
    let market = rt
        .block_on(open_market(db, store))
        .expect("market setup");
    let context = &market.context;
    let id = rt
        .block_on(accepted_task(context, 100))
        .expect("task accepted");
    rt.block_on(context.lifecycle.submit_work(
        &user("alice"),
        id,
        SubmitWorkRequest::new(Milestone::Design, "mockups"),
    ))
    .expect("work submitted");
    rt.block_on(
        context
            .lifecycle
            .approve_milestone(&user("creator"), id, Milestone::Design),
    )
    .expect("design approved");

    let settled = rt
        .block_on(context.lifecycle.cancel_task(&user("alice"), id))
        .expect("executor cancels");

    assert_eq!(settled.task.status(), TaskStatus::Cancelled);
    assert_eq!(settled.amount, Some(Decimal::from(70)));
    let alice = rt
        .block_on(context.reputation.get_user(&user("alice")))
        .expect("alice registered");
    assert_eq!(alice.credit().score(), -100);
    assert_eq!(alice.credit().tasks_cancelled(), 1);
    assert_eq!(
        market.ledger.balance(&address(0x01)),
        to_ledger_units(Decimal::from(470)).expect("amount converts")
    );
}
