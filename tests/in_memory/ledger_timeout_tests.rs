//! Confirmation timeouts resolved through receipt lookup.

use super::helpers::{CONFIRMATION_TIMEOUT, Harness, address, config, tokens, user};
use eyre::ensure;
use milestone_escrow::{
    config::MarketplaceConfig,
    settlement::{adapters::memory::LatencyPhase, domain::LedgerOperation},
    task::{
        domain::{Milestone, TaskId, TaskStatus},
        ports::TaskStore,
        services::{CreateTaskRequest, ErrorKind, RetrySafety, SubmitWorkRequest},
    },
};
use rstest::rstest;
use rust_decimal::Decimal;

async fn design_submitted(harness: &Harness) -> Result<TaskId, eyre::Report> {
    let context = harness.context();
    let id = context
        .lifecycle
        .create_task(
            &user("creator"),
            CreateTaskRequest::new("Tune the indexer", Decimal::from(100)),
        )
        .await?
        .task
        .id();
    context.bidding.submit_bid(&user("alice"), id, "mine").await?;
    context
        .bidding
        .select_bidder(&user("creator"), id, &user("alice"))
        .await?;
    context
        .lifecycle
        .submit_work(
            &user("alice"),
            id,
            SubmitWorkRequest::new(Milestone::Design, "mockups"),
        )
        .await?;
    Ok(id)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn late_confirmation_with_a_receipt_counts_as_applied(
    config: MarketplaceConfig,
) -> Result<(), eyre::Report> {
    let harness = Harness::with_config(&config).await;
    let id = design_submitted(&harness).await?;
    harness.ledger.set_latency(
        LedgerOperation::ReleaseFraction,
        CONFIRMATION_TIMEOUT.saturating_mul(3),
        LatencyPhase::AfterApply,
    );

    let settled = harness
        .context()
        .lifecycle
        .approve_milestone(&user("creator"), id, Milestone::Design)
        .await?;

    ensure!(settled.task.status() == TaskStatus::DesignApproved, "approved");
    ensure!(settled.reference.is_some(), "receipt found by lookup");
    ensure!(harness.ledger.balance(&address(0x02)) == tokens(30), "paid");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn timeout_without_a_receipt_is_retry_safe(
    config: MarketplaceConfig,
) -> Result<(), eyre::Report> {
    let harness = Harness::with_config(&config).await;
    let id = design_submitted(&harness).await?;
    harness.ledger.set_latency(
        LedgerOperation::ReleaseFraction,
        CONFIRMATION_TIMEOUT.saturating_mul(3),
        LatencyPhase::BeforeApply,
    );

    let err = harness
        .context()
        .lifecycle
        .approve_milestone(&user("creator"), id, Milestone::Design)
        .await
        .expect_err("release never confirmed");

    ensure!(err.kind() == ErrorKind::LedgerFailure, "got {err}");
    ensure!(err.retry_safety() == RetrySafety::Safe, "nothing moved");
    ensure!(
        harness.ledger.applied_count(LedgerOperation::ReleaseFraction) == 0,
        "no release applied"
    );
    let stored = harness
        .store
        .find_task(id)
        .await?
        .ok_or_else(|| eyre::eyre!("task exists"))?;
    ensure!(stored.status() == TaskStatus::DesignSubmitted, "still in review");

    harness.ledger.clear_latency(LedgerOperation::ReleaseFraction);
    let settled = harness
        .context()
        .lifecycle
        .approve_milestone(&user("creator"), id, Milestone::Design)
        .await?;
    ensure!(settled.amount == Some(Decimal::from(30)), "retry pays");
    ensure!(
        harness.ledger.applied_count(LedgerOperation::ReleaseFraction) == 1,
        "applied exactly once"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn refused_authorization_creates_nothing(config: MarketplaceConfig) {
    let harness = Harness::with_config(&config).await;
    harness.authorizer.refuse_requests(true);

    let err = harness
        .context()
        .lifecycle
        .create_task(
            &user("creator"),
            CreateTaskRequest::new("Tune the indexer", Decimal::from(100)),
        )
        .await
        .expect_err("allowance cannot be raised");

    assert_eq!(err.kind(), ErrorKind::LedgerFailure);
    assert_eq!(harness.authorizer.call_count(), 1);
    assert_eq!(harness.ledger.applied_count(LedgerOperation::OpenEscrow), 0);
}
