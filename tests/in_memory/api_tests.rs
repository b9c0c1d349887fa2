//! End-to-end dispatcher tests over the in-memory store and ledger.

use super::helpers::{Harness, address, config, tokens, user};
use eyre::{OptionExt, ensure};
use milestone_escrow::{
    api::{ApiRequest, Operation},
    config::MarketplaceConfig,
    settlement::domain::LedgerOperation,
    task::domain::{TaskId, TaskStatus},
};
use rstest::rstest;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use uuid::Uuid;

fn task_id(body: &Value) -> Result<TaskId, eyre::Report> {
    let raw = body
        .pointer("/task/id")
        .and_then(Value::as_str)
        .ok_or_eyre("response should carry the task id")?;
    Ok(TaskId::from_uuid(Uuid::parse_str(raw)?))
}

fn status(body: &Value) -> Option<&str> {
    body.pointer("/task/status").and_then(Value::as_str)
}

async fn accepted_task(harness: &Harness, reward: &str) -> Result<TaskId, eyre::Report> {
    let created = harness
        .call(
            "creator",
            Operation::CreateTask,
            json!({ "name": "Ship the release", "reward": reward }),
        )
        .await;
    ensure!(created.status == 201, "create returned {}", created.status);
    let id = task_id(&created.body)?;
    let bid = harness
        .call("alice", Operation::SubmitBid(id), json!({ "message": "on it" }))
        .await;
    ensure!(bid.status == 201, "bid returned {}", bid.status);
    let selected = harness
        .call("creator", Operation::SelectBidder(id), json!({ "bidder": "alice" }))
        .await;
    ensure!(selected.status == 200, "select returned {}", selected.status);
    Ok(id)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn full_milestone_flow_pays_out_the_reward(
    config: MarketplaceConfig,
) -> Result<(), eyre::Report> {
    let harness = Harness::with_config(&config).await;
    let id = accepted_task(&harness, "10").await?;

    let mut last = Value::Null;
    for (milestone, expected) in [("design", "3"), ("implementation", "5"), ("final", "2")] {
        let submitted = harness
            .call(
                "alice",
                Operation::SubmitWork(id),
                json!({ "milestone": milestone, "content": "done", "attachments": [] }),
            )
            .await;
        ensure!(submitted.status == 201, "{milestone} submit: {}", submitted.body);
        let approved = harness
            .call(
                "creator",
                Operation::ApproveMilestone(id),
                json!({ "milestone": milestone }),
            )
            .await;
        ensure!(approved.status == 200, "{milestone} approve: {}", approved.body);
        let amount = approved
            .body
            .get("amount")
            .and_then(Value::as_str)
            .ok_or_eyre("amount rendered as a string")?;
        ensure!(
            amount.parse::<Decimal>()? == expected.parse()?,
            "{milestone} paid {amount}"
        );
        ensure!(
            approved.body.get("reference").is_some_and(Value::is_string),
            "ledger reference returned"
        );
        last = approved.body;
    }

    ensure!(status(&last) == Some(TaskStatus::Completed.as_str()), "completed");
    ensure!(harness.ledger.balance(&address(0x02)) == tokens(10), "alice paid");
    let account = harness
        .context()
        .reputation
        .get_user(&user("alice"))
        .await?;
    ensure!(account.credit().tasks_completed() == 1, "one completion");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_caller_is_unauthorized(config: MarketplaceConfig) {
    let harness = Harness::with_config(&config).await;

    let response = harness
        .api
        .handle(ApiRequest::new(None, Operation::GetBalance))
        .await;

    assert_eq!(response.status, 401);
    assert_eq!(response.error_kind(), Some("unauthorized"));
}

#[rstest]
#[case(json!({ "name": "No reward" }))]
#[case(json!({ "name": "Bad reward", "reward": "ten" }))]
#[case(json!({ "name": "Extra", "reward": "1", "colour": "blue" }))]
#[tokio::test(flavor = "multi_thread")]
async fn malformed_bodies_are_validation_errors(config: MarketplaceConfig, #[case] body: Value) {
    let harness = Harness::with_config(&config).await;

    let response = harness.call("creator", Operation::CreateTask, body).await;

    assert_eq!(response.status, 400);
    assert_eq!(response.error_kind(), Some("validation_error"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn approval_while_bidding_is_a_conflict(
    config: MarketplaceConfig,
) -> Result<(), eyre::Report> {
    let harness = Harness::with_config(&config).await;
    let created = harness
        .call(
            "creator",
            Operation::CreateTask,
            json!({ "name": "Ship the release", "reward": "100" }),
        )
        .await;
    let id = task_id(&created.body)?;
    harness
        .call("alice", Operation::SubmitBid(id), json!({ "message": "me" }))
        .await;

    let response = harness
        .call(
            "creator",
            Operation::ApproveMilestone(id),
            json!({ "milestone": "design" }),
        )
        .await;

    ensure!(response.status == 409, "got {}", response.status);
    ensure!(response.error_kind() == Some("state_conflict"), "{}", response.body);
    ensure!(
        response.body.pointer("/error/retry_safe") == Some(&Value::Bool(true)),
        "conflicts are retry-safe"
    );
    let detail = harness.call("creator", Operation::GetTask(id), Value::Null).await;
    ensure!(status(&detail.body) == Some("bidding"), "status unchanged");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn divergence_is_rendered_with_its_context(
    config: MarketplaceConfig,
) -> Result<(), eyre::Report> {
    let harness = Harness::with_config(&config).await;
    let id = accepted_task(&harness, "100").await?;
    harness
        .call(
            "alice",
            Operation::SubmitWork(id),
            json!({ "milestone": "design", "content": "mockups" }),
        )
        .await;
    harness.store.fail_next_writes(1);

    let response = harness
        .call(
            "creator",
            Operation::ApproveMilestone(id),
            json!({ "milestone": "design" }),
        )
        .await;

    ensure!(response.status == 500, "got {}", response.status);
    ensure!(response.error_kind() == Some("divergence"), "{}", response.body);
    ensure!(
        response.body.pointer("/error/retry_safe") == Some(&Value::Bool(false)),
        "support required"
    );
    let divergence = response
        .body
        .pointer("/error/divergence")
        .ok_or_eyre("divergence context")?;
    ensure!(
        divergence.get("operation").and_then(Value::as_str) == Some("release_fraction"),
        "operation named: {divergence}"
    );
    ensure!(
        divergence.get("reference").is_some_and(Value::is_string),
        "reference carried"
    );
    ensure!(
        harness.ledger.applied_count(LedgerOperation::ReleaseFraction) == 1,
        "released once"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn bids_below_the_floor_are_forbidden() {
    let mut config = MarketplaceConfig::default();
    config.reputation.bid_credit_floor = 10;
    let harness = Harness::with_config(&config).await;
    let created = harness
        .call(
            "creator",
            Operation::CreateTask,
            json!({ "name": "Ship the release", "reward": "5" }),
        )
        .await;
    let id = task_id(&created.body).expect("task created");

    let response = harness
        .call("bob", Operation::SubmitBid(id), json!({ "message": "new" }))
        .await;

    assert_eq!(response.status, 403);
    assert_eq!(response.error_kind(), Some("insufficient_reputation"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancellation_reports_the_refund(config: MarketplaceConfig) -> Result<(), eyre::Report> {
    let harness = Harness::with_config(&config).await;
    let id = accepted_task(&harness, "100").await?;
    harness
        .call(
            "alice",
            Operation::SubmitWork(id),
            json!({ "milestone": "design", "content": "mockups" }),
        )
        .await;
    harness
        .call(
            "creator",
            Operation::ApproveMilestone(id),
            json!({ "milestone": "design" }),
        )
        .await;

    let cancelled = harness.call("creator", Operation::CancelTask(id), Value::Null).await;

    ensure!(cancelled.status == 200, "{}", cancelled.body);
    ensure!(status(&cancelled.body) == Some("cancelled"), "cancelled");
    let refund = cancelled
        .body
        .get("amount")
        .and_then(Value::as_str)
        .ok_or_eyre("refund amount")?;
    ensure!(refund.parse::<Decimal>()? == Decimal::from(70), "refund {refund}");
    ensure!(harness.ledger.balance(&address(0x01)) == tokens(970), "creator refunded");

    let again = harness.call("alice", Operation::CancelTask(id), Value::Null).await;
    ensure!(again.status == 409, "terminal tasks stay cancelled");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn balance_and_listing_render_as_json(
    config: MarketplaceConfig,
) -> Result<(), eyre::Report> {
    let harness = Harness::with_config(&config).await;
    accepted_task(&harness, "25").await?;

    let balance = harness.call("creator", Operation::GetBalance, Value::Null).await;
    ensure!(balance.status == 200, "{}", balance.body);
    ensure!(
        balance.body.get("amount").and_then(Value::as_str) == Some("975.00000000"),
        "balance rendered with eight decimals: {}",
        balance.body
    );

    let listed = harness
        .call("bob", Operation::ListTasks, json!({ "executor": "alice" }))
        .await;
    ensure!(listed.status == 200, "{}", listed.body);
    let entries = listed.body.as_array().ok_or_eyre("list renders an array")?;
    ensure!(entries.len() == 1, "one task executed by alice");
    ensure!(
        entries
            .first()
            .and_then(|entry| entry.get("pending_bids"))
            .and_then(Value::as_u64)
            == Some(0),
        "no pending bids remain"
    );
    Ok(())
}
