//! Then steps for milestone settlement BDD scenarios.

use super::world::{SettlementWorld, run_async, user};
use milestone_escrow::{
    settlement::domain::calculator::to_ledger_units,
    task::{
        domain::TaskStatus,
        ports::TaskStore,
        services::RetrySafety,
    },
};
use rstest_bdd_macros::then;
use rust_decimal::Decimal;

#[then(r#"the task status is "{status}""#)]
fn task_status_is(world: &SettlementWorld, status: String) -> Result<(), eyre::Report> {
    let expected = TaskStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let task = run_async(world.store.find_task(world.task_id()?))?
        .ok_or_else(|| eyre::eyre!("scenario task missing from store"))?;

    if task.status() != expected {
        return Err(eyre::eyre!(
            "expected status {}, found {}",
            expected.as_str(),
            task.status().as_str()
        ));
    }
    Ok(())
}

#[then(r#"the last settlement moved "{amount}" tokens"#)]
fn last_settlement_moved(world: &SettlementWorld, amount: String) -> Result<(), eyre::Report> {
    let expected: Decimal = amount
        .parse()
        .map_err(|err| eyre::eyre!("invalid amount in scenario: {err}"))?;
    let settled = world
        .last_settlement
        .as_ref()
        .ok_or_else(|| eyre::eyre!("no settlement recorded"))?;

    if settled.amount != Some(expected) {
        return Err(eyre::eyre!(
            "expected {expected} to move, got {:?}",
            settled.amount
        ));
    }
    Ok(())
}

#[then(r#""{name}" holds {amount:i64} tokens on the ledger"#)]
fn holds_tokens(world: &SettlementWorld, name: String, amount: i64) -> Result<(), eyre::Report> {
    let expected = to_ledger_units(Decimal::from(amount))
        .map_err(|err| eyre::eyre!("invalid amount in scenario: {err}"))?;
    let balance = world.ledger.balance(world.address_of(&name)?);

    if balance != expected {
        return Err(eyre::eyre!("expected {name} to hold {expected}, found {balance}"));
    }
    Ok(())
}

#[then(r#""{name}" has a credit score of {score:i64}"#)]
fn credit_score_is(world: &SettlementWorld, name: String, score: i64) -> Result<(), eyre::Report> {
    let account = run_async(world.context.reputation.get_user(&user(&name)?))?;

    if account.credit().score() != score {
        return Err(eyre::eyre!(
            "expected {name} to score {score}, found {}",
            account.credit().score()
        ));
    }
    Ok(())
}

#[then(r#"the request fails with "{kind}""#)]
fn request_fails_with(world: &SettlementWorld, kind: String) -> Result<(), eyre::Report> {
    let err = world
        .last_error
        .as_ref()
        .ok_or_else(|| eyre::eyre!("expected a failure, but the request succeeded"))?;

    if err.kind().as_str() != kind {
        return Err(eyre::eyre!("expected {kind}, got {} ({err})", err.kind()));
    }
    Ok(())
}

#[then("the failure is safe to retry")]
fn failure_is_retry_safe(world: &SettlementWorld) -> Result<(), eyre::Report> {
    expect_retry_safety(world, RetrySafety::Safe)
}

#[then("the failure requires support")]
fn failure_requires_support(world: &SettlementWorld) -> Result<(), eyre::Report> {
    expect_retry_safety(world, RetrySafety::ContactSupport)
}

fn expect_retry_safety(world: &SettlementWorld, expected: RetrySafety) -> Result<(), eyre::Report> {
    let err = world
        .last_error
        .as_ref()
        .ok_or_else(|| eyre::eyre!("expected a failure, but the request succeeded"))?;

    if err.retry_safety() != expected {
        return Err(eyre::eyre!(
            "expected {expected:?}, got {:?}",
            err.retry_safety()
        ));
    }
    Ok(())
}

#[then("{count:usize} divergence is recorded")]
fn divergences_recorded(world: &SettlementWorld, count: usize) -> Result<(), eyre::Report> {
    let recorded = run_async(world.context.reconciliation.list_divergences())?;

    if recorded.len() != count {
        return Err(eyre::eyre!(
            "expected {count} divergence records, found {}",
            recorded.len()
        ));
    }
    Ok(())
}
