//! Given steps for milestone settlement BDD scenarios.

use super::world::{SettlementWorld, run_async, user};
use eyre::WrapErr;
use milestone_escrow::{
    settlement::domain::calculator::to_ledger_units,
    task::services::CreateTaskRequest,
};
use rstest_bdd_macros::given;
use rust_decimal::Decimal;

fn register(world: &mut SettlementWorld, name: &str) -> Result<(), eyre::Report> {
    let address = world.next_address();
    run_async(
        world
            .context
            .reputation
            .register_user(user(name)?, address.clone()),
    )
    .wrap_err_with(|| format!("register {name}"))?;
    world.addresses.insert(name.to_owned(), address);
    Ok(())
}

#[given(r#"a creator "{name}" funded with {amount:i64} tokens"#)]
fn funded_creator(
    world: &mut SettlementWorld,
    name: String,
    amount: i64,
) -> Result<(), eyre::Report> {
    register(world, &name)?;
    let units = to_ledger_units(Decimal::from(amount)).wrap_err("convert funding amount")?;
    world.ledger.fund(world.address_of(&name)?, units);
    Ok(())
}

#[given(r#"an executor "{name}""#)]
fn executor(world: &mut SettlementWorld, name: String) -> Result<(), eyre::Report> {
    register(world, &name)
}

#[given(r#""{creator}" has posted a task "{title}" with reward "{reward}""#)]
fn posted_task(
    world: &mut SettlementWorld,
    creator: String,
    title: String,
    reward: String,
) -> Result<(), eyre::Report> {
    let amount: Decimal = reward.parse().wrap_err("parse reward")?;
    let creator_id = user(&creator)?;
    let created = run_async(
        world
            .context
            .lifecycle
            .create_task(&creator_id, CreateTaskRequest::new(title, amount)),
    )
    .wrap_err("create task for scenario")?;
    world.task_id = Some(created.task.id());
    world.creator = Some(creator_id);
    Ok(())
}

fn place_bid(world: &SettlementWorld, bidder: &str) -> Result<(), eyre::Report> {
    let task_id = world.task_id()?;
    run_async(
        world
            .context
            .bidding
            .submit_bid(&user(bidder)?, task_id, "I can do this"),
    )
    .wrap_err("submit bid for scenario")?;
    Ok(())
}

#[given(r#""{bidder}" has bid on the task"#)]
fn has_bid(world: &mut SettlementWorld, bidder: String) -> Result<(), eyre::Report> {
    place_bid(world, &bidder)
}

#[given(r#""{executor}" has been selected to execute the task"#)]
fn selected_executor(world: &mut SettlementWorld, executor: String) -> Result<(), eyre::Report> {
    place_bid(world, &executor)?;
    let task_id = world.task_id()?;
    let creator = world.creator()?;
    run_async(
        world
            .context
            .bidding
            .select_bidder(&creator, task_id, &user(&executor)?),
    )
    .wrap_err("select executor for scenario")?;
    Ok(())
}
