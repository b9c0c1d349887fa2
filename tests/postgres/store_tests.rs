//! Store contract tests against `PostgreSQL`.

use super::helpers::{TestDatabase, seed_users, test_runtime, user};
use chrono::{TimeDelta, Utc};
use milestone_escrow::{
    settlement::domain::{EscrowId, LedgerOperation, TxReference},
    task::{
        adapters::postgres::PostgresTaskStore,
        domain::{
            Bid, BidStatus, DivergenceRecord, Milestone, ReputationReason, Submission,
            SubmissionStatus, Task, TaskDraft, TaskStatus,
        },
        ports::{TaskFilter, TaskStore, TaskStoreError, TaskTransition},
        services::ReputationPolicy,
    },
};
use mockable::DefaultClock;
use pg_embedded_setup_unpriv::{TestCluster, test_support::shared_test_cluster};
use rstest::rstest;
use rust_decimal::Decimal;
use uuid::Uuid;

fn funded_task(escrow: u64) -> Task {
    let mut task = Task::new(
        TaskDraft::new(user("creator"), "Index the archive", Decimal::new(4050, 2)),
        &DefaultClock,
    )
    .expect("valid draft");
    task.attach_escrow(EscrowId::new(escrow), &DefaultClock)
        .expect("escrow attaches");
    task
}

async fn accepted(store: &PostgresTaskStore, escrow: u64) -> Task {
    let task = funded_task(escrow);
    store.insert_task(&task).await.expect("insert succeeds");
    let mut bidding = task.clone();
    bidding.open_bidding(&DefaultClock).expect("bidding opens");
    let bid = Bid::new(task.id(), user("alice"), "pick me", 0, &DefaultClock);
    store
        .record_bid(&bid, Some(&TaskTransition::new(TaskStatus::Pending, bidding.clone())))
        .await
        .expect("bid recorded");
    let mut selected = bidding;
    selected
        .assign_executor(user("alice"), &DefaultClock)
        .expect("executor assigned");
    store
        .commit_selection(&TaskTransition::new(TaskStatus::Bidding, selected.clone()), bid.id())
        .await
        .expect("selection committed");
    selected
}

#[rstest]
fn tasks_round_trip_with_exact_amounts(shared_test_cluster: &'static TestCluster) {
    let (_db, store) =
        TestDatabase::create(shared_test_cluster, "round_trip").expect("database setup");
    let rt = test_runtime();
    rt.block_on(seed_users(&store)).expect("users seeded");
    let task = funded_task(1);

    rt.block_on(store.insert_task(&task)).expect("insert succeeds");
    let stored = rt
        .block_on(store.find_task(task.id()))
        .expect("lookup succeeds")
        .expect("task exists");

    assert_eq!(stored.id(), task.id());
    assert_eq!(stored.reward(), Decimal::new(4050, 2));
    assert_eq!(stored.paid(), Decimal::ZERO);
    assert_eq!(stored.escrow_id(), Some(EscrowId::new(1)));
    assert_eq!(stored.status(), TaskStatus::Pending);
    assert_eq!(stored.creator(), &user("creator"));
}

#[rstest]
fn duplicate_users_and_tasks_are_refused(shared_test_cluster: &'static TestCluster) {
    let (_db, store) =
        TestDatabase::create(shared_test_cluster, "duplicates").expect("database setup");
    let rt = test_runtime();
    rt.block_on(seed_users(&store)).expect("users seeded");

    let user_err = rt
        .block_on(seed_users(&store))
        .expect_err("users already registered");
    let task = funded_task(2);
    rt.block_on(store.insert_task(&task)).expect("first insert");
    let task_err = rt
        .block_on(store.insert_task(&task))
        .expect_err("duplicate task");

    assert!(matches!(
        user_err.downcast_ref::<TaskStoreError>(),
        Some(TaskStoreError::DuplicateUser(_))
    ));
    assert!(matches!(task_err, TaskStoreError::DuplicateTask(id) if id == task.id()));
}

#[rstest]
fn status_guards_reject_stale_writes(shared_test_cluster: &'static TestCluster) {
    let (_db, store) =
        TestDatabase::create(shared_test_cluster, "status_guard").expect("database setup");
    let rt = test_runtime();
    rt.block_on(seed_users(&store)).expect("users seeded");
    let task = funded_task(3);
    rt.block_on(store.insert_task(&task)).expect("insert succeeds");
    let mut cancelled = task.clone();
    cancelled.cancel(&DefaultClock).expect("pending cancels");

    let err = rt
        .block_on(
            store
                .update_task(&TaskTransition::new(TaskStatus::Bidding, cancelled)),
        )
        .expect_err("task is pending, not bidding");

    assert!(matches!(
        err,
        TaskStoreError::StateConflict {
            expected: TaskStatus::Bidding,
            ..
        }
    ));
    let stored = rt
        .block_on(store.find_task(task.id()))
        .expect("lookup succeeds")
        .expect("task exists");
    assert_eq!(stored.status(), TaskStatus::Pending);
}

#[rstest]
fn rebids_keep_their_id_and_snapshot(shared_test_cluster: &'static TestCluster) {
    let (_db, store) =
        TestDatabase::create(shared_test_cluster, "rebid").expect("database setup");
    let rt = test_runtime();
    rt.block_on(seed_users(&store)).expect("users seeded");
    let task = funded_task(4);
    rt.block_on(store.insert_task(&task)).expect("insert succeeds");
    let original = Bid::new(task.id(), user("alice"), "first", 40, &DefaultClock);
    rt.block_on(store.record_bid(&original, None))
        .expect("first bid");

    let revision = Bid::new(task.id(), user("alice"), "second", 90, &DefaultClock);
    let stored = rt
        .block_on(store.record_bid(&revision, None))
        .expect("revision");

    assert_eq!(stored.id(), original.id());
    assert_eq!(stored.message(), "second");
    assert_eq!(stored.credit_snapshot(), 40);
    let bids = rt.block_on(store.find_bids(task.id())).expect("bids listed");
    assert_eq!(bids.len(), 1);
}

#[rstest]
fn selection_rejects_the_other_bids(shared_test_cluster: &'static TestCluster) {
    let (_db, store) =
        TestDatabase::create(shared_test_cluster, "selection").expect("database setup");
    let rt = test_runtime();
    rt.block_on(seed_users(&store)).expect("users seeded");
    let task = funded_task(5);
    rt.block_on(store.insert_task(&task)).expect("insert succeeds");
    let mut bidding = task.clone();
    bidding.open_bidding(&DefaultClock).expect("bidding opens");
    let alice = Bid::new(task.id(), user("alice"), "a", 0, &DefaultClock);
    let bob = Bid::new(task.id(), user("bob"), "b", 0, &DefaultClock);
    rt.block_on(
        store
            .record_bid(&alice, Some(&TaskTransition::new(TaskStatus::Pending, bidding.clone()))),
    )
    .expect("alice bids");
    rt.block_on(store.record_bid(&bob, None)).expect("bob bids");
    let mut selected = bidding;
    selected
        .assign_executor(user("bob"), &DefaultClock)
        .expect("executor assigned");

    rt.block_on(
        store
            .commit_selection(&TaskTransition::new(TaskStatus::Bidding, selected), bob.id()),
    )
    .expect("selection committed");

    let bids = rt.block_on(store.find_bids(task.id())).expect("bids listed");
    let status_of = |name: &str| {
        bids.iter()
            .find(|bid| bid.bidder() == &user(name))
            .map(Bid::status)
    };
    assert_eq!(status_of("alice"), Some(BidStatus::Rejected));
    assert_eq!(status_of("bob"), Some(BidStatus::Accepted));
    let stored = rt
        .block_on(store.find_task(task.id()))
        .expect("lookup succeeds")
        .expect("task exists");
    assert_eq!(stored.executor(), Some(&user("bob")));
}

#[rstest]
fn one_pending_submission_per_milestone(shared_test_cluster: &'static TestCluster) {
    let (_db, store) =
        TestDatabase::create(shared_test_cluster, "submission").expect("database setup");
    let rt = test_runtime();
    rt.block_on(seed_users(&store)).expect("users seeded");
    let task = rt.block_on(accepted(&store, 6));
    let mut submitted = task.clone();
    submitted
        .record_submission(Milestone::Design, &DefaultClock)
        .expect("submission recorded");
    let first = Submission::new(
        task.id(),
        Milestone::Design,
        "v1",
        vec!["https://files.example/mockups.pdf".to_owned()],
        &DefaultClock,
    )
    .expect("valid submission");
    rt.block_on(store.commit_submission(
        &TaskTransition::new(TaskStatus::Accepted, submitted.clone()),
        &first,
    ))
    .expect("first submission");

    let second = Submission::new(task.id(), Milestone::Design, "v2", Vec::new(), &DefaultClock)
        .expect("valid submission");
    let err = rt
        .block_on(store.commit_submission(
            &TaskTransition::new(TaskStatus::DesignSubmitted, submitted),
            &second,
        ))
        .expect_err("one pending submission per milestone");

    assert!(matches!(
        err,
        TaskStoreError::DuplicatePendingSubmission {
            milestone: Milestone::Design,
            ..
        }
    ));
    let pending = rt
        .block_on(store.find_pending_submission(task.id(), Milestone::Design))
        .expect("lookup succeeds")
        .expect("first submission pending");
    assert_eq!(pending.id(), first.id());
    assert_eq!(pending.attachments(), ["https://files.example/mockups.pdf"]);
}

#[rstest]
fn final_review_records_the_completion_bonus(shared_test_cluster: &'static TestCluster) {
    let (_db, store) =
        TestDatabase::create(shared_test_cluster, "final_review").expect("database setup");
    let rt = test_runtime();
    rt.block_on(seed_users(&store)).expect("users seeded");
    let mut task = rt.block_on(accepted(&store, 7));

    for (milestone, payment) in [
        (Milestone::Design, Decimal::new(1215, 2)),
        (Milestone::Implementation, Decimal::new(2025, 2)),
        (Milestone::Final, Decimal::new(810, 2)),
    ] {
        let before = task.status();
        let mut submitted = task.clone();
        submitted
            .record_submission(milestone, &DefaultClock)
            .expect("submission recorded");
        let mut submission =
            Submission::new(task.id(), milestone, "work", Vec::new(), &DefaultClock)
                .expect("valid submission");
        rt.block_on(
            store
                .commit_submission(&TaskTransition::new(before, submitted.clone()), &submission),
        )
        .expect("submission committed");
        let mut approved = submitted.clone();
        approved
            .approve_milestone(milestone, payment, &DefaultClock)
            .expect("milestone approves");
        submission.approve(&DefaultClock).expect("submission approves");
        let reputation = milestone.is_final().then(|| {
            ReputationPolicy::new().completion_change(
                &user("alice"),
                task.id(),
                approved.updated_at(),
            )
        });
        rt.block_on(store.commit_review(
            &TaskTransition::new(submitted.status(), approved.clone()),
            &submission,
            reputation.as_ref(),
        ))
        .expect("review committed");
        task = approved;
    }

    let stored = rt
        .block_on(store.find_task(task.id()))
        .expect("lookup succeeds")
        .expect("task exists");
    assert_eq!(stored.status(), TaskStatus::Completed);
    assert_eq!(stored.paid(), Decimal::new(4050, 2));
    assert!(stored.completed_at().is_some());
    let account = rt
        .block_on(store.find_user(&user("alice")))
        .expect("lookup succeeds")
        .expect("alice registered");
    assert_eq!(account.credit().score(), 100);
    assert_eq!(account.credit().tasks_completed(), 1);
    let history = rt
        .block_on(store.credit_history(&user("alice")))
        .expect("history loads");
    assert_eq!(history.len(), 1);
    assert_eq!(
        history.first().map(|entry| entry.reason),
        Some(ReputationReason::TaskCompleted)
    );
    let submissions = rt
        .block_on(store.find_submissions(task.id()))
        .expect("submissions load");
    assert_eq!(submissions.len(), 3);
    assert!(
        submissions
            .iter()
            .all(|submission| submission.status() == SubmissionStatus::Approved)
    );
}

#[rstest]
fn cancellation_commits_the_penalty_atomically(shared_test_cluster: &'static TestCluster) {
    let (_db, store) =
        TestDatabase::create(shared_test_cluster, "cancellation").expect("database setup");
    let rt = test_runtime();
    rt.block_on(seed_users(&store)).expect("users seeded");
    let task = rt.block_on(accepted(&store, 8));
    let mut cancelled = task.clone();
    cancelled.cancel(&DefaultClock).expect("accepted cancels");
    let penalty = ReputationPolicy::cancellation_change(
        &user("alice"),
        task.id(),
        TaskStatus::ImplementationApproved,
        cancelled.updated_at(),
    );

    rt.block_on(store.commit_cancellation(
        &TaskTransition::new(TaskStatus::Accepted, cancelled),
        penalty.as_ref(),
    ))
    .expect("cancellation committed");

    let stored = rt
        .block_on(store.find_task(task.id()))
        .expect("lookup succeeds")
        .expect("task exists");
    assert_eq!(stored.status(), TaskStatus::Cancelled);
    assert!(stored.cancelled_at().is_some());
    let account = rt
        .block_on(store.find_user(&user("alice")))
        .expect("lookup succeeds")
        .expect("alice registered");
    assert_eq!(account.credit().score(), -200);
    assert_eq!(account.credit().tasks_cancelled(), 1);
    let history = rt
        .block_on(store.credit_history(&user("alice")))
        .expect("history loads");
    assert_eq!(
        history.first().map(|entry| entry.reason),
        Some(ReputationReason::ExecutorCancelled)
    );
}

#[rstest]
fn listings_filter_and_count_pending_bids(shared_test_cluster: &'static TestCluster) {
    let (_db, store) =
        TestDatabase::create(shared_test_cluster, "listing").expect("database setup");
    let rt = test_runtime();
    rt.block_on(seed_users(&store)).expect("users seeded");
    let open = funded_task(9);
    rt.block_on(store.insert_task(&open)).expect("insert succeeds");
    let mut bidding = open.clone();
    bidding.open_bidding(&DefaultClock).expect("bidding opens");
    let bid = Bid::new(open.id(), user("bob"), "me", 0, &DefaultClock);
    rt.block_on(
        store
            .record_bid(&bid, Some(&TaskTransition::new(TaskStatus::Pending, bidding))),
    )
    .expect("bob bids");
    rt.block_on(accepted(&store, 10));

    let by_bidder = TaskFilter {
        bidder: Some(user("bob")),
        ..TaskFilter::default()
    };
    let listed = rt
        .block_on(store.list_tasks(&by_bidder))
        .expect("listing succeeds");
    let by_executor = TaskFilter {
        executor: Some(user("alice")),
        ..TaskFilter::default()
    };
    let executing = rt
        .block_on(store.list_tasks(&by_executor))
        .expect("listing succeeds");

    assert_eq!(listed.len(), 1);
    let summary = listed.first().expect("one listing");
    assert_eq!(summary.task.id(), open.id());
    assert_eq!(summary.task.status(), TaskStatus::Bidding);
    assert_eq!(summary.pending_bids, 1);
    assert_eq!(executing.len(), 1);
    assert_eq!(executing.first().map(|entry| entry.pending_bids), Some(0));
}

#[rstest]
fn divergences_are_listed_newest_first(shared_test_cluster: &'static TestCluster) {
    let (_db, store) =
        TestDatabase::create(shared_test_cluster, "divergence").expect("database setup");
    let rt = test_runtime();
    let task = funded_task(11);
    let detected_at = Utc::now();
    let record = |operation, reference: &str, amount, at| DivergenceRecord {
        id: Uuid::new_v4(),
        task_id: task.id(),
        escrow_id: task.escrow_id(),
        operation,
        reference: TxReference::new(reference),
        amount,
        detail: "store write failed".to_owned(),
        detected_at: at,
    };
    let older = record(
        LedgerOperation::ReleaseFraction,
        "0xolder",
        Some(Decimal::new(1215, 2)),
        detected_at - TimeDelta::seconds(5),
    );
    let newer = record(LedgerOperation::Cancel, "0xnewer", None, detected_at);

    rt.block_on(store.record_divergence(&older))
        .expect("older recorded");
    rt.block_on(store.record_divergence(&newer))
        .expect("newer recorded");
    let listed = rt
        .block_on(store.list_divergences())
        .expect("listing succeeds");

    assert_eq!(listed.len(), 2);
    assert_eq!(
        listed.first().map(|entry| entry.reference.clone()),
        Some(TxReference::new("0xnewer"))
    );
    assert_eq!(
        listed.get(1).and_then(|entry| entry.amount),
        Some(Decimal::new(1215, 2))
    );
}
