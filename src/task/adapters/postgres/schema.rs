//! Diesel schema for marketplace persistence.

diesel::table! {
    /// Marketplace participants and reputation counters.
    users (id) {
        /// Opaque subject identifier.
        #[max_length = 255]
        id -> Varchar,
        /// Ledger address.
        #[max_length = 42]
        ledger_address -> Varchar,
        /// Credit score.
        credit_score -> Int8,
        /// Completed task counter.
        tasks_completed -> Int4,
        /// Penalized cancellation counter.
        tasks_cancelled -> Int4,
    }
}

diesel::table! {
    /// Task records.
    tasks (id) {
        /// Internal task identifier.
        id -> Uuid,
        /// Ledger escrow identifier.
        escrow_id -> Nullable<Int8>,
        /// Creator.
        #[max_length = 255]
        creator_id -> Varchar,
        /// Executor.
        #[max_length = 255]
        executor_id -> Nullable<Varchar>,
        /// Owning project.
        #[max_length = 255]
        project_id -> Nullable<Varchar>,
        /// Task name.
        name -> Text,
        /// Description.
        description -> Text,
        /// Acceptance criteria.
        acceptance_criteria -> Text,
        /// Reward as a decimal string.
        #[max_length = 64]
        reward -> Varchar,
        /// Paid amount as a decimal string.
        #[max_length = 64]
        paid -> Varchar,
        /// Visibility.
        #[max_length = 16]
        visibility -> Varchar,
        /// Lifecycle status.
        #[max_length = 50]
        status -> Varchar,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
        /// Completion timestamp.
        completed_at -> Nullable<Timestamptz>,
        /// Cancellation timestamp.
        cancelled_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Bids on tasks.
    task_bids (id) {
        /// Bid identifier.
        id -> Uuid,
        /// Task bid on.
        task_id -> Uuid,
        /// Bidder.
        #[max_length = 255]
        bidder_id -> Varchar,
        /// Latest message.
        message -> Text,
        /// Credit score at first bid.
        credit_snapshot -> Int8,
        /// Bid status.
        #[max_length = 16]
        status -> Varchar,
        /// First bid timestamp.
        created_at -> Timestamptz,
        /// Latest revision timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Milestone submissions.
    task_submissions (id) {
        /// Submission identifier.
        id -> Uuid,
        /// Owning task.
        task_id -> Uuid,
        /// Milestone.
        #[max_length = 20]
        milestone -> Varchar,
        /// Submitted content.
        content -> Text,
        /// Attachment references.
        attachments -> Jsonb,
        /// Review status.
        #[max_length = 16]
        status -> Varchar,
        /// Rejection reason.
        rejection_reason -> Nullable<Text>,
        /// Submission timestamp.
        submitted_at -> Timestamptz,
        /// Review timestamp.
        reviewed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Reputation change log.
    credit_history (id) {
        /// Row identifier.
        id -> Int8,
        /// User whose credit changed.
        #[max_length = 255]
        user_id -> Varchar,
        /// Triggering task.
        task_id -> Uuid,
        /// Score delta.
        delta -> Int8,
        /// Change reason.
        #[max_length = 32]
        reason -> Varchar,
        /// Score before.
        score_before -> Int8,
        /// Score after.
        score_after -> Int8,
        /// Recording timestamp.
        recorded_at -> Timestamptz,
    }
}

diesel::table! {
    /// Ledger effects the store failed to mirror.
    ledger_divergences (id) {
        /// Record identifier.
        id -> Uuid,
        /// Affected task.
        task_id -> Uuid,
        /// Affected escrow.
        escrow_id -> Nullable<Int8>,
        /// Confirmed ledger operation.
        #[max_length = 32]
        operation -> Varchar,
        /// Ledger transaction reference.
        #[max_length = 255]
        reference -> Varchar,
        /// Amount moved.
        #[max_length = 64]
        amount -> Nullable<Varchar>,
        /// Store failure detail.
        detail -> Text,
        /// Detection timestamp.
        detected_at -> Timestamptz,
    }
}

diesel::joinable!(task_bids -> tasks (task_id));
diesel::joinable!(task_submissions -> tasks (task_id));
diesel::joinable!(credit_history -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    tasks,
    task_bids,
    task_submissions,
    credit_history,
    ledger_divergences,
);
