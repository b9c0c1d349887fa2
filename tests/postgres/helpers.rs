//! Shared helpers for `PostgreSQL` store integration tests.
//!
//! Each test clones a pre-migrated template into its own database and drops
//! it again when the returned [`TestDatabase`] guard goes out of scope. Bind
//! the guard before the store so the pool closes first.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use milestone_escrow::{
    settlement::domain::LedgerAddress,
    task::{
        adapters::postgres::{PostgresTaskStore, TaskPgPool},
        domain::{UserAccount, UserId},
        ports::TaskStore,
    },
};
use pg_embedded_setup_unpriv::TestCluster;
use tokio::runtime::Runtime;
use uuid::Uuid;

/// SQL creating the marketplace schema.
pub const CREATE_SCHEMA_SQL: &str =
    include_str!("../../migrations/2026-10-01-000000_create_marketplace_tables/up.sql");

/// Template database name for the pre-migrated schema.
pub const TEMPLATE_DB: &str = "milestone_escrow_test_template";

/// Creates a runtime for driving the async store from synchronous tests.
pub fn test_runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to create test runtime")
}

/// Ensures the template database exists with the schema applied.
///
/// # Errors
///
/// Returns an error if template creation or migration fails.
pub fn ensure_template(cluster: &TestCluster) -> eyre::Result<()> {
    cluster
        .ensure_template_exists(TEMPLATE_DB, |db_name| {
            let url = cluster.connection().database_url(db_name);
            let mut conn = PgConnection::establish(&url).map_err(|e| eyre::eyre!("{e}"))?;
            conn.batch_execute(CREATE_SCHEMA_SQL)
                .map_err(|e| eyre::eyre!("schema migration failed: {e}"))?;
            Ok(())
        })
        .map_err(|e| eyre::eyre!("template setup failed: {e}"))
}

/// Drops a per-test database on scope exit.
pub struct TestDatabase {
    cluster: &'static TestCluster,
    name: String,
}

impl TestDatabase {
    /// Clones the template into a fresh database named after `prefix` and
    /// returns its guard with a store over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the template, database or pool cannot be set up.
    pub fn create(
        cluster: &'static TestCluster,
        prefix: &str,
    ) -> eyre::Result<(Self, PostgresTaskStore)> {
        ensure_template(cluster)?;
        let name = format!("{prefix}_{}", Uuid::new_v4().simple());
        cluster
            .create_database_from_template(name.as_str(), TEMPLATE_DB)
            .map_err(|e| eyre::eyre!("database creation failed: {e}"))?;
        let url = cluster.connection().database_url(&name);
        let pool: TaskPgPool = Pool::builder()
            .max_size(1)
            .build(ConnectionManager::<PgConnection>::new(url))
            .map_err(|e| {
                drop_quietly(cluster, &name);
                eyre::eyre!("pool setup failed: {e}")
            })?;
        Ok((Self { cluster, name }, PostgresTaskStore::new(pool)))
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        drop_quietly(self.cluster, &self.name);
    }
}

fn drop_quietly(cluster: &TestCluster, name: &str) {
    if let Err(e) = cluster.drop_database(name) {
        eprintln!("Warning: failed to drop test database {name}: {e}");
    }
}

/// Builds a deterministic ledger address ending in `seed`.
pub fn address(seed: u8) -> LedgerAddress {
    LedgerAddress::new(format!("0x{seed:040x}")).expect("generated address is valid")
}

/// Parses a user identifier.
pub fn user(name: &str) -> UserId {
    UserId::new(name).expect("valid user id")
}

/// Registers `creator`, `alice` and `bob` so task foreign keys resolve.
///
/// # Errors
///
/// Returns an error if any insert fails.
pub async fn seed_users(store: &PostgresTaskStore) -> eyre::Result<()> {
    for (name, seed) in [("creator", 0x01), ("alice", 0x02), ("bob", 0x03)] {
        store
            .insert_user(&UserAccount::new(user(name), address(seed)))
            .await?;
    }
    Ok(())
}
