//! Milestone escrow: task lifecycle and settlement engine.
//!
//! A creator posts a task with a token reward locked in escrow on an external
//! value-transfer ledger. Executors bid, the creator selects one, and the
//! reward is released in three milestone tranches (design 30%,
//! implementation 50%, final 20%) as each submission is approved.
//! Cancellation refunds whatever remains.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for storage and the ledger
//! - **Adapters**: Concrete implementations of ports (in-memory, `PostgreSQL`,
//!   HTTP)
//! - **Services**: Orchestration that sequences ledger calls and store
//!   commits
//!
//! The ledger is authoritative for balances and the store mirrors it. Every
//! money-moving transition performs its confirmed ledger call before the
//! status-guarded store commit; when the commit fails afterwards the outcome
//! is reported and recorded as a divergence.
//!
//! # Modules
//!
//! - [`task`]: Tasks, bids, submissions, reputation and their services
//! - [`settlement`]: Payment arithmetic and the external ledger gateway
//! - [`config`]: TOML configuration
//! - [`context`]: Service wiring
//! - [`api`]: Transport-neutral request dispatcher

pub mod api;
pub mod config;
pub mod context;
pub mod settlement;
pub mod task;
