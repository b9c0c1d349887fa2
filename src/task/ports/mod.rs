//! Port contracts for the task marketplace.

pub mod store;

pub use store::{
    TaskFilter, TaskStore, TaskStoreError, TaskStoreResult, TaskSummary, TaskTransition,
};
