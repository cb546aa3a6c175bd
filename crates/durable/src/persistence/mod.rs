//! Persistence layer for durable execution
//!
//! This module provides:
//! - [`WorkflowEventStore`] trait for workflow and event persistence
//! - [`InMemoryWorkflowEventStore`] for tests and ephemeral runs
//! - [`FileWorkflowEventStore`] keeping one JSON Lines log per workflow

mod file;
mod memory;
mod store;

pub use file::FileWorkflowEventStore;
pub use memory::InMemoryWorkflowEventStore;
pub use store::{StoreError, WorkflowEventStore, WorkflowInfo, WorkflowStatus};
