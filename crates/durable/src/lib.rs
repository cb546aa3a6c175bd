//! # Durable Execution Engine
//!
//! An event-sourced workflow host for long-running, crash-safe processes.
//!
//! ## Features
//!
//! - **Event-sourced workflows**: Every step is recorded before it takes effect,
//!   so a restarted host replays the log and carries on where it stopped
//! - **Durable timers**: Timers record an absolute deadline and only wait out the
//!   remainder after a restart
//! - **Automatic retries**: Configurable retry policies with exponential backoff and jitter
//! - **Signals and queries**: Signals are serialized with workflow steps; queries
//!   read a published snapshot and never block the instance
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkflowHost                           │
//! │  (activates instances, replays logs, routes signals)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Instance runtimes                          │
//! │  (one task per workflow: activities, timers, signal inbox)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   WorkflowEventStore                         │
//! │  (in-memory, or one JSON Lines log per workflow on disk)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use cadence_durable::prelude::*;
//!
//! struct GreetWorkflow {
//!     done: bool,
//! }
//!
//! impl Workflow for GreetWorkflow {
//!     const TYPE: &'static str = "greet";
//!     type Input = GreetInput;
//!     type Output = ();
//!     type Query = bool;
//!
//!     fn new(_input: Self::Input) -> Self {
//!         Self { done: false }
//!     }
//!
//!     fn on_start(&mut self) -> Vec<WorkflowAction> {
//!         vec![WorkflowAction::schedule_activity("greet-1", "greet", json!({}))]
//!     }
//!
//!     // ... implement other trait methods
//! }
//!
//! let host = WorkflowHost::builder(Arc::new(InMemoryWorkflowEventStore::new()))
//!     .workflow::<GreetWorkflow>()
//!     .activity(GreetActivity)
//!     .build();
//! let handle = host.start_workflow::<GreetWorkflow>("greet-1", &input).await?;
//! handle.wait_for_completion().await?;
//! ```

pub mod activity;
pub mod engine;
pub mod persistence;
pub mod reliability;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::activity::{Activity, ActivityContext, ActivityError};
    pub use crate::engine::{
        Clock, HostConfig, HostError, InstanceSnapshot, ManualClock, SystemClock, WorkflowHandle,
        WorkflowHost,
    };
    pub use crate::persistence::{
        FileWorkflowEventStore, InMemoryWorkflowEventStore, StoreError, WorkflowEventStore,
        WorkflowStatus,
    };
    pub use crate::reliability::RetryPolicy;
    pub use crate::workflow::{
        ActivityOptions, SignalRejection, Workflow, WorkflowAction, WorkflowError, WorkflowEvent,
        WorkflowSignal,
    };
}

// Re-export key types at crate root
pub use activity::{Activity, ActivityContext, ActivityError, ActivityRegistry};
pub use engine::{
    Clock, HostConfig, HostError, InstanceSnapshot, ManualClock, SystemClock, WorkflowHandle,
    WorkflowHost, WorkflowHostBuilder, WorkflowRegistry,
};
pub use persistence::{
    FileWorkflowEventStore, InMemoryWorkflowEventStore, StoreError, WorkflowEventStore,
    WorkflowInfo, WorkflowStatus,
};
pub use reliability::{RetryDecision, RetryPolicy};
pub use workflow::{
    ActivityOptions, SignalRejection, Workflow, WorkflowAction, WorkflowError, WorkflowEvent,
    WorkflowSignal,
};
