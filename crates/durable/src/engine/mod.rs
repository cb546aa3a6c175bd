//! Workflow execution engine
//!
//! The engine module provides the [`WorkflowHost`], which replays workflows
//! from their event logs and drives each live instance on its own task.

mod clock;
mod host;
mod instance;
mod registry;
mod replay;

pub use clock::{Clock, ManualClock, SystemClock};
pub use host::{
    HostConfig, HostError, InstanceSnapshot, WorkflowHandle, WorkflowHost, WorkflowHostBuilder,
};
pub use registry::{AnyWorkflow, RegistryError, WorkflowFactory, WorkflowRegistry};
pub use replay::ReplayError;
