//! Activity abstractions
//!
//! Activities are the side-effecting units of work a workflow schedules. They:
//! - May fail and be retried according to the retry policy
//! - Receive an idempotency key that survives re-dispatch after a crash
//! - Observe host shutdown via cancellation

mod context;
mod definition;
mod registry;

pub use context::ActivityContext;
pub use definition::{error_types, Activity, ActivityError};
pub use registry::{ActivityRegistry, AnyActivity};
