// Cadence Worker
//
// Decision: The cadence workflow, its email activity and the enrollment API
// live in one crate; the durable engine is a separate library

pub mod activities;
pub mod cadences;
pub mod config;
pub mod enrollments;
pub mod worker;
pub mod workflow;

// Re-export main types
pub use activities::{SendEmailActivity, SentEmail};
pub use cadences::{CadenceError, CadenceService};
pub use config::WorkerConfig;
pub use enrollments::{workflow_id_for, EnrollmentError, EnrollmentService};
pub use worker::CadenceWorker;
pub use workflow::CadenceWorkflow;
