// Cadence Schemas
//
// Decision: This crate is the source of truth for all shared data structures
// Decision: Minimal dependencies - only serde, chrono, thiserror
// Decision: No runtime logic beyond input validation

// Core type modules
pub mod cadence;
pub mod email;
pub mod enrollment;
pub mod execution;
pub mod step;
pub mod validation;

// Re-exports for convenience
pub use cadence::{Cadence, CreateCadenceRequest, UpdateCadenceRequest};
pub use email::{SendEmailInput, SendEmailOutput};
pub use enrollment::{
    CreateEnrollmentRequest, Enrollment, EnrollmentState, UpdateCadenceStepsRequest,
};
pub use execution::{
    CadenceWorkflowInput, ExecutionStatus, UpdateCadencePayload, WorkflowState,
    UPDATE_CADENCE_SIGNAL,
};
pub use step::{validate_cadence_steps, validate_steps, Step};
pub use validation::{require_non_empty, validate_email, ValidationError};
