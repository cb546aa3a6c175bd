// Enrollment domain types
//
// An enrollment is one contact's run through a cadence. The record keeps
// the immutable facts; live progress comes from the workflow state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::{ExecutionStatus, WorkflowState};
use crate::step::Step;

/// Stored enrollment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub cadence_id: String,
    pub contact_email: String,
    pub workflow_id: String,
    pub created_at: DateTime<Utc>,
}

/// Enrollment record merged with its live workflow state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentState {
    pub enrollment_id: String,
    pub cadence_id: String,
    pub contact_email: String,
    pub status: ExecutionStatus,
    pub current_step_index: usize,
    pub steps_version: u64,
    pub steps: Vec<Step>,
}

impl EnrollmentState {
    /// Label a workflow state snapshot with its enrollment id
    pub fn from_state(enrollment_id: impl Into<String>, state: WorkflowState) -> Self {
        Self {
            enrollment_id: enrollment_id.into(),
            cadence_id: state.cadence_id,
            contact_email: state.contact_email,
            status: state.status,
            current_step_index: state.current_step_index,
            steps_version: state.steps_version,
            steps: state.steps,
        }
    }
}

/// Request to enroll a contact into a cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnrollmentRequest {
    pub cadence_id: String,
    pub contact_email: String,
}

/// Request to replace the steps of a running enrollment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCadenceStepsRequest {
    pub steps: Vec<Step>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_state() {
        let state = WorkflowState {
            status: ExecutionStatus::Completed,
            current_step_index: 2,
            steps_version: 3,
            steps: vec![Step::wait("w", 1)],
            contact_email: "ada@example.com".to_string(),
            cadence_id: "c-1".to_string(),
        };

        let merged = EnrollmentState::from_state("e-1", state);
        assert_eq!(merged.enrollment_id, "e-1");
        assert_eq!(merged.cadence_id, "c-1");
        assert_eq!(merged.contact_email, "ada@example.com");
        assert_eq!(merged.status, ExecutionStatus::Completed);
        assert_eq!(merged.current_step_index, 2);
        assert_eq!(merged.steps_version, 3);
    }

    #[test]
    fn test_state_wire_format() {
        let state = EnrollmentState {
            enrollment_id: "e-1".to_string(),
            cadence_id: "c-1".to_string(),
            contact_email: "ada@example.com".to_string(),
            status: ExecutionStatus::Running,
            current_step_index: 0,
            steps_version: 1,
            steps: vec![],
        };

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["enrollmentId"], "e-1");
        assert_eq!(value["currentStepIndex"], 0);
        assert_eq!(value["stepsVersion"], 1);
        assert_eq!(value["status"], "RUNNING");
    }

    #[test]
    fn test_create_request_wire_format() {
        let request: CreateEnrollmentRequest = serde_json::from_value(serde_json::json!({
            "cadenceId": "c-1",
            "contactEmail": "ada@example.com"
        }))
        .unwrap();

        assert_eq!(request.cadence_id, "c-1");
    }
}
