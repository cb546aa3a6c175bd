// Cadence execution types
//
// These are the shapes exchanged with a running cadence workflow: the input
// it is started with, the step-list replacement signal, and the state
// snapshot returned by queries and on completion.

use serde::{Deserialize, Serialize};

use crate::cadence::Cadence;
use crate::step::Step;

/// Signal name for replacing the step list of a running cadence
pub const UPDATE_CADENCE_SIGNAL: &str = "updateCadence";

/// Execution status of one enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    /// Reserved; no cancellation path exists yet
    Cancelled,
}

impl ExecutionStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Input a cadence workflow is started with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CadenceWorkflowInput {
    pub cadence: Cadence,
    pub contact_email: String,
}

/// Payload of the step-list replacement signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCadencePayload {
    pub steps: Vec<Step>,
}

/// Point-in-time view of a cadence workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub status: ExecutionStatus,

    /// Number of steps already executed
    pub current_step_index: usize,

    /// Starts at 1, incremented by every accepted step replacement
    pub steps_version: u64,

    pub steps: Vec<Step>,
    pub contact_email: String,
    pub cadence_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(ExecutionStatus::Completed).unwrap(),
            json!("COMPLETED")
        );
        assert_eq!(ExecutionStatus::Failed.to_string(), "FAILED");
    }

    #[test]
    fn test_signal_wire_name() {
        assert_eq!(UPDATE_CADENCE_SIGNAL, "updateCadence");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_workflow_state_wire_format() {
        let state = WorkflowState {
            status: ExecutionStatus::Running,
            current_step_index: 1,
            steps_version: 2,
            steps: vec![Step::wait("w", 5)],
            contact_email: "ada@example.com".to_string(),
            cadence_id: "c-1".to_string(),
        };

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["status"], "RUNNING");
        assert_eq!(value["currentStepIndex"], 1);
        assert_eq!(value["stepsVersion"], 2);
        assert_eq!(value["contactEmail"], "ada@example.com");
        assert_eq!(value["cadenceId"], "c-1");
    }

    #[test]
    fn test_workflow_input_wire_format() {
        let input: CadenceWorkflowInput = serde_json::from_value(json!({
            "cadence": {"id": "c-1", "name": "Demo", "steps": []},
            "contactEmail": "ada@example.com"
        }))
        .unwrap();

        assert_eq!(input.cadence.id, "c-1");
        assert_eq!(input.contact_email, "ada@example.com");
    }
}
