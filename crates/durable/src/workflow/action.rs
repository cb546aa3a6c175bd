//! Workflow actions and activity options

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::WorkflowError;
use crate::reliability::RetryPolicy;

/// Actions a workflow can request
///
/// These are the commands a workflow issues in response to events. The host
/// executes them one at a time, in the order they were returned, and records
/// each as a [`WorkflowEvent`](super::WorkflowEvent) before its effect starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowAction {
    /// Schedule an activity for execution
    ScheduleActivity {
        /// Unique identifier for this activity within the workflow
        activity_id: String,

        /// Type of activity to execute (used to look up in registry)
        activity_type: String,

        /// Input data for the activity (JSON)
        input: serde_json::Value,

        /// Execution options (retries, timeouts)
        options: ActivityOptions,
    },

    /// Start a timer that fires after the specified duration
    StartTimer {
        /// Unique identifier for this timer within the workflow
        timer_id: String,

        /// Duration to wait before firing
        #[serde(with = "duration_serde")]
        duration: Duration,
    },

    /// Complete the workflow successfully with a result
    CompleteWorkflow {
        /// Result value (JSON)
        result: serde_json::Value,
    },

    /// Fail the workflow with an error
    FailWorkflow {
        /// Error details
        error: WorkflowError,
    },

    /// No action (used when event handling doesn't trigger new work)
    None,
}

impl WorkflowAction {
    /// Create a schedule activity action with default options
    pub fn schedule_activity(
        activity_id: impl Into<String>,
        activity_type: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::schedule_activity_with_options(
            activity_id,
            activity_type,
            input,
            ActivityOptions::default(),
        )
    }

    /// Create a schedule activity action with explicit options
    pub fn schedule_activity_with_options(
        activity_id: impl Into<String>,
        activity_type: impl Into<String>,
        input: serde_json::Value,
        options: ActivityOptions,
    ) -> Self {
        Self::ScheduleActivity {
            activity_id: activity_id.into(),
            activity_type: activity_type.into(),
            input,
            options,
        }
    }

    /// Create a complete workflow action
    pub fn complete(result: serde_json::Value) -> Self {
        Self::CompleteWorkflow { result }
    }

    /// Create a fail workflow action
    pub fn fail(error: WorkflowError) -> Self {
        Self::FailWorkflow { error }
    }

    /// Create a timer action
    pub fn timer(timer_id: impl Into<String>, duration: Duration) -> Self {
        Self::StartTimer {
            timer_id: timer_id.into(),
            duration,
        }
    }

    /// Whether this action ends the workflow
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CompleteWorkflow { .. } | Self::FailWorkflow { .. }
        )
    }
}

/// Options for activity execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityOptions {
    /// Retry policy for this activity
    pub retry_policy: RetryPolicy,

    /// Maximum time for one attempt (from start to completion)
    #[serde(with = "duration_serde")]
    pub start_to_close_timeout: Duration,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            start_to_close_timeout: Duration::from_secs(300),
        }
    }
}

impl ActivityOptions {
    /// Create options with a specific retry policy
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the start-to-close timeout
    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }
}

/// Serde support for Duration (as milliseconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schedule_activity_action() {
        let action =
            WorkflowAction::schedule_activity("send-0", "send_email", json!({"to": "a@b.co"}));

        match action {
            WorkflowAction::ScheduleActivity {
                activity_id,
                activity_type,
                input,
                options,
            } => {
                assert_eq!(activity_id, "send-0");
                assert_eq!(activity_type, "send_email");
                assert_eq!(input, json!({"to": "a@b.co"}));
                assert_eq!(options, ActivityOptions::default());
            }
            _ => panic!("Expected ScheduleActivity"),
        }
    }

    #[test]
    fn test_activity_options_serialization() {
        let options = ActivityOptions::default()
            .with_retry(RetryPolicy::exponential().with_max_attempts(3))
            .with_start_to_close_timeout(Duration::from_secs(30));

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["start_to_close_timeout"], 30_000);

        let parsed: ActivityOptions = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, options);
    }

    #[test]
    fn test_workflow_action_serialization() {
        let action = WorkflowAction::timer("wait-1", Duration::from_secs(10));

        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"type\":\"start_timer\""));
        assert!(json.contains("\"duration\":10000"));

        let parsed: WorkflowAction = serde_json::from_str(&json).unwrap();
        assert_eq!(action, parsed);
    }

    #[test]
    fn test_terminal_actions() {
        assert!(WorkflowAction::complete(json!({})).is_terminal());
        assert!(WorkflowAction::fail(WorkflowError::new("boom")).is_terminal());
        assert!(!WorkflowAction::timer("t", Duration::from_secs(1)).is_terminal());
        assert!(!WorkflowAction::None.is_terminal());
    }
}
