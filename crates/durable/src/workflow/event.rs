//! Workflow events for persistence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ActivityOptions, WorkflowError, WorkflowSignal};
use crate::activity::ActivityError;

/// Events in a workflow's append-only log
///
/// These events are used for:
/// - Persisting workflow progress before each effect
/// - Replaying workflows after recovery
/// - Auditing and debugging
///
/// Events are immutable once written. The workflow state is reconstructed
/// by replaying all events in sequence order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    // =========================================================================
    // Workflow Lifecycle Events
    // =========================================================================
    /// Workflow was started with the given input
    WorkflowStarted {
        /// The input provided when starting the workflow
        input: serde_json::Value,
    },

    /// Workflow completed successfully
    WorkflowCompleted {
        /// The result value
        result: serde_json::Value,
    },

    /// Workflow failed with an error
    WorkflowFailed {
        /// Error details
        error: WorkflowError,
    },

    /// Workflow was cancelled
    WorkflowCancelled {
        /// Reason for cancellation
        reason: String,
    },

    // =========================================================================
    // Activity Lifecycle Events
    // =========================================================================
    /// Activity was scheduled for execution
    ActivityScheduled {
        /// Unique activity identifier within the workflow
        activity_id: String,

        /// Type of activity to execute
        activity_type: String,

        /// Input for the activity
        input: serde_json::Value,

        /// Execution options
        options: ActivityOptions,
    },

    /// An attempt was dispatched to the activity implementation
    ActivityStarted {
        /// Activity identifier
        activity_id: String,

        /// Current attempt number (1-based)
        attempt: u32,

        /// Key the implementation uses to deduplicate side effects
        idempotency_key: String,

        /// ID of the worker executing the activity
        worker_id: String,
    },

    /// Activity completed successfully
    ActivityCompleted {
        /// Activity identifier
        activity_id: String,

        /// Result returned by the activity
        result: serde_json::Value,
    },

    /// An attempt failed (may or may not retry)
    ActivityFailed {
        /// Activity identifier
        activity_id: String,

        /// Attempt that failed (1-based)
        attempt: u32,

        /// Error details
        error: ActivityError,

        /// Whether the activity will be retried
        will_retry: bool,

        /// When the next attempt may start
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_at: Option<DateTime<Utc>>,
    },

    // =========================================================================
    // Timer Events
    // =========================================================================
    /// Timer was started
    TimerStarted {
        /// Timer identifier
        timer_id: String,

        /// Duration in milliseconds
        duration_ms: u64,

        /// Absolute deadline; restarts sleep only until this instant
        fire_at: DateTime<Utc>,
    },

    /// Timer fired (duration elapsed)
    TimerFired {
        /// Timer identifier
        timer_id: String,
    },

    // =========================================================================
    // Signal Events
    // =========================================================================
    /// External signal was accepted and applied
    SignalReceived {
        /// The signal that was received
        signal: WorkflowSignal,
    },
}

impl WorkflowEvent {
    /// Get the activity_id if this is an activity-related event
    pub fn activity_id(&self) -> Option<&str> {
        match self {
            Self::ActivityScheduled { activity_id, .. }
            | Self::ActivityStarted { activity_id, .. }
            | Self::ActivityCompleted { activity_id, .. }
            | Self::ActivityFailed { activity_id, .. } => Some(activity_id),
            _ => None,
        }
    }

    /// Get the timer_id if this is a timer event
    pub fn timer_id(&self) -> Option<&str> {
        match self {
            Self::TimerStarted { timer_id, .. } | Self::TimerFired { timer_id } => Some(timer_id),
            _ => None,
        }
    }

    /// Check if this is a terminal workflow event
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowCompleted { .. }
                | Self::WorkflowFailed { .. }
                | Self::WorkflowCancelled { .. }
        )
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow_started",
            Self::WorkflowCompleted { .. } => "workflow_completed",
            Self::WorkflowFailed { .. } => "workflow_failed",
            Self::WorkflowCancelled { .. } => "workflow_cancelled",
            Self::ActivityScheduled { .. } => "activity_scheduled",
            Self::ActivityStarted { .. } => "activity_started",
            Self::ActivityCompleted { .. } => "activity_completed",
            Self::ActivityFailed { .. } => "activity_failed",
            Self::TimerStarted { .. } => "timer_started",
            Self::TimerFired { .. } => "timer_fired",
            Self::SignalReceived { .. } => "signal_received",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_workflow_event_serialization() {
        let event = WorkflowEvent::WorkflowStarted {
            input: json!({"contactEmail": "ada@example.com"}),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"workflow_started\""));

        let parsed: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_timer_started_keeps_deadline() {
        let fire_at = Utc::now();
        let event = WorkflowEvent::TimerStarted {
            timer_id: "wait-1".to_string(),
            duration_ms: 86_400_000,
            fire_at,
        };

        let json = serde_json::to_string(&event).unwrap();
        let parsed: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.timer_id(), Some("wait-1"));
    }

    #[test]
    fn test_activity_failed_without_retry_at() {
        let json = json!({
            "type": "activity_failed",
            "activity_id": "send-0",
            "attempt": 3,
            "error": {
                "message": "smtp down",
                "error_type": null,
                "retryable": true,
                "details": null
            },
            "will_retry": false
        });

        let parsed: WorkflowEvent = serde_json::from_value(json).unwrap();
        match parsed {
            WorkflowEvent::ActivityFailed {
                attempt,
                will_retry,
                retry_at,
                ..
            } => {
                assert_eq!(attempt, 3);
                assert!(!will_retry);
                assert!(retry_at.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_activity_id_extraction() {
        let event = WorkflowEvent::ActivityStarted {
            activity_id: "send-2".to_string(),
            attempt: 1,
            idempotency_key: "wf:send-2:1".to_string(),
            worker_id: "worker-1".to_string(),
        };

        assert_eq!(event.activity_id(), Some("send-2"));
        assert_eq!(event.kind(), "activity_started");

        let start_event = WorkflowEvent::WorkflowStarted { input: json!({}) };
        assert_eq!(start_event.activity_id(), None);
    }

    #[test]
    fn test_is_terminal() {
        assert!(WorkflowEvent::WorkflowCompleted { result: json!({}) }.is_terminal());
        assert!(WorkflowEvent::WorkflowFailed {
            error: WorkflowError::new("error")
        }
        .is_terminal());
        assert!(WorkflowEvent::WorkflowCancelled {
            reason: "cancelled".to_string()
        }
        .is_terminal());

        assert!(!WorkflowEvent::WorkflowStarted { input: json!({}) }.is_terminal());
        assert!(!WorkflowEvent::TimerFired {
            timer_id: "x".to_string()
        }
        .is_terminal());
    }
}
