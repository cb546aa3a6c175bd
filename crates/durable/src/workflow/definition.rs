//! Workflow trait definition

use serde::{de::DeserializeOwned, Serialize};

use super::{WorkflowAction, WorkflowSignal};
use crate::activity::ActivityError;

/// Error type for workflow failures
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct WorkflowError {
    /// Error message
    pub message: String,

    /// Error code for programmatic handling
    pub code: Option<String>,
}

impl WorkflowError {
    /// Create a new workflow error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Set the error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for WorkflowError {}

/// Why a signal was refused by a workflow
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalRejection {
    /// The workflow has reached a terminal state
    #[error("workflow is no longer accepting signals")]
    Terminal,

    /// The signal type is not handled by this workflow
    #[error("unknown signal type: {0}")]
    UnknownSignal(String),

    /// The signal payload could not be decoded
    #[error("invalid signal payload: {0}")]
    InvalidPayload(String),
}

/// A workflow is a deterministic state machine driven by events
///
/// Workflows define:
/// - How to start execution (`on_start`)
/// - How to handle activity completions (`on_activity_completed`, `on_activity_failed`)
/// - How to handle timers (`on_timer_fired`)
/// - How to handle external signals (`accepts_signal`, `on_signal`)
/// - What a query returns (`query`)
///
/// # Determinism
///
/// Given the same sequence of events, a workflow must produce the same
/// sequence of actions and end in the same state. The host relies on this to
/// rebuild a workflow from its event log after a restart.
///
/// # Example
///
/// ```ignore
/// use cadence_durable::prelude::*;
///
/// struct ReminderWorkflow {
///     to: String,
///     sent: bool,
/// }
///
/// impl Workflow for ReminderWorkflow {
///     const TYPE: &'static str = "reminder";
///     type Input = ReminderInput;
///     type Output = bool;
///     type Query = bool;
///
///     fn new(input: Self::Input) -> Self {
///         Self { to: input.to, sent: false }
///     }
///
///     fn on_start(&mut self) -> Vec<WorkflowAction> {
///         vec![WorkflowAction::timer("delay", Duration::from_secs(3600))]
///     }
///
///     fn on_timer_fired(&mut self, _timer_id: &str) -> Vec<WorkflowAction> {
///         vec![WorkflowAction::schedule_activity(
///             "send",
///             "send_email",
///             json!({ "to": self.to }),
///         )]
///     }
///
///     // ... implement other methods
/// }
/// ```
pub trait Workflow: Send + Sync + 'static {
    /// Unique type identifier for this workflow
    ///
    /// This is used to look up the workflow in the registry during replay.
    const TYPE: &'static str;

    /// Input type for starting the workflow
    type Input: Serialize + DeserializeOwned + Send + Clone;

    /// Output type when workflow completes successfully
    type Output: Serialize + DeserializeOwned + Send;

    /// Snapshot returned by queries
    type Query: Serialize + DeserializeOwned + Send;

    /// Create a new workflow instance from input
    ///
    /// This is called both when starting a new workflow and when replaying.
    fn new(input: Self::Input) -> Self;

    /// Called when workflow starts (or replays from beginning)
    ///
    /// Return a list of actions to schedule initial work.
    fn on_start(&mut self) -> Vec<WorkflowAction>;

    /// Called when an activity completes successfully
    ///
    /// The result is the JSON value returned by the activity.
    fn on_activity_completed(
        &mut self,
        activity_id: &str,
        result: serde_json::Value,
    ) -> Vec<WorkflowAction>;

    /// Called when an activity fails (after all retries exhausted)
    fn on_activity_failed(
        &mut self,
        activity_id: &str,
        error: &ActivityError,
    ) -> Vec<WorkflowAction>;

    /// Called when a timer fires
    fn on_timer_fired(&mut self, timer_id: &str) -> Vec<WorkflowAction> {
        let _ = timer_id;
        vec![]
    }

    /// Decide whether a signal may be applied
    ///
    /// Called before the signal is recorded. A rejected signal leaves no
    /// trace in the event log.
    fn accepts_signal(&self, signal: &WorkflowSignal) -> Result<(), SignalRejection> {
        let _ = signal;
        if self.is_completed() {
            Err(SignalRejection::Terminal)
        } else {
            Ok(())
        }
    }

    /// Called when an accepted external signal is applied
    fn on_signal(&mut self, signal: &WorkflowSignal) -> Vec<WorkflowAction> {
        let _ = signal;
        vec![]
    }

    /// Current queryable state; must not change the workflow
    fn query(&self) -> Self::Query;

    /// Check if workflow has reached a terminal state
    fn is_completed(&self) -> bool;

    /// Get the workflow result (if completed successfully)
    fn result(&self) -> Option<Self::Output>;

    /// Get the workflow error (if failed)
    fn error(&self) -> Option<WorkflowError> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_error_display() {
        let error = WorkflowError::new("something went wrong");
        assert_eq!(error.to_string(), "something went wrong");
    }

    #[test]
    fn test_workflow_error_with_code() {
        let error = WorkflowError::new("send failed").with_code("ACTIVITY_FAILED");
        assert_eq!(error.code, Some("ACTIVITY_FAILED".to_string()));
        assert_eq!(error.to_string(), "send failed (ACTIVITY_FAILED)");
    }

    #[test]
    fn test_signal_rejection_messages() {
        assert_eq!(
            SignalRejection::UnknownSignal("pause".into()).to_string(),
            "unknown signal type: pause"
        );
        assert_eq!(
            SignalRejection::Terminal.to_string(),
            "workflow is no longer accepting signals"
        );
    }
}
