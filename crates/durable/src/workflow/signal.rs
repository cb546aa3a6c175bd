//! Workflow signals for external communication

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// External signals that can be sent to running workflows
///
/// Signals let callers mutate a running workflow. The host applies them
/// between workflow steps, records them in the event log, and replays them
/// in the same position after a restart.
///
/// # Example
///
/// ```ignore
/// let signal = WorkflowSignal::new("updateCadence", json!({ "steps": [] }));
/// handle.signal(signal).await?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSignal {
    /// Signal type identifier
    pub signal_type: String,

    /// Signal payload (JSON)
    pub payload: serde_json::Value,

    /// When the signal was sent
    pub sent_at: DateTime<Utc>,
}

impl WorkflowSignal {
    /// Create a new signal
    pub fn new(signal_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            signal_type: signal_type.into(),
            payload,
            sent_at: Utc::now(),
        }
    }

    /// Create a signal from a typed payload
    pub fn with_payload<T: Serialize>(
        signal_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(signal_type, serde_json::to_value(payload)?))
    }

    /// Check the signal type
    pub fn is(&self, signal_type: &str) -> bool {
        self.signal_type == signal_type
    }

    /// Decode the payload
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}
