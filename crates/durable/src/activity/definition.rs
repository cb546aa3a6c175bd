//! Activity trait definition

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::ActivityContext;

/// Error type for activity failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityError {
    /// Error message
    pub message: String,

    /// Error type/code for programmatic handling
    pub error_type: Option<String>,

    /// Whether this error is retryable
    ///
    /// Non-retryable errors will immediately fail the activity
    /// without further retry attempts.
    pub retryable: bool,

    /// Additional error details (for debugging)
    pub details: Option<serde_json::Value>,
}

/// Error types produced by the host itself rather than an activity
pub mod error_types {
    /// An attempt ran past its start-to-close timeout
    pub const START_TO_CLOSE_TIMEOUT: &str = "START_TO_CLOSE_TIMEOUT";

    /// No activity is registered under the requested type
    pub const UNKNOWN_ACTIVITY_TYPE: &str = "UNKNOWN_ACTIVITY_TYPE";

    /// The activity input or output did not match the declared types
    pub const SERIALIZATION: &str = "SERIALIZATION";
}

impl ActivityError {
    /// Create a new retryable error
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            retryable: true,
            details: None,
        }
    }

    /// Create a non-retryable error
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            retryable: false,
            details: None,
        }
    }

    /// Set the error type
    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    /// Add error details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attempt exceeded its time budget
    pub fn timed_out(timeout: std::time::Duration) -> Self {
        Self::retryable(format!("activity timed out after {}ms", timeout.as_millis()))
            .with_type(error_types::START_TO_CLOSE_TIMEOUT)
    }
}

impl std::fmt::Display for ActivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActivityError {}

impl From<anyhow::Error> for ActivityError {
    fn from(err: anyhow::Error) -> Self {
        Self::retryable(err.to_string())
    }
}

impl From<serde_json::Error> for ActivityError {
    fn from(err: serde_json::Error) -> Self {
        Self::non_retryable(err.to_string()).with_type(error_types::SERIALIZATION)
    }
}

/// An activity is a unit of side-effecting work that may fail and be retried
///
/// Activities are the only place a workflow touches the outside world. Each
/// attempt receives a context carrying an idempotency key; an attempt that
/// is dispatched again after a crash carries the same key, so an
/// implementation that deduplicates on it performs its effect at most once.
///
/// # Example
///
/// ```ignore
/// use cadence_durable::prelude::*;
///
/// struct SendEmailActivity;
///
/// #[async_trait]
/// impl Activity for SendEmailActivity {
///     const TYPE: &'static str = "send_email";
///     type Input = SendEmailInput;
///     type Output = SendEmailOutput;
///
///     async fn execute(
///         &self,
///         ctx: &ActivityContext,
///         input: Self::Input,
///     ) -> Result<Self::Output, ActivityError> {
///         // Send email using ctx.idempotency_key...
///         Ok(SendEmailOutput { message_id: "..." })
///     }
/// }
/// ```
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Unique type identifier for this activity
    ///
    /// This is used to look up the activity in the registry.
    const TYPE: &'static str;

    /// Input type for the activity
    type Input: Serialize + DeserializeOwned + Send;

    /// Output type for the activity
    type Output: Serialize + DeserializeOwned + Send;

    /// Execute the activity
    ///
    /// # Errors
    ///
    /// Return `ActivityError::retryable()` for transient failures that should be retried.
    /// Return `ActivityError::non_retryable()` for permanent failures.
    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: Self::Input,
    ) -> Result<Self::Output, ActivityError>;
}
