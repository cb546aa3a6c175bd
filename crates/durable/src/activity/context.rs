//! Activity execution context

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Context provided to activities during execution
///
/// The context provides:
/// - Information about the current execution attempt
/// - The idempotency key for this attempt
/// - Cancellation detection (the host is shutting down)
///
/// # Example
///
/// ```ignore
/// async fn execute(&self, ctx: &ActivityContext, input: Input) -> Result<Output, ActivityError> {
///     if let Some(previous) = self.sent.get(&ctx.idempotency_key) {
///         return Ok(previous.clone());
///     }
///
///     tokio::select! {
///         result = deliver(&input) => result,
///         _ = ctx.cancelled() => Err(ActivityError::retryable("worker shutting down")),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ActivityContext {
    /// Unique execution attempt ID
    pub attempt_id: Uuid,

    /// Current attempt number (1-based)
    pub attempt: u32,

    /// Maximum attempts allowed
    pub max_attempts: u32,

    /// Workflow instance ID that owns this activity
    pub workflow_id: String,

    /// Activity ID within the workflow
    pub activity_id: String,

    /// Stable across re-dispatches of the same attempt
    pub idempotency_key: String,

    cancellation: CancellationToken,
}

impl ActivityContext {
    /// Create a new activity context
    pub fn new(
        workflow_id: impl Into<String>,
        activity_id: impl Into<String>,
        attempt: u32,
        max_attempts: u32,
    ) -> Self {
        let workflow_id = workflow_id.into();
        let activity_id = activity_id.into();
        let idempotency_key = Self::idempotency_key_for(&workflow_id, &activity_id, attempt);

        Self {
            attempt_id: Uuid::now_v7(),
            attempt,
            max_attempts,
            workflow_id,
            activity_id,
            idempotency_key,
            cancellation: CancellationToken::new(),
        }
    }

    /// Key identifying one attempt of one activity in one workflow
    pub fn idempotency_key_for(workflow_id: &str, activity_id: &str, attempt: u32) -> String {
        format!("{workflow_id}:{activity_id}:{attempt}")
    }

    /// Tie this context to a cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when cancellation is requested
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Check if this is the last retry attempt
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
