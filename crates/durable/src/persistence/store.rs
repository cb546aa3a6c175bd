//! WorkflowEventStore trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::{WorkflowError, WorkflowEvent};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Workflow not found
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// A workflow with this id already exists
    #[error("workflow already exists: {0}")]
    WorkflowAlreadyExists(String),

    /// Workflow id cannot be used as a storage key
    #[error("invalid workflow id: {0:?}")]
    InvalidWorkflowId(String),

    /// Concurrency conflict (optimistic locking failed)
    #[error("concurrency conflict: expected sequence {expected}, got {actual}")]
    ConcurrencyConflict { expected: i32, actual: i32 },

    /// Underlying storage failed
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Workflow created but not started
    Pending,

    /// Workflow is running
    Running,

    /// Workflow completed successfully
    Completed,

    /// Workflow failed
    Failed,

    /// Workflow was cancelled
    Cancelled,
}

impl WorkflowStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Workflow information kept by the store
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowInfo {
    pub id: String,
    pub workflow_type: String,
    pub status: WorkflowStatus,
    pub input: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<WorkflowError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Store for workflow instances and their event logs
///
/// Implementations must be thread-safe. An event is durable once
/// `append_events` returns; the host does not start the effect an event
/// describes before that.
#[async_trait]
pub trait WorkflowEventStore: Send + Sync + 'static {
    // =========================================================================
    // Workflow Operations
    // =========================================================================

    /// Create a new workflow instance in `Pending` status
    ///
    /// Fails with [`StoreError::WorkflowAlreadyExists`] when the id is taken.
    async fn create_workflow(
        &self,
        workflow_id: &str,
        workflow_type: &str,
        input: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Get workflow status
    async fn get_workflow_status(&self, workflow_id: &str) -> Result<WorkflowStatus, StoreError> {
        Ok(self.get_workflow_info(workflow_id).await?.status)
    }

    /// Get full workflow info
    async fn get_workflow_info(&self, workflow_id: &str) -> Result<WorkflowInfo, StoreError>;

    /// List every workflow the store knows about, oldest first
    async fn list_workflows(&self) -> Result<Vec<WorkflowInfo>, StoreError>;

    /// Update workflow status
    async fn update_workflow_status(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        result: Option<serde_json::Value>,
        error: Option<WorkflowError>,
    ) -> Result<(), StoreError>;

    // =========================================================================
    // Event Operations
    // =========================================================================

    /// Append events to a workflow (with optimistic concurrency)
    ///
    /// Returns the new sequence number after appending.
    async fn append_events(
        &self,
        workflow_id: &str,
        expected_sequence: i32,
        events: Vec<WorkflowEvent>,
    ) -> Result<i32, StoreError>;

    /// Load all events for a workflow (for replay)
    async fn load_events(&self, workflow_id: &str)
        -> Result<Vec<(i32, WorkflowEvent)>, StoreError>;
}
