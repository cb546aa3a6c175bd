//! In-memory implementation of WorkflowEventStore for testing

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::store::*;
use crate::workflow::{WorkflowError, WorkflowEvent};

/// Internal workflow state
struct StoredWorkflow {
    workflow_type: String,
    status: WorkflowStatus,
    input: serde_json::Value,
    result: Option<serde_json::Value>,
    error: Option<WorkflowError>,
    events: Vec<WorkflowEvent>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StoredWorkflow {
    fn info(&self, id: &str) -> WorkflowInfo {
        WorkflowInfo {
            id: id.to_string(),
            workflow_type: self.workflow_type.clone(),
            status: self.status,
            input: self.input.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// In-memory implementation of WorkflowEventStore
///
/// Stores everything in memory and provides the same semantics as the file
/// store. Data survives a host shutdown as long as the store value itself is
/// kept, which is how tests simulate a process restart.
///
/// # Example
///
/// ```
/// use cadence_durable::InMemoryWorkflowEventStore;
///
/// let store = InMemoryWorkflowEventStore::new();
/// assert_eq!(store.workflow_count(), 0);
/// ```
pub struct InMemoryWorkflowEventStore {
    workflows: RwLock<HashMap<String, StoredWorkflow>>,
}

impl InMemoryWorkflowEventStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of workflows
    pub fn workflow_count(&self) -> usize {
        self.workflows.read().len()
    }

    /// Get the number of events recorded for a workflow
    pub fn event_count(&self, workflow_id: &str) -> usize {
        self.workflows
            .read()
            .get(workflow_id)
            .map(|w| w.events.len())
            .unwrap_or(0)
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.workflows.write().clear();
    }
}

impl Default for InMemoryWorkflowEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowEventStore for InMemoryWorkflowEventStore {
    async fn create_workflow(
        &self,
        workflow_id: &str,
        workflow_type: &str,
        input: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();
        if workflows.contains_key(workflow_id) {
            return Err(StoreError::WorkflowAlreadyExists(workflow_id.to_string()));
        }

        let now = Utc::now();
        workflows.insert(
            workflow_id.to_string(),
            StoredWorkflow {
                workflow_type: workflow_type.to_string(),
                status: WorkflowStatus::Pending,
                input,
                result: None,
                error: None,
                events: vec![],
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn get_workflow_info(&self, workflow_id: &str) -> Result<WorkflowInfo, StoreError> {
        let workflows = self.workflows.read();
        workflows
            .get(workflow_id)
            .map(|w| w.info(workflow_id))
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowInfo>, StoreError> {
        let workflows = self.workflows.read();
        let mut infos: Vec<WorkflowInfo> = workflows
            .iter()
            .map(|(id, w)| w.info(id))
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(infos)
    }

    async fn update_workflow_status(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        result: Option<serde_json::Value>,
        error: Option<WorkflowError>,
    ) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write();
        let workflow = workflows
            .get_mut(workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;

        workflow.status = status;
        workflow.result = result;
        workflow.error = error;
        workflow.updated_at = Utc::now();
        Ok(())
    }

    async fn append_events(
        &self,
        workflow_id: &str,
        expected_sequence: i32,
        events: Vec<WorkflowEvent>,
    ) -> Result<i32, StoreError> {
        let mut workflows = self.workflows.write();
        let workflow = workflows
            .get_mut(workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;

        let current_sequence = workflow.events.len() as i32;
        if current_sequence != expected_sequence {
            return Err(StoreError::ConcurrencyConflict {
                expected: expected_sequence,
                actual: current_sequence,
            });
        }

        workflow.events.extend(events);
        workflow.updated_at = Utc::now();
        Ok(workflow.events.len() as i32)
    }

    async fn load_events(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<(i32, WorkflowEvent)>, StoreError> {
        let workflows = self.workflows.read();
        let workflow = workflows
            .get(workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;

        Ok(workflow
            .events
            .iter()
            .enumerate()
            .map(|(i, e)| (i as i32, e.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_get_workflow() {
        let store = InMemoryWorkflowEventStore::new();

        store
            .create_workflow("cadence-1", "cadence", json!({"key": "value"}))
            .await
            .unwrap();

        let status = store.get_workflow_status("cadence-1").await.unwrap();
        assert_eq!(status, WorkflowStatus::Pending);
        assert_eq!(store.workflow_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = InMemoryWorkflowEventStore::new();
        store.create_workflow("wf", "t", json!({})).await.unwrap();

        let result = store.create_workflow("wf", "t", json!({})).await;
        assert!(matches!(result, Err(StoreError::WorkflowAlreadyExists(id)) if id == "wf"));
    }

    #[tokio::test]
    async fn test_append_and_load_events() {
        let store = InMemoryWorkflowEventStore::new();
        store.create_workflow("wf", "test", json!({})).await.unwrap();

        let seq = store
            .append_events(
                "wf",
                0,
                vec![WorkflowEvent::WorkflowStarted { input: json!({}) }],
            )
            .await
            .unwrap();
        assert_eq!(seq, 1);

        let seq = store
            .append_events(
                "wf",
                1,
                vec![WorkflowEvent::TimerFired {
                    timer_id: "wait-0".to_string(),
                }],
            )
            .await
            .unwrap();
        assert_eq!(seq, 2);

        let events = store.load_events("wf").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].0, 1);
        assert_eq!(store.event_count("wf"), 2);
    }

    #[tokio::test]
    async fn test_concurrency_conflict() {
        let store = InMemoryWorkflowEventStore::new();
        store.create_workflow("wf", "test", json!({})).await.unwrap();

        store
            .append_events(
                "wf",
                0,
                vec![WorkflowEvent::WorkflowStarted { input: json!({}) }],
            )
            .await
            .unwrap();

        let result = store
            .append_events(
                "wf",
                0,
                vec![WorkflowEvent::WorkflowStarted { input: json!({}) }],
            )
            .await;

        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict {
                expected: 0,
                actual: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_update_status_and_list() {
        let store = InMemoryWorkflowEventStore::new();
        store.create_workflow("a", "t", json!({})).await.unwrap();
        store.create_workflow("b", "t", json!({})).await.unwrap();

        store
            .update_workflow_status("b", WorkflowStatus::Completed, Some(json!(1)), None)
            .await
            .unwrap();

        let infos = store.list_workflows().await.unwrap();
        assert_eq!(infos.len(), 2);

        let b = infos.iter().find(|i| i.id == "b").unwrap();
        assert_eq!(b.status, WorkflowStatus::Completed);
        assert_eq!(b.result, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_unknown_workflow() {
        let store = InMemoryWorkflowEventStore::new();

        assert!(matches!(
            store.load_events("missing").await,
            Err(StoreError::WorkflowNotFound(_))
        ));
        assert!(matches!(
            store
                .update_workflow_status("missing", WorkflowStatus::Failed, None, None)
                .await,
            Err(StoreError::WorkflowNotFound(_))
        ));
    }
}
