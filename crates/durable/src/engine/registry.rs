//! Workflow registry for type-erased workflow creation
//!
//! The registry allows registering workflow factories that create workflow
//! instances from JSON input without knowing the concrete type at runtime.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::activity::ActivityError;
use crate::workflow::{SignalRejection, Workflow, WorkflowAction, WorkflowError, WorkflowSignal};

/// Type-erased workflow interface
///
/// This trait allows the host to work with workflows without knowing
/// their concrete types. All method parameters and return values are JSON.
pub trait AnyWorkflow: Send + Sync {
    /// Get the workflow type identifier
    fn workflow_type(&self) -> &'static str;

    /// Called when workflow starts
    fn on_start(&mut self) -> Vec<WorkflowAction>;

    /// Called when an activity completes
    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction>;

    /// Called when an activity fails
    fn on_activity_failed(
        &mut self,
        activity_id: &str,
        error: &ActivityError,
    ) -> Vec<WorkflowAction>;

    /// Called when a timer fires
    fn on_timer_fired(&mut self, timer_id: &str) -> Vec<WorkflowAction>;

    /// Check whether a signal may be applied
    fn accepts_signal(&self, signal: &WorkflowSignal) -> Result<(), SignalRejection>;

    /// Called when a signal is applied
    fn on_signal(&mut self, signal: &WorkflowSignal) -> Vec<WorkflowAction>;

    /// Get the query snapshot as JSON
    fn query_json(&self) -> Value;

    /// Check if workflow has completed
    fn is_completed(&self) -> bool;

    /// Get the result as JSON (if completed successfully)
    fn result_json(&self) -> Option<Value>;

    /// Get the error (if failed)
    fn error(&self) -> Option<WorkflowError>;
}

/// Wrapper to implement AnyWorkflow for any Workflow
struct WorkflowWrapper<W: Workflow> {
    inner: W,
}

impl<W: Workflow> AnyWorkflow for WorkflowWrapper<W> {
    fn workflow_type(&self) -> &'static str {
        W::TYPE
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        self.inner.on_start()
    }

    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction> {
        self.inner.on_activity_completed(activity_id, result)
    }

    fn on_activity_failed(
        &mut self,
        activity_id: &str,
        error: &ActivityError,
    ) -> Vec<WorkflowAction> {
        self.inner.on_activity_failed(activity_id, error)
    }

    fn on_timer_fired(&mut self, timer_id: &str) -> Vec<WorkflowAction> {
        self.inner.on_timer_fired(timer_id)
    }

    fn accepts_signal(&self, signal: &WorkflowSignal) -> Result<(), SignalRejection> {
        self.inner.accepts_signal(signal)
    }

    fn on_signal(&mut self, signal: &WorkflowSignal) -> Vec<WorkflowAction> {
        self.inner.on_signal(signal)
    }

    fn query_json(&self) -> Value {
        serde_json::to_value(self.inner.query()).unwrap_or(Value::Null)
    }

    fn is_completed(&self) -> bool {
        self.inner.is_completed()
    }

    fn result_json(&self) -> Option<Value> {
        self.inner
            .result()
            .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
    }

    fn error(&self) -> Option<WorkflowError> {
        self.inner.error()
    }
}

/// Factory function type for creating workflows from JSON input
pub type WorkflowFactory =
    Box<dyn Fn(Value) -> Result<Box<dyn AnyWorkflow>, serde_json::Error> + Send + Sync>;

/// Registry of workflow factories
///
/// The registry maps workflow type names to factory functions that create
/// workflow instances from JSON input.
pub struct WorkflowRegistry {
    factories: HashMap<String, WorkflowFactory>,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a workflow type
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut registry = WorkflowRegistry::new();
    /// registry.register::<CadenceWorkflow>();
    /// ```
    pub fn register<W: Workflow>(&mut self) {
        let factory: WorkflowFactory = Box::new(|input: Value| {
            let typed_input: W::Input = serde_json::from_value(input)?;
            let workflow = W::new(typed_input);
            Ok(Box::new(WorkflowWrapper { inner: workflow }) as Box<dyn AnyWorkflow>)
        });

        self.factories.insert(W::TYPE.to_string(), factory);
    }

    /// Check if a workflow type is registered
    pub fn contains(&self, workflow_type: &str) -> bool {
        self.factories.contains_key(workflow_type)
    }

    /// Create a workflow instance from type name and JSON input
    pub fn create(
        &self,
        workflow_type: &str,
        input: Value,
    ) -> Result<Box<dyn AnyWorkflow>, RegistryError> {
        let factory = self
            .factories
            .get(workflow_type)
            .ok_or_else(|| RegistryError::UnknownWorkflowType(workflow_type.to_string()))?;

        factory(input).map_err(RegistryError::Deserialization)
    }

    /// Get the number of registered workflow types
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Get all registered workflow type names
    pub fn workflow_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|s| s.as_str())
    }
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflow_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Errors from registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Workflow type not registered
    #[error("unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    /// Failed to deserialize workflow input
    #[error("failed to deserialize workflow input: {0}")]
    Deserialization(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct CountdownInput {
        from: u32,
    }

    /// Ticks a timer `from` times, then completes
    struct CountdownWorkflow {
        remaining: u32,
    }

    impl Workflow for CountdownWorkflow {
        const TYPE: &'static str = "countdown";
        type Input = CountdownInput;
        type Output = u32;
        type Query = u32;

        fn new(input: Self::Input) -> Self {
            Self {
                remaining: input.from,
            }
        }

        fn on_start(&mut self) -> Vec<WorkflowAction> {
            self.next()
        }

        fn on_activity_completed(
            &mut self,
            _activity_id: &str,
            _result: Value,
        ) -> Vec<WorkflowAction> {
            vec![]
        }

        fn on_activity_failed(
            &mut self,
            _activity_id: &str,
            error: &ActivityError,
        ) -> Vec<WorkflowAction> {
            vec![WorkflowAction::fail(WorkflowError::new(&error.message))]
        }

        fn on_timer_fired(&mut self, _timer_id: &str) -> Vec<WorkflowAction> {
            self.remaining -= 1;
            self.next()
        }

        fn query(&self) -> Self::Query {
            self.remaining
        }

        fn is_completed(&self) -> bool {
            self.remaining == 0
        }

        fn result(&self) -> Option<Self::Output> {
            (self.remaining == 0).then_some(0)
        }
    }

    impl CountdownWorkflow {
        fn next(&self) -> Vec<WorkflowAction> {
            if self.remaining == 0 {
                vec![WorkflowAction::complete(serde_json::json!(0))]
            } else {
                vec![WorkflowAction::timer(
                    format!("tick-{}", self.remaining),
                    Duration::from_secs(1),
                )]
            }
        }
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = WorkflowRegistry::new();
        registry.register::<CountdownWorkflow>();

        assert!(registry.contains("countdown"));
        assert!(!registry.contains("unknown"));

        let workflow = registry
            .create("countdown", serde_json::json!({ "from": 2 }))
            .expect("should create workflow");

        assert_eq!(workflow.workflow_type(), "countdown");
        assert_eq!(workflow.query_json(), serde_json::json!(2));
        assert!(!workflow.is_completed());
    }

    #[test]
    fn test_unknown_workflow_type() {
        let registry = WorkflowRegistry::new();
        let result = registry.create("unknown", serde_json::json!({}));

        assert!(matches!(result, Err(RegistryError::UnknownWorkflowType(_))));
    }

    #[test]
    fn test_invalid_input() {
        let mut registry = WorkflowRegistry::new();
        registry.register::<CountdownWorkflow>();

        let result = registry.create("countdown", serde_json::json!({}));
        assert!(matches!(result, Err(RegistryError::Deserialization(_))));
    }

    #[test]
    fn test_workflow_execution() {
        let mut registry = WorkflowRegistry::new();
        registry.register::<CountdownWorkflow>();

        let mut workflow = registry
            .create("countdown", serde_json::json!({ "from": 1 }))
            .unwrap();

        let actions = workflow.on_start();
        assert!(matches!(actions[0], WorkflowAction::StartTimer { .. }));

        let actions = workflow.on_timer_fired("tick-1");
        assert!(matches!(actions[0], WorkflowAction::CompleteWorkflow { .. }));

        assert!(workflow.is_completed());
        assert_eq!(workflow.result_json(), Some(serde_json::json!(0)));
    }

    #[test]
    fn test_default_signal_gate() {
        let mut registry = WorkflowRegistry::new();
        registry.register::<CountdownWorkflow>();
        let signal = WorkflowSignal::new("poke", serde_json::json!({}));

        let running = registry
            .create("countdown", serde_json::json!({ "from": 1 }))
            .unwrap();
        assert!(running.accepts_signal(&signal).is_ok());

        let done = registry
            .create("countdown", serde_json::json!({ "from": 0 }))
            .unwrap();
        assert_eq!(
            done.accepts_signal(&signal),
            Err(SignalRejection::Terminal)
        );
    }

    #[test]
    fn test_registry_debug() {
        let mut registry = WorkflowRegistry::new();
        registry.register::<CountdownWorkflow>();

        let debug_str = format!("{:?}", registry);
        assert!(debug_str.contains("countdown"));
    }
}
