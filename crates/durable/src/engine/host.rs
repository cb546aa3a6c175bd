//! Workflow host
//!
//! The host owns the live instances of one process. It starts workflows,
//! hands out [`WorkflowHandle`]s, re-activates interrupted workflows from
//! their event logs and shuts everything down cleanly.
//!
//! At most one runtime exists per workflow id: activation goes through a
//! per-id once-cell, so concurrent callers share the same instance.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, OnceCell};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::instance::{snapshot_of, Command, InstanceRuntime, InstanceServices};
use super::registry::{RegistryError, WorkflowRegistry};
use super::replay::{replay, ReplayError};
use crate::activity::{Activity, ActivityRegistry};
use crate::persistence::{StoreError, WorkflowEventStore, WorkflowStatus};
use crate::workflow::{SignalRejection, Workflow, WorkflowError, WorkflowEvent, WorkflowSignal};

// =============================================================================
// Errors
// =============================================================================

/// Errors from host operations
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// No workflow with this id exists
    #[error("workflow not found: {0}")]
    NotFound(String),

    /// The workflow has terminated and accepts no further signals
    #[error("workflow {0} already completed")]
    WorkflowCompleted(String),

    /// The workflow refused the signal
    #[error("workflow {workflow_id} rejected signal: {rejection}")]
    InvalidSignal {
        workflow_id: String,
        rejection: SignalRejection,
    },

    /// The host or instance cannot serve the request right now
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Registry error
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Replay error (the log does not match the workflow)
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time view of a workflow instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub workflow_id: String,
    pub workflow_type: String,

    /// Host-level status; `Running` until termination is recorded
    pub status: WorkflowStatus,

    /// The workflow's own query view
    pub state: Value,

    pub result: Option<Value>,
    pub error: Option<WorkflowError>,
}

impl InstanceSnapshot {
    /// Check if termination has been recorded
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the workflow host
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Recorded on every activity attempt this host dispatches
    pub worker_id: String,

    /// How long shutdown waits for instances to stop
    pub shutdown_timeout: Duration,

    /// Pending signals buffered per instance
    pub inbox_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            shutdown_timeout: Duration::from_secs(30),
            inbox_capacity: 64,
        }
    }
}

impl HostConfig {
    /// Set the worker id
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set the shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the per-instance inbox capacity
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity.max(1);
        self
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`WorkflowHost`]
pub struct WorkflowHostBuilder {
    store: Arc<dyn WorkflowEventStore>,
    workflows: WorkflowRegistry,
    activities: ActivityRegistry,
    clock: Arc<dyn Clock>,
    config: HostConfig,
}

impl WorkflowHostBuilder {
    /// Use a custom configuration
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a workflow type
    pub fn workflow<W: Workflow>(mut self) -> Self {
        self.workflows.register::<W>();
        self
    }

    /// Register an activity
    pub fn activity<A: Activity>(mut self, activity: A) -> Self {
        self.activities.register(activity);
        self
    }

    /// Register an activity the caller keeps a handle to
    pub fn shared_activity<A: Activity>(mut self, activity: Arc<A>) -> Self {
        self.activities.register_shared(activity);
        self
    }

    pub fn build(self) -> WorkflowHost {
        info!(
            worker_id = %self.config.worker_id,
            workflow_types = self.workflows.len(),
            activity_types = self.activities.len(),
            "workflow host ready"
        );

        WorkflowHost {
            store: self.store,
            workflows: Arc::new(self.workflows),
            activities: Arc::new(self.activities),
            clock: self.clock,
            config: self.config,
            instances: DashMap::new(),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }
}

// =============================================================================
// Host
// =============================================================================

/// Live side of an activated instance
struct InstanceEntry {
    snapshot: watch::Receiver<InstanceSnapshot>,

    /// `None` when the workflow was already terminal at activation
    inbox: Option<mpsc::Sender<Command>>,
}

impl InstanceEntry {
    /// The runtime stopped without terminating the workflow
    fn is_halted(&self) -> bool {
        self.inbox.as_ref().is_some_and(mpsc::Sender::is_closed)
            && !self.snapshot.borrow().is_terminal()
    }
}

type Slot = Arc<OnceCell<InstanceEntry>>;

/// Hosts durable workflow instances in this process
pub struct WorkflowHost {
    store: Arc<dyn WorkflowEventStore>,
    workflows: Arc<WorkflowRegistry>,
    activities: Arc<ActivityRegistry>,
    clock: Arc<dyn Clock>,
    config: HostConfig,
    instances: DashMap<String, Slot>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl WorkflowHost {
    /// Start building a host over `store`
    pub fn builder(store: Arc<dyn WorkflowEventStore>) -> WorkflowHostBuilder {
        WorkflowHostBuilder {
            store,
            workflows: WorkflowRegistry::new(),
            activities: ActivityRegistry::new(),
            clock: Arc::new(SystemClock),
            config: HostConfig::default(),
        }
    }

    /// The underlying event store
    pub fn store(&self) -> &Arc<dyn WorkflowEventStore> {
        &self.store
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Check if shutdown has begun
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn ensure_running(&self) -> Result<(), HostError> {
        if self.is_shut_down() {
            return Err(HostError::Unavailable("workflow host is shut down".to_string()));
        }
        Ok(())
    }

    fn slot(&self, workflow_id: &str) -> Slot {
        Arc::clone(
            self.instances
                .entry(workflow_id.to_string())
                .or_default()
                .value(),
        )
    }

    /// Start a workflow under `workflow_id`
    ///
    /// Starting an id that already exists attaches to the existing instance
    /// instead of creating a second one.
    #[instrument(skip(self, input), fields(workflow_type = W::TYPE))]
    pub async fn start_workflow<W: Workflow>(
        &self,
        workflow_id: &str,
        input: &W::Input,
    ) -> Result<WorkflowHandle, HostError> {
        self.ensure_running()?;
        if !self.workflows.contains(W::TYPE) {
            return Err(RegistryError::UnknownWorkflowType(W::TYPE.to_string()).into());
        }

        let input = serde_json::to_value(input)?;
        match self.store.create_workflow(workflow_id, W::TYPE, input).await {
            Ok(()) => info!(%workflow_id, "created workflow"),
            Err(StoreError::WorkflowAlreadyExists(_)) => {
                debug!(%workflow_id, "workflow already exists, attaching")
            }
            Err(err) => return Err(err.into()),
        }

        self.handle(workflow_id).await
    }

    /// Get a handle to an existing workflow, activating it if needed
    #[instrument(skip(self))]
    pub async fn handle(&self, workflow_id: &str) -> Result<WorkflowHandle, HostError> {
        self.ensure_running()?;

        let mut slot = self.slot(workflow_id);
        if slot.get().is_some_and(InstanceEntry::is_halted) {
            warn!(%workflow_id, "instance halted earlier, re-activating");
            self.instances
                .remove_if(workflow_id, |_, current| Arc::ptr_eq(current, &slot));
            slot = self.slot(workflow_id);
        }

        let entry = match slot.get_or_try_init(|| self.activate(workflow_id)).await {
            Ok(entry) => entry,
            Err(err) => {
                self.instances.remove_if(workflow_id, |_, current| {
                    Arc::ptr_eq(current, &slot) && !current.initialized()
                });
                return Err(err);
            }
        };

        Ok(WorkflowHandle {
            workflow_id: workflow_id.to_string(),
            snapshot: entry.snapshot.clone(),
            inbox: entry.inbox.clone(),
            shutdown: self.shutdown.clone(),
        })
    }

    /// Re-activate every workflow that has not terminated
    ///
    /// Returns the number of instances resumed. Instances that fail to
    /// activate are logged and skipped.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<usize, HostError> {
        self.ensure_running()?;

        let mut resumed = 0;
        for info in self.store.list_workflows().await? {
            if info.status.is_terminal() {
                continue;
            }
            match self.handle(&info.id).await {
                Ok(_) => resumed += 1,
                Err(err) => {
                    warn!(workflow_id = %info.id, error = %err, "failed to resume workflow")
                }
            }
        }

        info!(resumed, "recovered workflows");
        Ok(resumed)
    }

    async fn activate(&self, workflow_id: &str) -> Result<InstanceEntry, HostError> {
        let info = match self.store.get_workflow_info(workflow_id).await {
            Ok(info) => info,
            Err(StoreError::WorkflowNotFound(_)) => {
                return Err(HostError::NotFound(workflow_id.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let mut events = self.store.load_events(workflow_id).await?;
        if events.is_empty() {
            let started = WorkflowEvent::WorkflowStarted {
                input: info.input.clone(),
            };
            self.store
                .append_events(workflow_id, 0, vec![started.clone()])
                .await?;
            events.push((0, started));
        }

        let replayed = replay(
            &self.workflows,
            workflow_id,
            &info.workflow_type,
            info.input.clone(),
            events,
        )?;
        debug!(
            %workflow_id,
            sequence = replayed.sequence,
            queued = replayed.queue.len(),
            "replayed events"
        );

        let status = replayed
            .termination
            .as_ref()
            .map(|t| t.status)
            .unwrap_or(WorkflowStatus::Running);
        if info.status != status {
            let (result, error) = replayed
                .termination
                .as_ref()
                .map(|t| (t.result.clone(), t.error.clone()))
                .unwrap_or((None, None));
            self.store
                .update_workflow_status(workflow_id, status, result, error)
                .await?;
        }

        let snapshot = snapshot_of(
            workflow_id,
            &info.workflow_type,
            replayed.workflow.as_ref(),
            replayed.termination.as_ref(),
        );
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot);

        if replayed.termination.is_some() {
            debug!(%workflow_id, %status, "workflow already terminal");
            return Ok(InstanceEntry {
                snapshot: snapshot_rx,
                inbox: None,
            });
        }

        let (inbox_tx, inbox_rx) = mpsc::channel(self.config.inbox_capacity);
        let runtime = InstanceRuntime::new(
            workflow_id.to_string(),
            info.workflow_type,
            replayed,
            InstanceServices {
                store: Arc::clone(&self.store),
                activities: Arc::clone(&self.activities),
                clock: Arc::clone(&self.clock),
                worker_id: self.config.worker_id.clone(),
            },
            inbox_rx,
            snapshot_tx,
            self.shutdown.child_token(),
        );
        self.tracker.spawn(runtime.run());
        info!(%workflow_id, "activated workflow");

        Ok(InstanceEntry {
            snapshot: snapshot_rx,
            inbox: Some(inbox_tx),
        })
    }

    /// Stop all instances without recording anything further
    ///
    /// In-flight work is abandoned; the next host over the same store picks
    /// it up from the log.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();

        let live = self.tracker.len();
        match tokio::time::timeout(self.config.shutdown_timeout, self.tracker.wait()).await {
            Ok(()) => info!(instances = live, "workflow host stopped"),
            Err(_) => warn!(
                remaining = self.tracker.len(),
                timeout = ?self.config.shutdown_timeout,
                "timed out waiting for instances to stop"
            ),
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Client-side handle to one workflow instance
#[derive(Clone)]
pub struct WorkflowHandle {
    workflow_id: String,
    snapshot: watch::Receiver<InstanceSnapshot>,
    inbox: Option<mpsc::Sender<Command>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for WorkflowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowHandle")
            .field("workflow_id", &self.workflow_id)
            .field("status", &self.snapshot.borrow().status)
            .finish()
    }
}

impl WorkflowHandle {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    fn unreachable(&self) -> HostError {
        if self.snapshot.borrow().is_terminal() {
            HostError::WorkflowCompleted(self.workflow_id.clone())
        } else {
            HostError::Unavailable(format!("workflow {} is not running", self.workflow_id))
        }
    }

    fn ensure_available(&self) -> Result<(), HostError> {
        if self.shutdown.is_cancelled() {
            return Err(HostError::Unavailable("workflow host is shut down".to_string()));
        }
        let halted = self.inbox.as_ref().is_some_and(mpsc::Sender::is_closed)
            && !self.snapshot.borrow().is_terminal();
        if halted {
            return Err(self.unreachable());
        }
        Ok(())
    }

    /// Latest published view of the instance
    pub fn snapshot(&self) -> Result<InstanceSnapshot, HostError> {
        self.ensure_available()?;
        Ok(self.snapshot.borrow().clone())
    }

    pub fn status(&self) -> Result<WorkflowStatus, HostError> {
        Ok(self.snapshot()?.status)
    }

    /// Decode the workflow's query view
    pub fn query<T: DeserializeOwned>(&self) -> Result<T, HostError> {
        Ok(serde_json::from_value(self.snapshot()?.state)?)
    }

    /// Deliver a signal and wait until it is recorded and applied
    pub async fn signal(&self, signal: WorkflowSignal) -> Result<(), HostError> {
        self.ensure_available()?;
        let Some(inbox) = &self.inbox else {
            return Err(HostError::WorkflowCompleted(self.workflow_id.clone()));
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if inbox
            .send(Command::Signal {
                signal,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return Err(self.unreachable());
        }

        reply_rx.await.unwrap_or_else(|_| Err(self.unreachable()))
    }

    /// Wait until termination is recorded
    pub async fn wait_for_completion(&self) -> Result<InstanceSnapshot, HostError> {
        let mut snapshot = self.snapshot.clone();
        let result = snapshot
            .wait_for(InstanceSnapshot::is_terminal)
            .await
            .map(|snapshot| snapshot.clone());
        result.map_err(|_| {
            HostError::Unavailable(format!(
                "workflow {} stopped before completing",
                self.workflow_id
            ))
        })
    }
}
