// Cadence worker
//
// Wires the event store, the workflow host and the services together, resumes
// interrupted enrollments on start and stops the host on shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_durable::{
    Clock, FileWorkflowEventStore, HostConfig, InMemoryWorkflowEventStore, SystemClock,
    WorkflowEventStore, WorkflowHost,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::activities::SendEmailActivity;
use crate::cadences::CadenceService;
use crate::config::WorkerConfig;
use crate::enrollments::EnrollmentService;
use crate::workflow::CadenceWorkflow;

/// Hosts cadence workflows in this process
pub struct CadenceWorker {
    config: WorkerConfig,
    host: Arc<WorkflowHost>,
    cadences: Arc<CadenceService>,
    enrollments: EnrollmentService,
    email: Arc<SendEmailActivity>,
    shutdown: CancellationToken,
}

impl CadenceWorker {
    /// Create a worker with the store selected by `config`
    pub fn new(config: WorkerConfig) -> Result<Self> {
        let store: Arc<dyn WorkflowEventStore> = match &config.data_dir {
            Some(dir) => {
                let store = FileWorkflowEventStore::open(dir).with_context(|| {
                    format!("Failed to open event store at {}", dir.display())
                })?;
                info!(data_dir = %dir.display(), "using file event store");
                Arc::new(store)
            }
            None => {
                warn!("CADENCE_DATA_DIR not set, workflows will not survive a restart");
                Arc::new(InMemoryWorkflowEventStore::new())
            }
        };

        Ok(Self::with_store(config, store, Arc::new(SystemClock)))
    }

    /// Create a worker over an existing store and clock
    pub fn with_store(
        config: WorkerConfig,
        store: Arc<dyn WorkflowEventStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_parts(config, store, clock, Arc::new(SendEmailActivity::new()))
    }

    /// Create a worker that sends through an existing email activity
    ///
    /// Workers sharing one activity share its record of delivered attempts,
    /// the way two processes would share a mail provider.
    pub fn with_parts(
        config: WorkerConfig,
        store: Arc<dyn WorkflowEventStore>,
        clock: Arc<dyn Clock>,
        email: Arc<SendEmailActivity>,
    ) -> Self {
        let host = Arc::new(
            WorkflowHost::builder(store)
                .config(
                    HostConfig::default()
                        .with_worker_id(config.worker_id.clone())
                        .with_shutdown_timeout(config.shutdown_timeout),
                )
                .clock(clock)
                .workflow::<CadenceWorkflow>()
                .shared_activity(Arc::clone(&email))
                .build(),
        );
        let cadences = Arc::new(CadenceService::new());
        let enrollments = EnrollmentService::new(Arc::clone(&host), Arc::clone(&cadences));

        Self {
            config,
            host,
            cadences,
            enrollments,
            email,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<WorkflowHost> {
        &self.host
    }

    pub fn cadences(&self) -> &CadenceService {
        &self.cadences
    }

    pub fn enrollments(&self) -> &EnrollmentService {
        &self.enrollments
    }

    /// The email activity, for inspecting what was sent
    pub fn email(&self) -> &SendEmailActivity {
        &self.email
    }

    /// Resume interrupted enrollments
    pub async fn recover(&self) -> Result<usize> {
        self.host
            .recover()
            .await
            .context("Failed to recover workflows")
    }

    /// Recover, then serve until shutdown is requested
    pub async fn run(&self) -> Result<()> {
        info!(worker_id = %self.config.worker_id, "starting cadence worker");

        let resumed = self.recover().await?;
        info!(resumed, "cadence worker ready");

        self.shutdown.cancelled().await;
        Ok(())
    }

    /// Stop all workflows; the store keeps their progress
    pub async fn shutdown(&self) {
        info!(worker_id = %self.config.worker_id, "stopping cadence worker");
        self.shutdown.cancel();
        self.host.shutdown().await;
    }
}
