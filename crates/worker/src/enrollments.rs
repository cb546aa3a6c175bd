// Enrollment orchestrator
//
// An enrollment is one contact's run through a cadence. Each enrollment owns
// exactly one cadence workflow, addressed as `cadence-{enrollment_id}`.
// Decision: Enrollment records are derived from the workflow store (id,
// input, creation time) rather than kept separately, so they survive a
// restart together with the workflows they describe.

use std::sync::Arc;

use cadence_durable::{
    HostError, StoreError, Workflow, WorkflowEventStore, WorkflowHandle, WorkflowHost, WorkflowInfo,
    WorkflowSignal,
};
use cadence_schemas::{
    validate_email, validate_steps, CadenceWorkflowInput, CreateEnrollmentRequest, Enrollment,
    EnrollmentState, Step, UpdateCadencePayload, ValidationError, WorkflowState,
    UPDATE_CADENCE_SIGNAL,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cadences::{CadenceError, CadenceService};
use crate::workflow::CadenceWorkflow;

const WORKFLOW_ID_PREFIX: &str = "cadence-";

/// Workflow id of an enrollment
pub fn workflow_id_for(enrollment_id: &str) -> String {
    format!("{WORKFLOW_ID_PREFIX}{enrollment_id}")
}

/// Errors returned to enrollment callers
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The enrollment has finished and can no longer change
    #[error("conflict: {0}")]
    Conflict(String),

    /// The workflow host cannot be reached
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for EnrollmentError {
    fn from(err: ValidationError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl EnrollmentError {
    fn from_host(enrollment_id: &str, err: HostError) -> Self {
        match err {
            HostError::NotFound(_) => Self::NotFound(format!("enrollment {enrollment_id}")),
            HostError::WorkflowCompleted(_) => {
                Self::Conflict(format!("enrollment {enrollment_id} has already finished"))
            }
            HostError::InvalidSignal { rejection, .. } => Self::BadRequest(rejection.to_string()),
            HostError::Unavailable(reason) => Self::Unavailable(reason),
            HostError::Store(StoreError::InvalidWorkflowId(id)) => {
                Self::BadRequest(format!("invalid enrollment id: {id}"))
            }
            HostError::Store(err) => Self::Unavailable(err.to_string()),
            err @ (HostError::Registry(_) | HostError::Replay(_) | HostError::Serialization(_)) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

/// Rebuild an enrollment record from its workflow
fn enrollment_from_info(info: &WorkflowInfo) -> Option<Enrollment> {
    let enrollment_id = info.id.strip_prefix(WORKFLOW_ID_PREFIX)?;
    let input: CadenceWorkflowInput = serde_json::from_value(info.input.clone()).ok()?;

    Some(Enrollment {
        id: enrollment_id.to_string(),
        cadence_id: input.cadence.id,
        contact_email: input.contact_email,
        workflow_id: info.id.clone(),
        created_at: info.created_at,
    })
}

/// Enrollment API over the workflow host
pub struct EnrollmentService {
    host: Arc<WorkflowHost>,
    cadences: Arc<CadenceService>,
}

impl EnrollmentService {
    pub fn new(host: Arc<WorkflowHost>, cadences: Arc<CadenceService>) -> Self {
        Self { host, cadences }
    }

    /// Enroll a contact into a cadence and start its workflow
    #[instrument(skip(self, request), fields(cadence_id = %request.cadence_id))]
    pub async fn create(
        &self,
        request: CreateEnrollmentRequest,
    ) -> Result<Enrollment, EnrollmentError> {
        validate_email(&request.contact_email)?;
        let cadence = self.cadences.get(&request.cadence_id).map_err(|err| match err {
            CadenceError::NotFound(id) => EnrollmentError::NotFound(format!("cadence {id}")),
            CadenceError::Invalid(err) => err.into(),
        })?;

        let enrollment_id = Uuid::now_v7().to_string();
        let input = CadenceWorkflowInput {
            cadence,
            contact_email: request.contact_email,
        };
        let handle = self.start(&enrollment_id, &input).await?;

        let info = self
            .host
            .store()
            .get_workflow_info(handle.workflow_id())
            .await
            .map_err(|err| EnrollmentError::from_host(&enrollment_id, err.into()))?;
        let enrollment = enrollment_from_info(&info).ok_or_else(|| {
            EnrollmentError::Internal(format!("workflow {} has unreadable input", info.id))
        })?;

        info!(%enrollment_id, workflow_id = %enrollment.workflow_id, "created enrollment");
        Ok(enrollment)
    }

    /// Start the workflow of an enrollment
    ///
    /// Starting the same enrollment again returns a handle to the instance
    /// that is already running.
    pub async fn start(
        &self,
        enrollment_id: &str,
        input: &CadenceWorkflowInput,
    ) -> Result<WorkflowHandle, EnrollmentError> {
        self.host
            .start_workflow::<CadenceWorkflow>(&workflow_id_for(enrollment_id), input)
            .await
            .map_err(|err| EnrollmentError::from_host(enrollment_id, err))
    }

    /// All enrollments, oldest first
    pub async fn list(&self) -> Result<Vec<Enrollment>, EnrollmentError> {
        let workflows = self
            .host
            .store()
            .list_workflows()
            .await
            .map_err(|err| EnrollmentError::Unavailable(err.to_string()))?;

        Ok(workflows
            .iter()
            .filter(|info| info.workflow_type == CadenceWorkflow::TYPE)
            .filter_map(|info| {
                let enrollment = enrollment_from_info(info);
                if enrollment.is_none() {
                    warn!(
                        workflow_id = %info.id,
                        "skipping cadence workflow with unreadable input"
                    );
                }
                enrollment
            })
            .collect())
    }

    async fn handle(&self, enrollment_id: &str) -> Result<WorkflowHandle, EnrollmentError> {
        self.host
            .handle(&workflow_id_for(enrollment_id))
            .await
            .map_err(|err| EnrollmentError::from_host(enrollment_id, err))
    }

    fn state_of(
        enrollment_id: &str,
        handle: &WorkflowHandle,
    ) -> Result<EnrollmentState, EnrollmentError> {
        let state: WorkflowState = handle
            .query()
            .map_err(|err| EnrollmentError::from_host(enrollment_id, err))?;
        Ok(EnrollmentState::from_state(enrollment_id, state))
    }

    /// Current state of an enrollment
    #[instrument(skip(self))]
    pub async fn get(&self, enrollment_id: &str) -> Result<EnrollmentState, EnrollmentError> {
        let handle = self.handle(enrollment_id).await?;
        Self::state_of(enrollment_id, &handle)
    }

    /// Replace the remaining steps of a running enrollment
    ///
    /// Returns the state right after the replacement was applied.
    #[instrument(skip(self, steps), fields(steps = steps.len()))]
    pub async fn update_steps(
        &self,
        enrollment_id: &str,
        steps: Vec<Step>,
    ) -> Result<EnrollmentState, EnrollmentError> {
        validate_steps(&steps)?;
        let handle = self.handle(enrollment_id).await?;

        let signal =
            WorkflowSignal::with_payload(UPDATE_CADENCE_SIGNAL, &UpdateCadencePayload { steps })
                .map_err(|err| EnrollmentError::Internal(err.to_string()))?;
        handle
            .signal(signal)
            .await
            .map_err(|err| EnrollmentError::from_host(enrollment_id, err))?;

        let state = Self::state_of(enrollment_id, &handle)?;
        debug!(
            %enrollment_id,
            version = state.steps_version,
            status = %state.status,
            "steps replaced"
        );
        Ok(state)
    }
}
