// Cadence Workflow - durable step sequencer for one enrollment
//
// Runs the steps of a cadence one at a time:
// 1. SEND_EMAIL: schedule the send_email activity (retried, 30s per attempt)
// 2. WAIT: start a durable timer for the step's duration
// 3. After each step: stop if a replacement ended the run, else advance the cursor
//
// Key design principles:
// - The step list can be replaced while running; the cursor never moves back
// - A replacement that leaves no step at or after the cursor completes the run
// - State is a plain value so queries never wait on the running step

use std::time::Duration;

use cadence_durable::prelude::*;
use cadence_schemas::{
    CadenceWorkflowInput, ExecutionStatus, SendEmailInput, Step, UpdateCadencePayload,
    WorkflowState, UPDATE_CADENCE_SIGNAL,
};
use serde_json::{json, Value};

use crate::activities::SendEmailActivity;

// ============================================================================
// Send Options
// ============================================================================

const SEND_MAX_ATTEMPTS: u32 = 3;
const SEND_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const SEND_BACKOFF_COEFFICIENT: f64 = 2.0;
const SEND_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error code recorded when a send exhausts its attempts
pub const SEND_FAILED: &str = "SEND_EMAIL_FAILED";

fn send_options() -> ActivityOptions {
    ActivityOptions::default()
        .with_retry(
            RetryPolicy::exponential()
                .with_max_attempts(SEND_MAX_ATTEMPTS)
                .with_initial_interval(SEND_INITIAL_BACKOFF)
                .with_backoff_coefficient(SEND_BACKOFF_COEFFICIENT)
                .with_jitter(0.0),
        )
        .with_start_to_close_timeout(SEND_ATTEMPT_TIMEOUT)
}

// ============================================================================
// Workflow Implementation
// ============================================================================

/// Cadence Workflow - executes one contact's copy of a cadence
#[derive(Debug)]
pub struct CadenceWorkflow {
    cadence_id: String,
    contact_email: String,
    steps: Vec<Step>,
    cursor: usize,
    version: u64,
    status: ExecutionStatus,
}

impl CadenceWorkflow {
    fn state(&self) -> WorkflowState {
        WorkflowState {
            status: self.status,
            current_step_index: self.cursor,
            steps_version: self.version,
            steps: self.steps.clone(),
            contact_email: self.contact_email.clone(),
            cadence_id: self.cadence_id.clone(),
        }
    }

    /// Start the step under the cursor, or finish the run
    fn run_current_step(&mut self) -> Vec<WorkflowAction> {
        if self.status == ExecutionStatus::Running {
            match self.steps.get(self.cursor) {
                Some(Step::SendEmail { subject, body, .. }) => {
                    let input = SendEmailInput {
                        to: self.contact_email.clone(),
                        subject: subject.clone(),
                        body: body.clone(),
                    };
                    return vec![WorkflowAction::schedule_activity_with_options(
                        format!("send-{}", self.cursor),
                        SendEmailActivity::TYPE,
                        serde_json::to_value(input).unwrap_or(Value::Null),
                        send_options(),
                    )];
                }
                Some(Step::Wait { seconds, .. }) => {
                    return vec![WorkflowAction::timer(
                        format!("wait-{}", self.cursor),
                        Duration::from_secs(*seconds),
                    )];
                }
                None => self.status = ExecutionStatus::Completed,
            }
        }

        self.finish()
    }

    fn finish(&self) -> Vec<WorkflowAction> {
        match self.status {
            ExecutionStatus::Failed => vec![WorkflowAction::fail(self.failure())],
            _ => vec![WorkflowAction::complete(
                serde_json::to_value(self.state()).unwrap_or(Value::Null),
            )],
        }
    }

    fn failure(&self) -> WorkflowError {
        WorkflowError::new(format!(
            "sending email at step {} to {} failed",
            self.cursor, self.contact_email
        ))
        .with_code(SEND_FAILED)
    }

    fn step_finished(&mut self) -> Vec<WorkflowAction> {
        // A replacement during the step may have ended the run
        if self.status != ExecutionStatus::Running {
            return self.finish();
        }

        self.cursor += 1;
        if self.cursor >= self.steps.len() {
            self.status = ExecutionStatus::Completed;
        }
        self.run_current_step()
    }
}

impl Workflow for CadenceWorkflow {
    const TYPE: &'static str = "cadence";
    type Input = CadenceWorkflowInput;
    type Output = WorkflowState;
    type Query = WorkflowState;

    fn new(input: Self::Input) -> Self {
        Self {
            cadence_id: input.cadence.id,
            contact_email: input.contact_email,
            steps: input.cadence.steps,
            cursor: 0,
            version: 1,
            status: ExecutionStatus::Running,
        }
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        self.run_current_step()
    }

    fn on_activity_completed(&mut self, _activity_id: &str, _result: Value) -> Vec<WorkflowAction> {
        self.step_finished()
    }

    fn on_activity_failed(
        &mut self,
        _activity_id: &str,
        _error: &ActivityError,
    ) -> Vec<WorkflowAction> {
        self.status = ExecutionStatus::Failed;
        self.finish()
    }

    fn on_timer_fired(&mut self, _timer_id: &str) -> Vec<WorkflowAction> {
        self.step_finished()
    }

    fn accepts_signal(&self, signal: &WorkflowSignal) -> Result<(), SignalRejection> {
        if self.status.is_terminal() {
            return Err(SignalRejection::Terminal);
        }
        if !signal.is(UPDATE_CADENCE_SIGNAL) {
            return Err(SignalRejection::UnknownSignal(signal.signal_type.clone()));
        }
        signal
            .payload_as::<UpdateCadencePayload>()
            .map(|_| ())
            .map_err(|e| SignalRejection::InvalidPayload(e.to_string()))
    }

    fn on_signal(&mut self, signal: &WorkflowSignal) -> Vec<WorkflowAction> {
        let Ok(update) = signal.payload_as::<UpdateCadencePayload>() else {
            return vec![];
        };

        self.steps = update.steps;
        self.version += 1;
        if self.steps.len() <= self.cursor {
            self.status = ExecutionStatus::Completed;
        }

        // The running step finishes first; the next step is read afterwards
        vec![]
    }

    fn query(&self) -> Self::Query {
        self.state()
    }

    fn is_completed(&self) -> bool {
        self.status.is_terminal()
    }

    fn result(&self) -> Option<Self::Output> {
        (self.status == ExecutionStatus::Completed).then(|| self.state())
    }

    fn error(&self) -> Option<WorkflowError> {
        (self.status == ExecutionStatus::Failed).then(|| self.failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_schemas::Cadence;

    fn workflow(steps: Vec<Step>) -> CadenceWorkflow {
        CadenceWorkflow::new(CadenceWorkflowInput {
            cadence: Cadence {
                id: "c-1".to_string(),
                name: "Onboarding".to_string(),
                steps,
            },
            contact_email: "ada@example.com".to_string(),
        })
    }

    fn email(id: &str) -> Step {
        Step::send_email(id, format!("Subject {id}"), "Body")
    }

    fn replace(steps: Vec<Step>) -> WorkflowSignal {
        WorkflowSignal::with_payload(UPDATE_CADENCE_SIGNAL, &UpdateCadencePayload { steps })
            .unwrap()
    }

    #[test]
    fn test_initial_state() {
        let wf = workflow(vec![email("a")]);
        let state = wf.query();

        assert_eq!(state.status, ExecutionStatus::Running);
        assert_eq!(state.current_step_index, 0);
        assert_eq!(state.steps_version, 1);
        assert_eq!(state.cadence_id, "c-1");
        assert_eq!(state.contact_email, "ada@example.com");
    }

    #[test]
    fn test_send_step_schedules_activity() {
        let mut wf = workflow(vec![email("a")]);
        let actions = wf.on_start();

        match &actions[..] {
            [WorkflowAction::ScheduleActivity {
                activity_id,
                activity_type,
                input,
                options,
            }] => {
                assert_eq!(activity_id, "send-0");
                assert_eq!(activity_type, "send_email");
                assert_eq!(input["to"], "ada@example.com");
                assert_eq!(input["subject"], "Subject a");
                assert_eq!(options.retry_policy.max_attempts, 3);
                assert_eq!(options.retry_policy.initial_interval, Duration::from_secs(1));
                assert_eq!(options.start_to_close_timeout, Duration::from_secs(30));
            }
            other => panic!("unexpected actions: {other:?}"),
        }
    }

    #[test]
    fn test_wait_step_starts_timer() {
        let mut wf = workflow(vec![Step::wait("w", 10)]);
        let actions = wf.on_start();

        assert_eq!(
            actions,
            vec![WorkflowAction::timer("wait-0", Duration::from_secs(10))]
        );
    }

    #[test]
    fn test_steps_run_in_order_then_complete() {
        let mut wf = workflow(vec![email("a"), Step::wait("w", 10), email("b")]);

        wf.on_start();
        let actions = wf.on_activity_completed("send-0", json!({}));
        assert!(matches!(
            &actions[0],
            WorkflowAction::StartTimer { timer_id, .. } if timer_id == "wait-1"
        ));

        let actions = wf.on_timer_fired("wait-1");
        assert!(matches!(
            &actions[0],
            WorkflowAction::ScheduleActivity { activity_id, .. } if activity_id == "send-2"
        ));

        let actions = wf.on_activity_completed("send-2", json!({}));
        assert!(matches!(actions[0], WorkflowAction::CompleteWorkflow { .. }));

        let state = wf.query();
        assert_eq!(state.status, ExecutionStatus::Completed);
        assert_eq!(state.current_step_index, 3);
        assert_eq!(state.steps_version, 1);
        assert_eq!(wf.result(), Some(state));
    }

    #[test]
    fn test_empty_cadence_completes_immediately() {
        let mut wf = workflow(vec![]);
        let actions = wf.on_start();

        assert!(matches!(actions[0], WorkflowAction::CompleteWorkflow { .. }));
        assert_eq!(wf.query().status, ExecutionStatus::Completed);
        assert_eq!(wf.query().current_step_index, 0);
    }

    #[test]
    fn test_exhausted_send_fails_without_advancing() {
        let mut wf = workflow(vec![email("a"), email("b")]);
        wf.on_start();
        wf.on_activity_completed("send-0", json!({}));

        let actions = wf.on_activity_failed("send-1", &ActivityError::retryable("bounced"));
        match &actions[..] {
            [WorkflowAction::FailWorkflow { error }] => {
                assert_eq!(error.code.as_deref(), Some(SEND_FAILED))
            }
            other => panic!("unexpected actions: {other:?}"),
        }

        let state = wf.query();
        assert_eq!(state.status, ExecutionStatus::Failed);
        assert_eq!(state.current_step_index, 1);
        assert!(wf.error().is_some());
        assert!(wf.result().is_none());
    }

    #[test]
    fn test_shrinking_below_cursor_completes() {
        let mut wf = workflow(vec![email("1"), email("2"), email("3")]);
        wf.on_start();
        wf.on_activity_completed("send-0", json!({}));
        wf.on_activity_completed("send-1", json!({}));
        assert_eq!(wf.query().current_step_index, 2);

        let actions = wf.on_signal(&replace(vec![email("1"), email("2")]));
        assert!(actions.is_empty());

        let state = wf.query();
        assert_eq!(state.status, ExecutionStatus::Completed);
        assert_eq!(state.current_step_index, 2);
        assert_eq!(state.steps_version, 2);

        // The interrupted send finishes without moving the cursor
        let actions = wf.on_activity_completed("send-2", json!({}));
        assert!(matches!(actions[0], WorkflowAction::CompleteWorkflow { .. }));
        assert_eq!(wf.query().current_step_index, 2);
    }

    #[test]
    fn test_extending_continues_at_cursor() {
        let mut wf = workflow(vec![email("1"), Step::wait("w", 60)]);
        wf.on_start();
        wf.on_activity_completed("send-0", json!({}));

        wf.on_signal(&replace(vec![
            email("1"),
            email("x"),
            email("y"),
            email("z"),
        ]));
        let state = wf.query();
        assert_eq!(state.status, ExecutionStatus::Running);
        assert_eq!(state.steps_version, 2);

        // The running wait ends, then the replaced list continues at index 2
        let actions = wf.on_timer_fired("wait-1");
        match &actions[..] {
            [WorkflowAction::ScheduleActivity { activity_id, input, .. }] => {
                assert_eq!(activity_id, "send-2");
                assert_eq!(input["subject"], "Subject y");
            }
            other => panic!("unexpected actions: {other:?}"),
        }
    }

    #[test]
    fn test_replacing_with_empty_list_at_start() {
        let mut wf = workflow(vec![Step::wait("w", 60)]);
        wf.on_start();

        wf.on_signal(&replace(vec![]));
        let state = wf.query();
        assert_eq!(state.status, ExecutionStatus::Completed);
        assert_eq!(state.current_step_index, 0);
        assert_eq!(state.steps_version, 2);
        assert!(state.steps.is_empty());
    }

    #[test]
    fn test_each_replacement_bumps_version_once() {
        let mut wf = workflow(vec![Step::wait("w", 60)]);
        wf.on_start();

        for expected in 2..=4 {
            wf.on_signal(&replace(vec![Step::wait("w", 60), email("a")]));
            assert_eq!(wf.query().steps_version, expected);
        }
    }

    #[test]
    fn test_signal_gate() {
        let mut wf = workflow(vec![Step::wait("w", 60)]);
        wf.on_start();

        assert!(wf.accepts_signal(&replace(vec![])).is_ok());
        assert!(matches!(
            wf.accepts_signal(&WorkflowSignal::new("pause", json!({}))),
            Err(SignalRejection::UnknownSignal(_))
        ));
        assert!(matches!(
            wf.accepts_signal(&WorkflowSignal::new(UPDATE_CADENCE_SIGNAL, json!({ "steps": 5 }))),
            Err(SignalRejection::InvalidPayload(_))
        ));

        wf.on_signal(&replace(vec![]));
        assert_eq!(
            wf.accepts_signal(&replace(vec![])),
            Err(SignalRejection::Terminal)
        );
    }

    #[test]
    fn test_accepts_signal_by_wire_name() {
        let mut wf = workflow(vec![Step::wait("w", 60)]);
        wf.on_start();

        let signal = WorkflowSignal::new("updateCadence", json!({ "steps": [] }));
        assert!(wf.accepts_signal(&signal).is_ok());
    }

    #[test]
    fn test_queries_are_stable_without_progress() {
        let mut wf = workflow(vec![Step::wait("w", 60)]);
        wf.on_start();

        assert_eq!(wf.query(), wf.query());
    }
}
