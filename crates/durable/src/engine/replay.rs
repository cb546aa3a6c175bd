//! Event replay
//!
//! Rebuilds a workflow from its event log by feeding every recorded event
//! back into the workflow handlers, and works out what was still pending
//! when the log stopped: the action that was in flight, and the actions the
//! workflow had requested but the host had not yet recorded.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::registry::{AnyWorkflow, RegistryError, WorkflowRegistry};
use crate::persistence::WorkflowStatus;
use crate::workflow::{ActivityOptions, WorkflowAction, WorkflowError, WorkflowEvent};

/// Errors raised while rebuilding a workflow
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Registry could not build the workflow
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The log records a step the workflow did not ask for
    #[error(
        "non-deterministic replay of {workflow_id} at event {sequence}: \
         recorded {recorded}, workflow requested {requested}"
    )]
    Nondeterminism {
        workflow_id: String,
        sequence: i32,
        recorded: String,
        requested: String,
    },

    /// An outcome event refers to nothing in flight
    #[error("unexpected {event} at event {sequence} of {workflow_id}")]
    UnexpectedEvent {
        workflow_id: String,
        sequence: i32,
        event: &'static str,
    },
}

/// An activity whose final outcome is not yet recorded
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OpenActivity {
    pub activity_id: String,
    pub activity_type: String,
    pub input: Value,
    pub options: ActivityOptions,

    /// Attempt to run next
    pub next_attempt: u32,

    /// That attempt was already dispatched once
    pub redispatch: bool,

    /// Backoff deadline before the next attempt
    pub not_before: Option<DateTime<Utc>>,
}

impl OpenActivity {
    pub fn new(
        activity_id: String,
        activity_type: String,
        input: Value,
        options: ActivityOptions,
    ) -> Self {
        Self {
            activity_id,
            activity_type,
            input,
            options,
            next_attempt: 1,
            redispatch: false,
            not_before: None,
        }
    }
}

/// Work that had been recorded as started but not finished
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InFlight {
    Activity(OpenActivity),
    Timer {
        timer_id: String,
        fire_at: DateTime<Utc>,
    },
}

/// How a workflow ended, as recorded
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Termination {
    pub status: WorkflowStatus,
    pub result: Option<Value>,
    pub error: Option<WorkflowError>,
}

/// A workflow rebuilt from its log
pub(crate) struct Replayed {
    pub workflow: Box<dyn AnyWorkflow>,

    /// Number of events consumed; the next append expects this sequence
    pub sequence: i32,

    pub in_flight: Option<InFlight>,

    /// Requested actions not yet recorded, in request order
    pub queue: VecDeque<WorkflowAction>,

    pub termination: Option<Termination>,
}

/// Queue the actions a handler returned, dropping no-ops
pub(crate) fn enqueue(queue: &mut VecDeque<WorkflowAction>, actions: Vec<WorkflowAction>) {
    queue.extend(
        actions
            .into_iter()
            .filter(|action| !matches!(action, WorkflowAction::None)),
    );
}

fn describe(action: Option<&WorkflowAction>) -> String {
    match action {
        Some(WorkflowAction::ScheduleActivity { activity_id, .. }) => {
            format!("activity {activity_id}")
        }
        Some(WorkflowAction::StartTimer { timer_id, .. }) => format!("timer {timer_id}"),
        Some(WorkflowAction::CompleteWorkflow { .. }) => "completion".to_string(),
        Some(WorkflowAction::FailWorkflow { .. }) => "failure".to_string(),
        Some(WorkflowAction::None) => "nothing".to_string(),
        None => "no further action".to_string(),
    }
}

struct Replayer<'a> {
    workflow_id: &'a str,
    workflow: Box<dyn AnyWorkflow>,
    sequence: i32,
    in_flight: Option<InFlight>,
    queue: VecDeque<WorkflowAction>,
    termination: Option<Termination>,
}

impl Replayer<'_> {
    fn nondeterminism(&self, recorded: String) -> ReplayError {
        ReplayError::Nondeterminism {
            workflow_id: self.workflow_id.to_string(),
            sequence: self.sequence,
            recorded,
            requested: describe(self.queue.front()),
        }
    }

    fn unexpected(&self, event: &WorkflowEvent) -> ReplayError {
        ReplayError::UnexpectedEvent {
            workflow_id: self.workflow_id.to_string(),
            sequence: self.sequence,
            event: event.kind(),
        }
    }

    fn open_activity(&mut self, activity_id: &str) -> Option<&mut OpenActivity> {
        match &mut self.in_flight {
            Some(InFlight::Activity(open)) if open.activity_id == activity_id => Some(open),
            _ => None,
        }
    }

    fn apply(&mut self, event: WorkflowEvent) -> Result<(), ReplayError> {
        match event {
            WorkflowEvent::WorkflowStarted { .. } => {
                let actions = self.workflow.on_start();
                enqueue(&mut self.queue, actions);
            }

            WorkflowEvent::ActivityScheduled {
                activity_id,
                activity_type,
                input,
                options,
            } => {
                match self.queue.front() {
                    Some(WorkflowAction::ScheduleActivity {
                        activity_id: requested,
                        ..
                    }) if *requested == activity_id => {}
                    _ => return Err(self.nondeterminism(format!("activity {activity_id}"))),
                }
                self.queue.pop_front();
                self.in_flight = Some(InFlight::Activity(OpenActivity::new(
                    activity_id,
                    activity_type,
                    input,
                    options,
                )));
            }

            WorkflowEvent::ActivityStarted {
                ref activity_id,
                attempt,
                ..
            } => {
                if self.open_activity(activity_id).is_none() {
                    return Err(self.unexpected(&event));
                }
                if let Some(open) = self.open_activity(activity_id) {
                    open.next_attempt = attempt;
                    open.redispatch = true;
                    open.not_before = None;
                }
            }

            WorkflowEvent::ActivityFailed {
                ref activity_id,
                attempt,
                ref error,
                will_retry,
                retry_at,
            } => {
                if self.open_activity(activity_id).is_none() {
                    return Err(self.unexpected(&event));
                }
                if will_retry {
                    if let Some(open) = self.open_activity(activity_id) {
                        open.next_attempt = attempt + 1;
                        open.redispatch = false;
                        open.not_before = retry_at;
                    }
                } else {
                    self.in_flight = None;
                    let actions = self.workflow.on_activity_failed(activity_id, error);
                    enqueue(&mut self.queue, actions);
                }
            }

            WorkflowEvent::ActivityCompleted {
                ref activity_id,
                ref result,
            } => {
                if self.open_activity(activity_id).is_none() {
                    return Err(self.unexpected(&event));
                }
                self.in_flight = None;
                let actions = self
                    .workflow
                    .on_activity_completed(activity_id, result.clone());
                enqueue(&mut self.queue, actions);
            }

            WorkflowEvent::TimerStarted {
                timer_id, fire_at, ..
            } => {
                match self.queue.front() {
                    Some(WorkflowAction::StartTimer {
                        timer_id: requested,
                        ..
                    }) if *requested == timer_id => {}
                    _ => return Err(self.nondeterminism(format!("timer {timer_id}"))),
                }
                self.queue.pop_front();
                self.in_flight = Some(InFlight::Timer { timer_id, fire_at });
            }

            WorkflowEvent::TimerFired { ref timer_id } => {
                match &self.in_flight {
                    Some(InFlight::Timer {
                        timer_id: open, ..
                    }) if open == timer_id => {}
                    _ => return Err(self.unexpected(&event)),
                }
                self.in_flight = None;
                let actions = self.workflow.on_timer_fired(timer_id);
                enqueue(&mut self.queue, actions);
            }

            WorkflowEvent::SignalReceived { signal } => {
                let actions = self.workflow.on_signal(&signal);
                enqueue(&mut self.queue, actions);
            }

            WorkflowEvent::WorkflowCompleted { result } => {
                if !matches!(
                    self.queue.front(),
                    Some(WorkflowAction::CompleteWorkflow { .. })
                ) {
                    return Err(self.nondeterminism("completion".to_string()));
                }
                self.queue.clear();
                self.termination = Some(Termination {
                    status: WorkflowStatus::Completed,
                    result: Some(result),
                    error: None,
                });
            }

            WorkflowEvent::WorkflowFailed { error } => {
                if !matches!(
                    self.queue.front(),
                    Some(WorkflowAction::FailWorkflow { .. })
                ) {
                    return Err(self.nondeterminism("failure".to_string()));
                }
                self.queue.clear();
                self.termination = Some(Termination {
                    status: WorkflowStatus::Failed,
                    result: None,
                    error: Some(error),
                });
            }

            WorkflowEvent::WorkflowCancelled { reason } => {
                self.queue.clear();
                self.in_flight = None;
                self.termination = Some(Termination {
                    status: WorkflowStatus::Cancelled,
                    result: None,
                    error: Some(WorkflowError::new(reason).with_code("CANCELLED")),
                });
            }
        }
        Ok(())
    }
}

/// Rebuild a workflow from its recorded events
pub(crate) fn replay(
    registry: &WorkflowRegistry,
    workflow_id: &str,
    workflow_type: &str,
    input: Value,
    events: Vec<(i32, WorkflowEvent)>,
) -> Result<Replayed, ReplayError> {
    let mut replayer = Replayer {
        workflow_id,
        workflow: registry.create(workflow_type, input)?,
        sequence: 0,
        in_flight: None,
        queue: VecDeque::new(),
        termination: None,
    };

    for (_, event) in events {
        if replayer.termination.is_some() {
            break;
        }
        replayer.apply(event)?;
        replayer.sequence += 1;
    }

    Ok(Replayed {
        workflow: replayer.workflow,
        sequence: replayer.sequence,
        in_flight: replayer.in_flight,
        queue: replayer.queue,
        termination: replayer.termination,
    })
}
