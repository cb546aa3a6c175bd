//! Per-instance runtime
//!
//! Each live workflow instance is owned by one task. Signals reach it through
//! a bounded inbox and are applied between steps or while a step is waiting;
//! readers see its state through a watch channel and never block it.
//!
//! Every effect is recorded before it starts and every outcome is recorded
//! before the workflow sees it, so the log can always be replayed.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::host::{HostError, InstanceSnapshot};
use super::registry::AnyWorkflow;
use super::replay::{enqueue, InFlight, OpenActivity, Replayed, Termination};
use crate::activity::{ActivityContext, ActivityError, ActivityRegistry};
use crate::persistence::{StoreError, WorkflowEventStore, WorkflowStatus};
use crate::reliability::RetryDecision;
use crate::workflow::{
    SignalRejection, WorkflowAction, WorkflowError, WorkflowEvent, WorkflowSignal,
};

/// Requests delivered to a running instance
pub(crate) enum Command {
    Signal {
        signal: WorkflowSignal,
        reply: oneshot::Sender<Result<(), HostError>>,
    },
}

/// Why an instance stopped before terminating
enum Halt {
    /// Host is shutting down; nothing further is recorded
    Shutdown,

    /// The log could not be written
    Store(StoreError),
}

impl From<StoreError> for Halt {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Build the externally visible view of an instance
pub(crate) fn snapshot_of(
    workflow_id: &str,
    workflow_type: &str,
    workflow: &dyn AnyWorkflow,
    termination: Option<&Termination>,
) -> InstanceSnapshot {
    InstanceSnapshot {
        workflow_id: workflow_id.to_string(),
        workflow_type: workflow_type.to_string(),
        status: termination
            .map(|t| t.status)
            .unwrap_or(WorkflowStatus::Running),
        state: workflow.query_json(),
        result: termination.and_then(|t| t.result.clone()),
        error: termination.and_then(|t| t.error.clone()),
    }
}

/// Shared services an instance runs against
pub(crate) struct InstanceServices {
    pub store: Arc<dyn WorkflowEventStore>,
    pub activities: Arc<ActivityRegistry>,
    pub clock: Arc<dyn Clock>,
    pub worker_id: String,
}

pub(crate) struct InstanceRuntime {
    workflow_id: String,
    workflow_type: String,
    workflow: Box<dyn AnyWorkflow>,
    services: InstanceServices,
    sequence: i32,
    queue: VecDeque<WorkflowAction>,
    in_flight: Option<InFlight>,
    termination: Option<Termination>,
    inbox: mpsc::Receiver<Command>,
    snapshot: watch::Sender<InstanceSnapshot>,
    cancel: CancellationToken,
}

impl InstanceRuntime {
    pub fn new(
        workflow_id: String,
        workflow_type: String,
        replayed: Replayed,
        services: InstanceServices,
        inbox: mpsc::Receiver<Command>,
        snapshot: watch::Sender<InstanceSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            workflow_id,
            workflow_type,
            workflow: replayed.workflow,
            services,
            sequence: replayed.sequence,
            queue: replayed.queue,
            in_flight: replayed.in_flight,
            termination: replayed.termination,
            inbox,
            snapshot,
            cancel,
        }
    }

    /// Drive the instance until it terminates, halts or the host shuts down
    pub async fn run(mut self) {
        let outcome = self.drive().await;

        self.inbox.close();
        while let Ok(Command::Signal { reply, .. }) = self.inbox.try_recv() {
            let _ = reply.send(Err(self.unreachable()));
        }

        let workflow_id = &self.workflow_id;
        match outcome {
            Ok(()) => debug!(%workflow_id, "instance finished"),
            Err(Halt::Shutdown) => {
                info!(%workflow_id, sequence = self.sequence, "instance suspended")
            }
            Err(Halt::Store(err)) => {
                error!(%workflow_id, error = %err, "instance halted: event log unavailable")
            }
        }
    }

    fn unreachable(&self) -> HostError {
        if self.termination.is_some() {
            HostError::WorkflowCompleted(self.workflow_id.clone())
        } else {
            HostError::Unavailable(format!("workflow {} is not running", self.workflow_id))
        }
    }

    async fn drive(&mut self) -> Result<(), Halt> {
        match self.in_flight.take() {
            Some(InFlight::Activity(open)) => self.run_activity(open).await?,
            Some(InFlight::Timer { timer_id, fire_at }) => self.run_timer(timer_id, fire_at).await?,
            None => {}
        }

        loop {
            self.drain_inbox().await?;
            if self.termination.is_some() {
                return Ok(());
            }

            match self.queue.pop_front() {
                Some(action) => self.execute(action).await?,
                None => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(Halt::Shutdown),
                        command = self.inbox.recv() => match command {
                            Some(command) => self.handle_command(command).await?,
                            None => return Err(Halt::Shutdown),
                        },
                    }
                }
            }
        }
    }

    /// Await `fut` while still serving signals
    async fn wait_on<F: Future>(&mut self, fut: F) -> Result<F::Output, Halt> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Halt::Shutdown),
                Some(command) = self.inbox.recv() => self.handle_command(command).await?,
                output = &mut fut => return Ok(output),
            }
        }
    }

    async fn drain_inbox(&mut self) -> Result<(), Halt> {
        while let Ok(command) = self.inbox.try_recv() {
            self.handle_command(command).await?;
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) -> Result<(), Halt> {
        let Command::Signal { signal, reply } = command;
        let workflow_id = self.workflow_id.clone();

        if self.termination.is_some() {
            let _ = reply.send(Err(HostError::WorkflowCompleted(workflow_id)));
            return Ok(());
        }

        if let Err(rejection) = self.workflow.accepts_signal(&signal) {
            debug!(%workflow_id, signal_type = %signal.signal_type, %rejection, "signal rejected");
            let err = match rejection {
                SignalRejection::Terminal => HostError::WorkflowCompleted(workflow_id),
                rejection => HostError::InvalidSignal {
                    workflow_id,
                    rejection,
                },
            };
            let _ = reply.send(Err(err));
            return Ok(());
        }

        if let Err(err) = self
            .record(WorkflowEvent::SignalReceived {
                signal: signal.clone(),
            })
            .await
        {
            let _ = reply.send(Err(HostError::Unavailable(format!(
                "could not record signal for {workflow_id}: {err}"
            ))));
            return Err(err.into());
        }

        let actions = self.workflow.on_signal(&signal);
        enqueue(&mut self.queue, actions);
        self.publish();
        info!(%workflow_id, signal_type = %signal.signal_type, "signal applied");

        let _ = reply.send(Ok(()));
        Ok(())
    }

    async fn record(&mut self, event: WorkflowEvent) -> Result<(), StoreError> {
        let kind = event.kind();
        self.sequence = self
            .services
            .store
            .append_events(&self.workflow_id, self.sequence, vec![event])
            .await?;
        debug!(
            workflow_id = %self.workflow_id,
            sequence = self.sequence,
            event = kind,
            "recorded event"
        );
        Ok(())
    }

    fn publish(&self) {
        self.snapshot.send_replace(snapshot_of(
            &self.workflow_id,
            &self.workflow_type,
            self.workflow.as_ref(),
            self.termination.as_ref(),
        ));
    }

    async fn execute(&mut self, action: WorkflowAction) -> Result<(), Halt> {
        match action {
            WorkflowAction::ScheduleActivity {
                activity_id,
                activity_type,
                input,
                options,
            } => {
                debug!(
                    workflow_id = %self.workflow_id,
                    %activity_id,
                    %activity_type,
                    "scheduling activity"
                );
                self.record(WorkflowEvent::ActivityScheduled {
                    activity_id: activity_id.clone(),
                    activity_type: activity_type.clone(),
                    input: input.clone(),
                    options: options.clone(),
                })
                .await?;
                self.run_activity(OpenActivity::new(activity_id, activity_type, input, options))
                    .await
            }

            WorkflowAction::StartTimer { timer_id, duration } => {
                let fire_at = self.services.clock.deadline_after(duration);
                debug!(
                    workflow_id = %self.workflow_id,
                    %timer_id,
                    ?duration,
                    %fire_at,
                    "starting timer"
                );
                self.record(WorkflowEvent::TimerStarted {
                    timer_id: timer_id.clone(),
                    duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    fire_at,
                })
                .await?;
                self.run_timer(timer_id, fire_at).await
            }

            WorkflowAction::CompleteWorkflow { result } => {
                info!(workflow_id = %self.workflow_id, "completing workflow");
                self.terminate(WorkflowStatus::Completed, Some(result), None)
                    .await
            }

            WorkflowAction::FailWorkflow { error } => {
                error!(workflow_id = %self.workflow_id, error = %error, "failing workflow");
                self.terminate(WorkflowStatus::Failed, None, Some(error))
                    .await
            }

            WorkflowAction::None => Ok(()),
        }
    }

    async fn run_activity(&mut self, mut open: OpenActivity) -> Result<(), Halt> {
        let policy = open.options.retry_policy.clone();
        let timeout = open.options.start_to_close_timeout;

        loop {
            if let Some(not_before) = open.not_before.take() {
                let backoff = self.services.clock.remaining_until(not_before);
                self.wait_on(tokio::time::sleep(backoff)).await?;
            }

            let attempt = open.next_attempt;
            let ctx = ActivityContext::new(
                &self.workflow_id,
                &open.activity_id,
                attempt,
                policy.max_attempts,
            )
            .with_cancellation(self.cancel.child_token());

            if open.redispatch {
                info!(
                    workflow_id = %self.workflow_id,
                    activity_id = %open.activity_id,
                    attempt,
                    idempotency_key = %ctx.idempotency_key,
                    "re-dispatching interrupted attempt"
                );
                open.redispatch = false;
            }

            self.record(WorkflowEvent::ActivityStarted {
                activity_id: open.activity_id.clone(),
                attempt,
                idempotency_key: ctx.idempotency_key.clone(),
                worker_id: self.services.worker_id.clone(),
            })
            .await?;

            let activities = Arc::clone(&self.services.activities);
            let activity_type = open.activity_type.clone();
            let input = open.input.clone();
            let outcome = self
                .wait_on(async move {
                    match tokio::time::timeout(
                        timeout,
                        activities.execute(&activity_type, &ctx, input),
                    )
                    .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ActivityError::timed_out(timeout)),
                    }
                })
                .await?;

            self.drain_inbox().await?;

            let error = match outcome {
                Ok(result) => {
                    self.record(WorkflowEvent::ActivityCompleted {
                        activity_id: open.activity_id.clone(),
                        result: result.clone(),
                    })
                    .await?;
                    let actions = self.workflow.on_activity_completed(&open.activity_id, result);
                    enqueue(&mut self.queue, actions);
                    self.publish();
                    return Ok(());
                }
                Err(error) => error,
            };

            match policy.decide(attempt, &error) {
                RetryDecision::Retry {
                    next_attempt,
                    delay,
                } => {
                    let retry_at = self.services.clock.deadline_after(delay);
                    warn!(
                        workflow_id = %self.workflow_id,
                        activity_id = %open.activity_id,
                        attempt,
                        error = %error,
                        ?delay,
                        "activity attempt failed, will retry"
                    );
                    self.record(WorkflowEvent::ActivityFailed {
                        activity_id: open.activity_id.clone(),
                        attempt,
                        error,
                        will_retry: true,
                        retry_at: Some(retry_at),
                    })
                    .await?;
                    open.next_attempt = next_attempt;
                    open.not_before = Some(retry_at);
                }
                RetryDecision::GiveUp => {
                    error!(
                        workflow_id = %self.workflow_id,
                        activity_id = %open.activity_id,
                        attempt,
                        error = %error,
                        "activity failed permanently"
                    );
                    self.record(WorkflowEvent::ActivityFailed {
                        activity_id: open.activity_id.clone(),
                        attempt,
                        error: error.clone(),
                        will_retry: false,
                        retry_at: None,
                    })
                    .await?;
                    let actions = self.workflow.on_activity_failed(&open.activity_id, &error);
                    enqueue(&mut self.queue, actions);
                    self.publish();
                    return Ok(());
                }
            }
        }
    }

    async fn run_timer(&mut self, timer_id: String, fire_at: DateTime<Utc>) -> Result<(), Halt> {
        let remaining = self.services.clock.remaining_until(fire_at);
        debug!(workflow_id = %self.workflow_id, %timer_id, ?remaining, "waiting on timer");
        self.wait_on(tokio::time::sleep(remaining)).await?;
        self.drain_inbox().await?;

        self.record(WorkflowEvent::TimerFired {
            timer_id: timer_id.clone(),
        })
        .await?;
        let actions = self.workflow.on_timer_fired(&timer_id);
        enqueue(&mut self.queue, actions);
        self.publish();
        Ok(())
    }

    async fn terminate(
        &mut self,
        status: WorkflowStatus,
        result: Option<Value>,
        error: Option<WorkflowError>,
    ) -> Result<(), Halt> {
        let event = match (&result, &error) {
            (_, Some(error)) => WorkflowEvent::WorkflowFailed {
                error: error.clone(),
            },
            (result, None) => WorkflowEvent::WorkflowCompleted {
                result: result.clone().unwrap_or(Value::Null),
            },
        };
        self.record(event).await?;
        self.services
            .store
            .update_workflow_status(&self.workflow_id, status, result.clone(), error.clone())
            .await?;

        self.queue.clear();
        self.termination = Some(Termination {
            status,
            result,
            error,
        });
        self.publish();
        Ok(())
    }
}
