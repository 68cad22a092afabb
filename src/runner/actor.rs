//! # TaskActor: drives one task through every step.
//!
//! For each step, in order, the actor makes attempts until the step resolves
//! or its attempt budget is spent:
//!
//! ```text
//! loop {
//!   ├─► acquire semaphore (cancellable; the first permit comes from the runner)
//!   ├─► publish StepStarting
//!   ├─► run_attempt() ──► step.run()
//!   ├─► release semaphore
//!   ├─► Ok      → record outcome, break to next step
//!   └─► Err     → attempts < max ? RetryScheduled + wait : StepExhausted, stop
//! }
//! publish TaskDone
//! ```
//!
//! ## Rules
//! - Attempts of one task run **sequentially** (never parallel)
//! - The attempt counter is per step and 1-based
//! - Cancellation is checked at safe points (semaphore, retry wait) and raced
//!   against every attempt

use std::{sync::Arc, time::Duration};

use tokio::{
    select,
    sync::{OwnedSemaphorePermit, Semaphore},
    time,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::StepError,
    events::{Bus, Event, EventKind},
    policies::BackoffPolicy,
    runner::{
        attempt::run_attempt,
        progress::RunProgress,
        spec::StepSpec,
        step::{Payload, StepOutcome},
        task::{StepRecord, StepStatus, TaskInput, TaskReport, TaskSeed, TaskState},
    },
};

/// Runs one task through the pipeline.
pub(crate) struct TaskActor<T: Payload> {
    pub seed: TaskSeed,
    pub steps: Arc<[StepSpec<T>]>,
    pub retry: BackoffPolicy,
    pub bus: Bus,
    pub semaphore: Option<Arc<Semaphore>>,
    pub progress: Arc<RunProgress>,
}

impl<T: Payload> TaskActor<T> {
    /// Runs the task to a terminal state and reports it.
    ///
    /// `first` is the permit the runner acquired for this task's first
    /// attempt; later attempts acquire their own.
    pub async fn run(
        self,
        token: CancellationToken,
        first: Option<OwnedSemaphorePermit>,
    ) -> TaskReport<T> {
        let mut records: Vec<StepRecord> = self
            .steps
            .iter()
            .map(|s| StepRecord {
                name: Arc::from(s.name()),
                status: StepStatus::Pending,
                attempts: 0,
            })
            .collect();
        let mut input = TaskInput::new(self.seed.clone());

        let mut held = first;
        let mut state = None;
        for (idx, spec) in self.steps.iter().enumerate() {
            match self
                .run_step(spec, &input, &mut records[idx], &mut held, &token)
                .await
            {
                Ok(outcome) => input.push(records[idx].name.clone(), outcome),
                Err(StepError::Canceled) => {
                    state = Some(TaskState::Canceled);
                    break;
                }
                Err(error) => {
                    self.bus.publish(
                        Event::new(EventKind::StepExhausted)
                            .with_task(self.seed.key.clone())
                            .with_step(spec.name())
                            .with_attempt(records[idx].attempts)
                            .with_api_path_opt(error.api_path())
                            .with_reason(error.to_string()),
                    );
                    state = Some(TaskState::Failed {
                        step: records[idx].name.clone(),
                        error,
                    });
                    break;
                }
            }
        }
        let state = state.unwrap_or(TaskState::Completed(input));

        self.progress
            .task_finished(matches!(state, TaskState::Failed { .. }));
        self.bus
            .publish(Event::new(EventKind::TaskDone).with_task(self.seed.key.clone()));

        TaskReport {
            key: self.seed.key,
            steps: records,
            state,
        }
    }

    /// Attempts `spec` until it resolves, exhausts its budget, or the run stops.
    ///
    /// Returns the last error when the budget is exhausted.
    async fn run_step(
        &self,
        spec: &StepSpec<T>,
        input: &TaskInput<T>,
        record: &mut StepRecord,
        held: &mut Option<OwnedSemaphorePermit>,
        token: &CancellationToken,
    ) -> Result<StepOutcome<T>, StepError> {
        loop {
            if token.is_cancelled() {
                return Err(StepError::Canceled);
            }
            let permit = match (held.take(), &self.semaphore) {
                (Some(permit), _) => Some(permit),
                (None, Some(sem)) => {
                    let acquire = sem.clone().acquire_owned();
                    select! {
                        res = acquire => match res {
                            Ok(permit) => Some(permit),
                            Err(_closed) => return Err(StepError::Canceled),
                        },
                        _ = token.cancelled() => return Err(StepError::Canceled),
                    }
                }
                (None, None) => None,
            };

            record.attempts += 1;
            record.status = StepStatus::Running;
            self.bus.publish(
                Event::new(EventKind::StepStarting)
                    .with_task(input.seed().key.clone())
                    .with_step(spec.name())
                    .with_attempt(record.attempts),
            );

            self.progress.attempt_started();
            let res = run_attempt(spec, input, token, record.attempts, &self.bus).await;
            self.progress.attempt_finished();
            drop(permit);

            let err = match res {
                Ok(outcome) => {
                    record.status = StepStatus::Succeeded;
                    return Ok(outcome);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            record.status = match err {
                StepError::Timeout { .. } => StepStatus::TimedOut,
                _ => StepStatus::Failed,
            };
            if record.attempts >= spec.max_attempts() {
                return Err(err);
            }

            let delay = self.retry.next(record.attempts - 1);
            self.bus.publish(
                Event::new(EventKind::RetryScheduled)
                    .with_task(input.seed().key.clone())
                    .with_step(spec.name())
                    .with_attempt(record.attempts)
                    .with_delay(delay)
                    .with_reason(err.to_string()),
            );
            self.wait_before_retry(delay, token).await?;
        }
    }

    /// Zero delay yields to the scheduler; anything else sleeps, cancellably.
    async fn wait_before_retry(
        &self,
        delay: Duration,
        token: &CancellationToken,
    ) -> Result<(), StepError> {
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return Ok(());
        }
        select! {
            _ = time::sleep(delay) => Ok(()),
            _ = token.cancelled() => Err(StepError::Canceled),
        }
    }
}
