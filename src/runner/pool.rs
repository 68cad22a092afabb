//! # TaskRunner: spawns one actor per task and collects their reports.
//!
//! ```text
//! TaskRunner::run(token, on_task_done)
//!   ├─► build_semaphore() from max_concurrent (None = unlimited)
//!   ├─► run token = token.child_token()  (cancelled when run returns)
//!   ├─► loop
//!   │     ├─► join_next() ──► on_task_done(report)            (completion order)
//!   │     └─► first permit for TaskSeed[i] ──► TaskActor ──► JoinSet::spawn
//!   │                                                          (insertion order)
//!   └─► publish RunComplete, return RunSummary
//! ```
//!
//! A panicking step is caught at the actor boundary and reported as a
//! permanent failure of that task; other tasks are unaffected.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tokio::{
    select,
    sync::{OwnedSemaphorePermit, Semaphore},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::StepError,
    events::{Bus, Event, EventKind},
    policies::BackoffPolicy,
    runner::{
        actor::TaskActor,
        progress::RunProgress,
        spec::StepSpec,
        step::Payload,
        task::{TaskReport, TaskSeed, TaskState},
    },
};

/// Tally of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks submitted.
    pub total: usize,
    /// Tasks whose steps all resolved.
    pub completed: usize,
    /// Tasks that exhausted a step's attempt budget.
    pub failed: usize,
    /// Tasks interrupted by shutdown.
    pub canceled: usize,
}

/// Bounded-concurrency executor of ordered steps over a set of tasks.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use deploy_registry::{Bus, StepError, StepFn, StepOutcome, StepSpec, TaskInput, TaskRunner, TaskSeed};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let square = StepFn::arc("square", |input: TaskInput<i64>, _ctx: CancellationToken| async move {
///     let n = input.created().unwrap_or_default();
///     Ok::<_, StepError>(StepOutcome::Resolved(n * n))
/// });
///
/// let runner = TaskRunner::new(
///     Bus::new(64),
///     2,
///     vec![StepSpec::new(square, Some(Duration::from_secs(1)), 3)],
///     vec![TaskSeed::new("a", Some(3)), TaskSeed::new("b", Some(4))],
/// );
///
/// let mut squares = Vec::new();
/// let summary = runner
///     .run(&CancellationToken::new(), |report| {
///         squares.push(report.final_outcome().and_then(|o| o.value()).copied());
///         async {}
///     })
///     .await;
///
/// assert_eq!(summary.completed, 2);
/// squares.sort();
/// assert_eq!(squares, vec![Some(9), Some(16)]);
/// # }
/// ```
pub struct TaskRunner<T: Payload> {
    bus: Bus,
    max_concurrent: usize,
    steps: Arc<[StepSpec<T>]>,
    tasks: Vec<TaskSeed>,
    retry: BackoffPolicy,
    progress: Arc<RunProgress>,
}

impl<T: Payload> TaskRunner<T> {
    /// Configures a run.
    ///
    /// - `max_concurrent`: step attempts in flight at once (`0` = unlimited)
    /// - `steps`: executed in this order for every task
    /// - `tasks`: queued in this order
    pub fn new(
        bus: Bus,
        max_concurrent: usize,
        steps: Vec<StepSpec<T>>,
        tasks: Vec<TaskSeed>,
    ) -> Self {
        let progress = Arc::new(RunProgress::new(tasks.len()));
        Self {
            bus,
            max_concurrent,
            steps: steps.into(),
            tasks,
            retry: BackoffPolicy::immediate(),
            progress,
        }
    }

    /// Sets the delay policy between attempts of the same step.
    pub fn with_retry_backoff(mut self, retry: BackoffPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Live counters of this run.
    pub fn progress(&self) -> Arc<RunProgress> {
        Arc::clone(&self.progress)
    }

    /// Runs every task to a terminal state.
    ///
    /// Tasks get their first attempt in insertion order. `on_task_done` is awaited for each report, in completion order, while
    /// the remaining tasks keep running. Cancelling `token` cancels every
    /// in-flight attempt; the affected tasks report [`TaskState::Canceled`].
    pub async fn run<F, Fut>(
        mut self,
        token: &CancellationToken,
        mut on_task_done: F,
    ) -> RunSummary
    where
        F: FnMut(TaskReport<T>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let run_token = token.child_token();
        let _release = run_token.clone().drop_guard();
        let semaphore = self.build_semaphore();

        let mut summary = RunSummary {
            total: self.tasks.len(),
            ..RunSummary::default()
        };

        let mut queue = std::mem::take(&mut self.tasks).into_iter();
        let mut next = queue.next();
        let mut set: JoinSet<TaskReport<T>> = JoinSet::new();
        loop {
            select! {
                biased;
                joined = set.join_next(), if !set.is_empty() => {
                    let Some(Ok(report)) = joined else { continue };
                    match report.state {
                        TaskState::Completed(_) => summary.completed += 1,
                        TaskState::Failed { .. } => summary.failed += 1,
                        TaskState::Canceled => summary.canceled += 1,
                    }
                    on_task_done(report).await;
                }
                permit = first_permit(semaphore.as_ref(), &run_token), if next.is_some() => {
                    if let Some(seed) = next.take() {
                        self.spawn_actor(&mut set, seed, permit, &semaphore, &run_token);
                    }
                    next = queue.next();
                }
                else => break,
            }
        }

        self.bus.publish(Event::new(EventKind::RunComplete).with_reason(format!(
            "{} tasks, {} completed, {} failed, {} canceled",
            summary.total, summary.completed, summary.failed, summary.canceled
        )));
        summary
    }

    fn spawn_actor(
        &self,
        set: &mut JoinSet<TaskReport<T>>,
        seed: TaskSeed,
        permit: Option<OwnedSemaphorePermit>,
        semaphore: &Option<Arc<Semaphore>>,
        run_token: &CancellationToken,
    ) {
        let actor = TaskActor {
            seed: seed.clone(),
            steps: Arc::clone(&self.steps),
            retry: self.retry,
            bus: self.bus.clone(),
            semaphore: semaphore.clone(),
            progress: Arc::clone(&self.progress),
        };
        let actor_token = run_token.clone();
        let bus = self.bus.clone();
        let progress = Arc::clone(&self.progress);
        set.spawn(async move {
            match std::panic::AssertUnwindSafe(actor.run(actor_token, permit))
                .catch_unwind()
                .await
            {
                Ok(report) => report,
                Err(_panic) => {
                    progress.task_finished(true);
                    panicked_report(seed, &bus)
                }
            }
        });
    }

    fn build_semaphore(&self) -> Option<Arc<Semaphore>> {
        match self.max_concurrent {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        }
    }
}

/// Permit for the next queued task's first attempt.
///
/// `None` when unlimited, or once the run is cancelled: the actor then sees
/// the cancellation before doing any work.
async fn first_permit(
    semaphore: Option<&Arc<Semaphore>>,
    token: &CancellationToken,
) -> Option<OwnedSemaphorePermit> {
    let semaphore = semaphore?;
    select! {
        permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
        _ = token.cancelled() => None,
    }
}

fn panicked_report<T>(seed: TaskSeed, bus: &Bus) -> TaskReport<T> {
    let error = StepError::fail("step panicked");
    bus.publish(
        Event::new(EventKind::StepExhausted)
            .with_task(seed.key.clone())
            .with_reason(error.to_string()),
    );
    bus.publish(Event::new(EventKind::TaskDone).with_task(seed.key.clone()));
    TaskReport {
        key: seed.key,
        steps: Vec::new(),
        state: TaskState::Failed {
            step: Arc::from("unknown"),
            error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{StepFn, StepOutcome, StepRef, StepStatus, TaskInput};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    fn seeds(n: usize) -> Vec<TaskSeed> {
        (0..n).map(|i| TaskSeed::new(format!("t{i}"), Some(0))).collect()
    }

    async fn collect<T: Payload>(runner: TaskRunner<T>) -> (RunSummary, Vec<TaskReport<T>>) {
        let mut reports = Vec::new();
        let summary = runner
            .run(&CancellationToken::new(), |r| {
                reports.push(r);
                async {}
            })
            .await;
        (summary, reports)
    }

    #[tokio::test(start_paused = true)]
    async fn always_rejecting_step_is_attempted_max_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let flaky = StepFn::arc("flaky", move |_i: TaskInput<()>, _ctx: CancellationToken| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<StepOutcome<()>, _>(StepError::fail("nope"))
            }
        });

        let bus = Bus::new(256);
        let mut rx = bus.subscribe();
        let runner = TaskRunner::new(
            bus,
            20,
            vec![StepSpec::new(flaky, Some(Duration::from_secs(1)), 3)],
            seeds(1),
        );
        let (summary, reports) = collect(runner).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(reports[0].attempts("flaky"), 3);
        assert_eq!(reports[0].steps[0].status, StepStatus::Failed);

        let mut exhausted = 0;
        let mut retries = 0;
        while let Ok(ev) = rx.try_recv() {
            match ev.kind {
                EventKind::StepExhausted => {
                    exhausted += 1;
                    assert_eq!(ev.task.as_deref(), Some("t0"));
                    assert_eq!(ev.attempt, Some(3));
                }
                EventKind::RetryScheduled => retries += 1,
                _ => {}
            }
        }
        assert_eq!(exhausted, 1);
        assert_eq!(retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timing_out_step_cancels_each_attempt() {
        let cancellations = Arc::new(AtomicU32::new(0));
        let c = cancellations.clone();
        let stuck = StepFn::arc("stuck", move |_i: TaskInput<()>, ctx: CancellationToken| {
            let c = c.clone();
            async move {
                tokio::spawn(async move {
                    ctx.cancelled().await;
                    c.fetch_add(1, Ordering::SeqCst);
                });
                std::future::pending::<Result<StepOutcome<()>, StepError>>().await
            }
        });

        let runner = TaskRunner::new(
            Bus::new(256),
            20,
            vec![StepSpec::new(stuck, Some(Duration::from_secs(5)), 3)],
            seeds(1),
        );
        let (summary, reports) = collect(runner).await;
        // let the watcher tasks observe the last cancellation
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(reports[0].attempts("stuck"), 3);
        assert_eq!(reports[0].steps[0].status, StepStatus::TimedOut);
        assert!(matches!(
            reports[0].state,
            TaskState::Failed { error: StepError::Timeout { .. }, .. }
        ));
        assert_eq!(cancellations.load(Ordering::SeqCst), 3);
    }

    fn tracked_step(
        name: &'static str,
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    ) -> StepRef<()> {
        StepFn::arc(name, move |_i: TaskInput<()>, _ctx: CancellationToken| {
            let (current, peak) = (current.clone(), peak.clone());
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, StepError>(StepOutcome::<()>::Skipped)
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_concurrency_limit() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let runner = TaskRunner::new(
            Bus::new(1024),
            20,
            vec![
                StepSpec::new(
                    tracked_step("resolve", current.clone(), peak.clone()),
                    Some(Duration::from_secs(1)),
                    1,
                ),
                StepSpec::new(
                    tracked_step("fetch", current.clone(), peak.clone()),
                    Some(Duration::from_secs(1)),
                    1,
                ),
            ],
            seeds(50),
        );
        let progress = runner.progress();
        let (summary, _) = collect(runner).await;

        assert_eq!(summary.completed, 50);
        assert_eq!(peak.load(Ordering::SeqCst), 20);
        assert!(progress.peak_in_flight() <= 20);
        assert_eq!(progress.done(), 50);
        assert_eq!(progress.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn tasks_start_in_insertion_order() {
        for _ in 0..20 {
            let started = Arc::new(std::sync::Mutex::new(Vec::new()));
            let s = started.clone();
            let record = StepFn::arc("record", move |i: TaskInput<()>, _ctx: CancellationToken| {
                let s = s.clone();
                async move {
                    s.lock().unwrap().push(i.key().to_string());
                    tokio::task::yield_now().await;
                    Ok::<_, StepError>(StepOutcome::<()>::Skipped)
                }
            });

            let runner = TaskRunner::new(
                Bus::new(256),
                1,
                vec![StepSpec::new(record, Some(Duration::from_secs(5)), 1)],
                seeds(10),
            );
            let (summary, _) = collect(runner).await;

            assert_eq!(summary.completed, 10);
            let expected: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
            assert_eq!(*started.lock().unwrap(), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn steps_run_in_order_and_see_earlier_outcomes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l1 = log.clone();
        let first = StepFn::arc("first", move |i: TaskInput<String>, _ctx: CancellationToken| {
            let l1 = l1.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                l1.lock().await.push(format!("first:{}", i.key()));
                if i.key() == "t0" {
                    Ok::<_, StepError>(StepOutcome::Resolved("sha".to_string()))
                } else {
                    Ok(StepOutcome::Skipped)
                }
            }
        });
        let l2 = log.clone();
        let second = StepFn::arc("second", move |i: TaskInput<String>, _ctx: CancellationToken| {
            let l2 = l2.clone();
            async move {
                l2.lock().await.push(format!("second:{}", i.key()));
                Ok::<_, StepError>(match i.outcome("first") {
                    Some(StepOutcome::Resolved(sha)) => StepOutcome::Resolved(format!("{sha}!")),
                    _ => StepOutcome::Skipped,
                })
            }
        });

        let runner = TaskRunner::new(
            Bus::new(256),
            1,
            vec![
                StepSpec::new(first, None, 1),
                StepSpec::new(second, None, 1),
            ],
            seeds(2),
        );
        let (_, reports) = collect(runner).await;

        let log = log.lock().await.clone();
        for key in ["t0", "t1"] {
            let a = log.iter().position(|l| l == &format!("first:{key}")).unwrap();
            let b = log.iter().position(|l| l == &format!("second:{key}")).unwrap();
            assert!(a < b);
        }

        let t0 = reports.iter().find(|r| r.key.as_ref() == "t0").unwrap();
        assert_eq!(
            t0.final_outcome(),
            Some(&StepOutcome::Resolved("sha!".to_string()))
        );
        let t1 = reports.iter().find(|r| r.key.as_ref() == "t1").unwrap();
        assert!(matches!(t1.state, TaskState::Completed(_)));
        assert_eq!(t1.final_outcome(), Some(&StepOutcome::Skipped));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_in_flight_attempts() {
        let cancellations = Arc::new(AtomicU32::new(0));
        let c = cancellations.clone();
        let stuck = StepFn::arc("stuck", move |_i: TaskInput<()>, ctx: CancellationToken| {
            let c = c.clone();
            async move {
                tokio::spawn(async move {
                    ctx.cancelled().await;
                    c.fetch_add(1, Ordering::SeqCst);
                });
                std::future::pending::<Result<StepOutcome<()>, StepError>>().await
            }
        });

        let runner = TaskRunner::new(
            Bus::new(256),
            2,
            vec![StepSpec::new(stuck, None, 5)],
            seeds(4),
        );
        let token = CancellationToken::new();
        let stopper = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stopper.cancel();
        });

        let summary = runner.run(&token, |_r| async {}).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(summary.canceled, 4);
        assert_eq!(cancellations.load(Ordering::SeqCst), 2);
    }
}
