//! Bounded-concurrency runner for per-key step pipelines.
//!
//! A [`TaskRunner`] takes an ordered list of [`StepSpec`]s and a list of
//! [`TaskSeed`]s, and runs every task through every step, in order, with at
//! most `max_concurrent` step attempts in flight at once.
//!
//! ## Lifecycle
//! ```text
//! TaskSeed ──► TaskRunner::run() ──► JoinSet ──► TaskActor::run()   (one per task)
//!
//! for step in steps {
//!   loop {
//!     ├─► acquire semaphore permit (FIFO, cancellable)
//!     ├─► attempt += 1, publish StepStarting
//!     ├─► run_attempt(step, input, timeout)
//!     │       ├─ Ok(outcome)  ─► record outcome, next step
//!     │       ├─ Err(Canceled) ─► task canceled, exit
//!     │       └─ Err(Fail/Timeout) ─► publish StepFailed (+ TimeoutHit)
//!     │              ├─ attempt < max_attempts ─► RetryScheduled, wait, retry
//!     │              └─ otherwise ─► StepExhausted, task failed, exit
//!     └─► permit released after every attempt
//!   }
//! }
//! publish TaskDone ──► on_task_done(report) ──► ... ──► RunComplete
//! ```
//!
//! ## Rules
//! - A task's steps never overlap; step N+1 starts only after step N resolved
//!   (`Skipped` resolves too).
//! - A task holds a concurrency slot only while one of its attempts is in flight.
//! - Each attempt gets a fresh child [`CancellationToken`](tokio_util::sync::CancellationToken):
//!   it is the attempt's cancellation handle, cancelled on timeout and on shutdown.
//! - When `run` returns, every task is terminal and every token it created is cancelled.

mod actor;
mod attempt;
mod pool;
mod progress;
mod spec;
mod step;
mod task;

pub use pool::{RunSummary, TaskRunner};
pub use progress::RunProgress;
pub use spec::StepSpec;
pub use step::{Payload, Step, StepFn, StepOutcome, StepRef};
pub use task::{StepRecord, StepStatus, TaskInput, TaskReport, TaskSeed, TaskState};
