//! # Task state: seed, accumulated input, per-step bookkeeping and final report.

use std::sync::Arc;

use crate::error::StepError;
use crate::runner::step::StepOutcome;

/// What a task is created from: its key and the creation time of the
/// record it enriches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSeed {
    /// Opaque task key (the record id).
    pub key: Arc<str>,
    /// Creation timestamp of the record, epoch milliseconds.
    pub created: Option<i64>,
}

impl TaskSeed {
    /// Creates a new seed.
    pub fn new(key: impl Into<Arc<str>>, created: Option<i64>) -> Self {
        Self {
            key: key.into(),
            created,
        }
    }
}

/// Input handed to each step: the seed plus the outcome of every step that
/// already resolved, in step order.
#[derive(Debug, Clone)]
pub struct TaskInput<T> {
    seed: TaskSeed,
    results: Vec<(Arc<str>, StepOutcome<T>)>,
}

impl<T> TaskInput<T> {
    pub(crate) fn new(seed: TaskSeed) -> Self {
        Self {
            seed,
            results: Vec::new(),
        }
    }

    /// Task key.
    pub fn key(&self) -> &str {
        &self.seed.key
    }

    /// Creation timestamp of the record, epoch milliseconds.
    pub fn created(&self) -> Option<i64> {
        self.seed.created
    }

    /// Outcome of the named step, if it already resolved.
    pub fn outcome(&self, step: &str) -> Option<&StepOutcome<T>> {
        self.results
            .iter()
            .find(|(name, _)| name.as_ref() == step)
            .map(|(_, outcome)| outcome)
    }

    /// Outcome of the most recently resolved step.
    pub fn last(&self) -> Option<&StepOutcome<T>> {
        self.results.last().map(|(_, outcome)| outcome)
    }

    pub(crate) fn push(&mut self, step: Arc<str>, outcome: StepOutcome<T>) {
        self.results.push((step, outcome));
    }

    pub(crate) fn seed(&self) -> &TaskSeed {
        &self.seed
    }
}

/// Status of one step of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// Not started yet.
    Pending,
    /// An attempt is in flight.
    Running,
    /// Resolved.
    Succeeded,
    /// Last attempt was rejected.
    Failed,
    /// Last attempt exceeded its timeout.
    TimedOut,
}

/// Per-step bookkeeping of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Step name.
    pub name: Arc<str>,
    /// Latest status.
    pub status: StepStatus,
    /// Attempts made so far.
    pub attempts: u32,
}

/// Terminal state of a task.
#[derive(Debug, Clone)]
pub enum TaskState<T> {
    /// Every step resolved.
    Completed(TaskInput<T>),
    /// A step used up its attempt budget.
    Failed {
        /// Name of the exhausted step.
        step: Arc<str>,
        /// The last rejection.
        error: StepError,
    },
    /// The run was shut down before the task finished.
    Canceled,
}

/// Everything the runner knows about a finished task.
#[derive(Debug, Clone)]
pub struct TaskReport<T> {
    /// Task key.
    pub key: Arc<str>,
    /// Bookkeeping of every step, in step order.
    pub steps: Vec<StepRecord>,
    /// How the task ended.
    pub state: TaskState<T>,
}

impl<T> TaskReport<T> {
    /// Outcome of the last step, if the task completed.
    pub fn final_outcome(&self) -> Option<&StepOutcome<T>> {
        match &self.state {
            TaskState::Completed(input) => input.last(),
            _ => None,
        }
    }

    /// Attempts made on the named step.
    pub fn attempts(&self, step: &str) -> u32 {
        self.steps
            .iter()
            .find(|s| s.name.as_ref() == step)
            .map_or(0, |s| s.attempts)
    }
}
