//! # Step specification.
//!
//! [`StepSpec`] bundles a [`Step`](crate::Step) with the timeout and the
//! attempt budget the runner enforces for it.

use std::time::Duration;

use crate::runner::step::{Payload, StepRef};

/// Specification for running a step under the task runner.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use deploy_registry::{StepError, StepFn, StepOutcome, StepSpec, TaskInput};
///
/// let noop = StepFn::arc("noop", |_input: TaskInput<()>, _ctx: CancellationToken| async {
///     Ok::<_, StepError>(StepOutcome::<()>::Skipped)
/// });
/// let spec = StepSpec::new(noop, Some(Duration::from_secs(5)), 20);
/// assert_eq!(spec.name(), "noop");
/// assert_eq!(spec.max_attempts(), 20);
/// ```
pub struct StepSpec<T: Payload> {
    step: StepRef<T>,
    timeout: Option<Duration>,
    max_attempts: u32,
}

impl<T: Payload> Clone for StepSpec<T> {
    fn clone(&self) -> Self {
        Self {
            step: self.step.clone(),
            timeout: self.timeout,
            max_attempts: self.max_attempts,
        }
    }
}

impl<T: Payload> StepSpec<T> {
    /// Creates a new specification.
    ///
    /// - `timeout`: per-attempt timeout (`None` or zero = no timeout)
    /// - `max_attempts`: attempt budget (at least 1)
    pub fn new(step: StepRef<T>, timeout: Option<Duration>, max_attempts: u32) -> Self {
        Self {
            step,
            timeout: timeout.filter(|d| !d.is_zero()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Returns reference to the step.
    pub fn step(&self) -> &StepRef<T> {
        &self.step
    }

    /// Convenience: returns the step name.
    pub fn name(&self) -> &str {
        self.step.name()
    }

    /// Returns the per-attempt timeout, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the attempt budget.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
