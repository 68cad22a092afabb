//! # Step abstraction and function-backed step implementation.
//!
//! A [`Step`] is one stage of a per-key pipeline. It receives the task's
//! accumulated [`TaskInput`] (the seed plus every earlier step's outcome) and
//! a [`CancellationToken`] that is the attempt's cancellation handle: the
//! runner cancels it when the attempt times out or the run shuts down, and the
//! step must stop any outstanding work (requests, timers) when it fires.
//!
//! `Ok(outcome)` resolves the step, `Err(StepError)` rejects this attempt.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StepError;
use crate::runner::task::TaskInput;

/// Bound for values produced by steps.
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}

/// How a step resolved.
///
/// Every variant advances the pipeline; what later steps and the consumer of
/// the task report make of it is up to them.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T> {
    /// Nothing to do for this key (for now).
    Skipped,
    /// The step produced a value.
    Resolved(T),
    /// The step decided this key is not worth another try.
    GiveUp,
}

impl<T> StepOutcome<T> {
    /// The resolved value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            StepOutcome::Resolved(v) => Some(v),
            _ => None,
        }
    }
}

/// # One named pipeline stage.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use deploy_registry::{Step, StepError, StepOutcome, TaskInput};
///
/// struct Double;
///
/// #[async_trait]
/// impl Step<u64> for Double {
///     fn name(&self) -> &str { "double" }
///
///     async fn run(&self, input: &TaskInput<u64>, _ctx: CancellationToken)
///         -> Result<StepOutcome<u64>, StepError>
///     {
///         match input.last().and_then(|o| o.value()) {
///             Some(v) => Ok(StepOutcome::Resolved(v * 2)),
///             None => Ok(StepOutcome::Skipped),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Step<T: Payload>: Send + Sync + 'static {
    /// Stable step name, unique within a pipeline.
    fn name(&self) -> &str;

    /// Runs one attempt of the step for one task.
    async fn run(
        &self,
        input: &TaskInput<T>,
        ctx: CancellationToken,
    ) -> Result<StepOutcome<T>, StepError>;
}

/// Shared handle to a step.
pub type StepRef<T> = Arc<dyn Step<T>>;

/// Function-backed step.
///
/// Wraps a closure that creates a fresh future per attempt from an owned copy
/// of the task input.
pub struct StepFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> StepFn<F> {
    /// Creates a new function-backed step.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the step and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<T, F, Fut> Step<T> for StepFn<F>
where
    T: Payload,
    F: Fn(TaskInput<T>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutcome<T>, StepError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        input: &TaskInput<T>,
        ctx: CancellationToken,
    ) -> Result<StepOutcome<T>, StepError> {
        (self.f)(input.clone(), ctx).await
    }
}
