//! # Run a single attempt of one step.
//!
//! - Derives a **child token** per attempt (the attempt's cancellation handle)
//! - Races the step against its timeout and against run shutdown
//! - Publishes `TimeoutHit` / `StepFailed` for observability
//!
//! ## Event flow
//! ```text
//! Resolved:   step.run() → Ok(outcome)          → (nothing; the actor records it)
//! Rejected:   step.run() → Err(Fail)            → publish StepFailed
//! Timeout:    timeout elapsed → cancel child    → publish TimeoutHit
//!                                               → publish StepFailed (timeout)
//! Shutdown:   parent cancelled → child cancelled → Err(Canceled), no event
//! ```
//!
//! ## Rules
//! - The step future is dropped as soon as the attempt is decided, so no
//!   timer or request owned by it outlives the attempt.
//! - Cancelling the child never affects the parent.

use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{
    error::StepError,
    events::{Bus, Event, EventKind},
    runner::{
        spec::StepSpec,
        step::{Payload, StepOutcome},
        task::TaskInput,
    },
};

/// Executes one attempt of `spec` for the task described by `input`.
pub(crate) async fn run_attempt<T: Payload>(
    spec: &StepSpec<T>,
    input: &TaskInput<T>,
    parent: &CancellationToken,
    attempt: u32,
    bus: &Bus,
) -> Result<StepOutcome<T>, StepError> {
    let child = parent.child_token();
    let work = spec.step().run(input, child.clone());

    let res = match spec.timeout() {
        Some(dur) => {
            tokio::select! {
                r = time::timeout(dur, work) => match r {
                    Ok(r) => r,
                    Err(_elapsed) => {
                        child.cancel();
                        publish_timeout(bus, spec.name(), input.key(), dur, attempt);
                        Err(StepError::Timeout { timeout: dur })
                    }
                },
                _ = parent.cancelled() => Err(StepError::Canceled),
            }
        }
        None => {
            tokio::select! {
                r = work => r,
                _ = parent.cancelled() => Err(StepError::Canceled),
            }
        }
    };

    match &res {
        Ok(_) | Err(StepError::Canceled) => {}
        Err(e) => publish_failed(bus, spec.name(), input.key(), attempt, e),
    }
    res
}

fn publish_failed(bus: &Bus, step: &str, key: &str, attempt: u32, err: &StepError) {
    bus.publish(
        Event::new(EventKind::StepFailed)
            .with_task(key)
            .with_step(step)
            .with_attempt(attempt)
            .with_api_path_opt(err.api_path())
            .with_reason(err.to_string()),
    );
}

fn publish_timeout(bus: &Bus, step: &str, key: &str, dur: Duration, attempt: u32) {
    bus.publish(
        Event::new(EventKind::TimeoutHit)
            .with_task(key)
            .with_step(step)
            .with_timeout(dur)
            .with_attempt(attempt),
    );
}
