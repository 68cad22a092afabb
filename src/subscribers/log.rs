//! # LogWriter: events as `tracing` records
//!
//! Maps each [`EventKind`] to a `tracing` macro at a fitting level with
//! structured fields. Install any `tracing` subscriber to see the output.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  deploy_registry: 3 new deployments found
//! WARN  deploy_registry: step failed task="dpl_1" step="fetch-manifest" attempt=1 api_path="deployments/dpl_1/files/ab12" err="connection reset"
//! ERROR deploy_registry: step exhausted task="dpl_1" step="fetch-manifest" attempt=20 err="connection reset"
//! DEBUG deploy_registry: run complete summary="50 tasks, 1 failed"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("");
        let step = e.step.as_deref().unwrap_or("");
        let api_path = e.api_path.as_deref().unwrap_or("");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::Info => tracing::info!(task, "{reason}"),
            EventKind::Error => tracing::error!(task, api_path, "{reason}"),
            EventKind::StepStarting => {
                tracing::trace!(task, step, attempt = e.attempt, "step starting")
            }
            EventKind::StepFailed => tracing::warn!(
                task,
                step,
                attempt = e.attempt,
                api_path,
                err = reason,
                "step failed"
            ),
            EventKind::TimeoutHit => tracing::warn!(
                task,
                step,
                attempt = e.attempt,
                timeout_ms = e.timeout_ms,
                "step timed out"
            ),
            EventKind::RetryScheduled => tracing::debug!(
                task,
                step,
                after_attempt = e.attempt,
                delay_ms = e.delay_ms,
                "retry scheduled"
            ),
            EventKind::StepExhausted => tracing::error!(
                task,
                step,
                attempt = e.attempt,
                api_path,
                err = reason,
                "step exhausted"
            ),
            EventKind::TaskDone => tracing::debug!(task, "task done"),
            EventKind::RunComplete => tracing::debug!(summary = reason, "run complete"),
            EventKind::PollerStarted => tracing::info!(reason, "poller started"),
            EventKind::CycleStarted => tracing::debug!(cycle = e.cycle, "cycle started"),
            EventKind::RegistryPublished => {
                tracing::debug!(entries = reason, "registry published")
            }
            EventKind::PollerStopped => tracing::info!("poller stopped"),
            EventKind::ShutdownRequested => tracing::info!("shutdown requested"),
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = task, reason, "subscriber dropped event")
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(subscriber = task, info = reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
