//! # Events emitted by the scrape pipeline.
//!
//! [`EventKind`] classifies events in four groups:
//! - **Messages**: the `info` / `error` stream consumed by logging
//! - **Step lifecycle**: one enrichment step attempt (starting, failed, timeout, retry)
//! - **Task lifecycle**: task and run terminal states
//! - **Poller lifecycle**: start, cycle boundaries, registry publication, stop
//!
//! [`Event`] carries the optional metadata: task key, step name, attempt,
//! remote api path, timeout/delay, and a human-readable reason.
//!
//! ## Ordering guarantees
//! Each event gets a globally unique, monotonically increasing `seq`. The
//! [`Journal`](crate::Journal) keys its entries by it.
//!
//! ## Example
//! ```rust
//! use deploy_registry::{Event, EventKind};
//!
//! let ev = Event::error("connection reset")
//!     .with_task("dpl_42")
//!     .with_api_path("deployments/dpl_42/links");
//!
//! assert_eq!(ev.kind, EventKind::Error);
//! assert_eq!(ev.task.as_deref(), Some("dpl_42"));
//! assert_eq!(ev.reason.as_deref(), Some("connection reset"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Classification of pipeline events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Messages ===
    /// Informational message.
    ///
    /// Sets: `reason` (the message), optionally `task`.
    Info,

    /// Reported failure. Never fatal to the poll loop.
    ///
    /// Sets: `reason`, and `api_path` / `task` when applicable.
    Error,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Step lifecycle ===
    /// A step attempt acquired a slot and is starting.
    ///
    /// Sets: `task`, `step`, `attempt` (1-based, per step).
    StepStarting,

    /// A step attempt was rejected or timed out.
    ///
    /// Sets: `task`, `step`, `attempt`, `reason`, optionally `api_path`.
    StepFailed,

    /// A step attempt exceeded its timeout; its cancellation token was cancelled.
    ///
    /// Sets: `task`, `step`, `attempt`, `timeout_ms`. Always followed by `StepFailed`.
    TimeoutHit,

    /// The same step will be attempted again.
    ///
    /// Sets: `task`, `step`, `attempt` (the failed one), `delay_ms`, `reason`.
    RetryScheduled,

    /// A step used its whole attempt budget; the task failed permanently.
    ///
    /// Sets: `task`, `step`, `attempt`, `reason`, optionally `api_path`.
    StepExhausted,

    // === Task lifecycle ===
    /// A task reached a terminal state (all steps resolved or permanent failure).
    ///
    /// Sets: `task`.
    TaskDone,

    /// Every task of a run is terminal; the runner released its bookkeeping.
    ///
    /// Sets: `reason` (summary).
    RunComplete,

    // === Poller lifecycle ===
    /// The poller loaded the store and entered the running state.
    PollerStarted,

    /// A new reconcile → enrich → rebuild cycle begins.
    ///
    /// Sets: `cycle` (1-based).
    CycleStarted,

    /// A freshly built registry replaced the published one.
    ///
    /// Sets: `reason` (entry count).
    RegistryPublished,

    /// The poller stopped; no cycle will run until the next `start`.
    PollerStopped,

    /// Shutdown requested (OS signal observed).
    ShutdownRequested,
}

/// Pipeline event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task key (record id) or subscriber name, if applicable.
    pub task: Option<Arc<str>>,
    /// Step name, for step lifecycle events.
    pub step: Option<Arc<str>>,
    /// Attempt number (1-based).
    pub attempt: Option<u32>,
    /// Poller cycle number (1-based).
    pub cycle: Option<u64>,
    /// Remote API path involved in a failure.
    pub api_path: Option<Arc<str>>,
    /// Human-readable message (info text, error details, overflow reason).
    pub reason: Option<Arc<str>>,
    /// Step timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Retry delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            step: None,
            attempt: None,
            cycle: None,
            api_path: None,
            reason: None,
            timeout_ms: None,
            delay_ms: None,
        }
    }

    /// Informational message.
    pub fn info(message: impl Into<Arc<str>>) -> Self {
        Event::new(EventKind::Info).with_reason(message)
    }

    /// Error report.
    pub fn error(message: impl Into<Arc<str>>) -> Self {
        Event::new(EventKind::Error).with_reason(message)
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a task key.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a step name.
    #[inline]
    pub fn with_step(mut self, step: impl Into<Arc<str>>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Attaches a remote API path.
    #[inline]
    pub fn with_api_path(mut self, api_path: impl Into<Arc<str>>) -> Self {
        self.api_path = Some(api_path.into());
        self
    }

    /// Attaches the api path if there is one.
    #[inline]
    pub fn with_api_path_opt(self, api_path: Option<&str>) -> Self {
        match api_path {
            Some(p) => self.with_api_path(p),
            None => self,
        }
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a poller cycle number.
    #[inline]
    pub fn with_cycle(mut self, n: u64) -> Self {
        self.cycle = Some(n);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    /// Attaches a retry delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::info("a");
        let b = Event::info("b");
        assert!(b.seq > a.seq);
    }

    #[test]
    fn optional_api_path_is_only_set_when_present() {
        let ev = Event::error("x").with_api_path_opt(None);
        assert!(ev.api_path.is_none());
        let ev = Event::error("x").with_api_path_opt(Some("list"));
        assert_eq!(ev.api_path.as_deref(), Some("list"));
    }
}
