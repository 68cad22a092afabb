use std::fmt;

/// Lifecycle of a [`Poller`](crate::Poller).
///
/// ```text
/// Stopped ──start()──► Starting ──loaded──► Running ⇄ Waiting ──stop()──► Stopped
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollerState {
    /// Not started, or stopped.
    #[default]
    Stopped,
    /// Loading the store and checking its integrity.
    Starting,
    /// A cycle is in progress.
    Running,
    /// Between cycles.
    Waiting,
}

impl PollerState {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PollerState::Stopped => "stopped",
            PollerState::Starting => "starting",
            PollerState::Running => "running",
            PollerState::Waiting => "waiting",
        }
    }
}

impl fmt::Display for PollerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
