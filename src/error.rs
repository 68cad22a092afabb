//! Error types used by the pipeline, its steps and its collaborators.
//!
//! - [`StepError`] — errors raised by a single step attempt inside the task runner.
//! - [`SourceError`] — transport failures reported by a [`RemoteSource`](crate::RemoteSource).
//! - [`StoreError`] — persistence failures reported by a [`RecordStore`](crate::RecordStore).
//! - [`ScrapeError`] — errors surfaced by the poller and the listing reconciler.
//! - [`ConfigError`] — errors raised while reading configuration from the environment.
//!
//! The runtime enums provide `as_label` (stable snake_case, for logs/metrics).

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by one step attempt.
///
/// `Fail` and `Timeout` count against the step's attempt budget; `Canceled`
/// means the run itself was shut down and is never retried.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum StepError {
    /// The attempt did not resolve before its timeout elapsed.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The attempt was rejected; it may succeed if retried.
    #[error("step failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
        /// Remote API path the attempt was talking to, if any.
        api_path: Option<String>,
    },

    /// The attempt was aborted because the run is shutting down.
    #[error("context cancelled")]
    Canceled,
}

impl StepError {
    /// Builds a `Fail` error without an api path.
    pub fn fail(error: impl Into<String>) -> Self {
        StepError::Fail {
            error: error.into(),
            api_path: None,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use deploy_registry::StepError;
    /// use std::time::Duration;
    ///
    /// let err = StepError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "step_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StepError::Timeout { .. } => "step_timeout",
            StepError::Fail { .. } => "step_failed",
            StepError::Canceled => "step_canceled",
        }
    }

    /// Remote API path attached to the error, if any.
    pub fn api_path(&self) -> Option<&str> {
        match self {
            StepError::Fail { api_path, .. } => api_path.as_deref(),
            _ => None,
        }
    }

    /// Indicates whether the attempt budget applies to this error.
    ///
    /// Returns `true` for [`StepError::Fail`] and [`StepError::Timeout`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Fail { .. } | StepError::Timeout { .. })
    }
}

impl From<SourceError> for StepError {
    fn from(err: SourceError) -> Self {
        let api_path = err.api_path().to_string();
        StepError::Fail {
            error: err.to_string(),
            api_path: Some(api_path),
        }
    }
}

/// # Transport errors from the remote listing/file API.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The request failed or the connection broke mid-stream.
    #[error("request to {api_path} failed: {message}")]
    Transport {
        /// API path of the failing request.
        api_path: String,
        /// Transport-level message.
        message: String,
    },

    /// The remote does not know the requested resource.
    #[error("{api_path} not found")]
    NotFound {
        /// API path of the failing request.
        api_path: String,
    },
}

impl SourceError {
    /// Builds a `Transport` error.
    pub fn transport(api_path: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::Transport {
            api_path: api_path.into(),
            message: message.into(),
        }
    }

    /// API path of the failing request.
    pub fn api_path(&self) -> &str {
        match self {
            SourceError::Transport { api_path, .. } | SourceError::NotFound { api_path } => {
                api_path
            }
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SourceError::Transport { .. } => "source_transport",
            SourceError::NotFound { .. } => "source_not_found",
        }
    }
}

/// # Errors produced by the record store.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the snapshot file failed.
    #[error("store i/o on {path}: {source}")]
    Io {
        /// Snapshot path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The snapshot file is not valid JSON for the record table.
    #[error("store snapshot {path} is malformed: {source}")]
    Json {
        /// Snapshot path.
        path: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Io { .. } => "store_io",
            StoreError::Json { .. } => "store_json",
        }
    }
}

/// # Errors surfaced by the reconciler and the poller.
///
/// None of these stop the poll loop; they are published as error events and
/// the next cycle is scheduled as usual.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The external listing failed mid-stream; the pass was abandoned.
    #[error("listing {api_path} failed: {source}")]
    Listing {
        /// API path of the listing request.
        api_path: String,
        /// Transport error reported by the source.
        #[source]
        source: SourceError,
    },

    /// The record store failed to load or flush.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// `start` was called on a poller that is not stopped.
    #[error("poller already started")]
    AlreadyStarted,

    /// Registering the OS signal handlers failed.
    #[error("failed to listen for shutdown signals: {0}")]
    Signal(#[source] std::io::Error),
}

impl ScrapeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ScrapeError::Listing { .. } => "scrape_listing",
            ScrapeError::Store(_) => "scrape_store",
            ScrapeError::AlreadyStarted => "scrape_already_started",
            ScrapeError::Signal(_) => "scrape_signal",
        }
    }

    /// API path of the failing request, if the error came from the remote.
    pub fn api_path(&self) -> Option<&str> {
        match self {
            ScrapeError::Listing { api_path, .. } => Some(api_path),
            _ => None,
        }
    }
}

/// # Errors raised while reading configuration.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable holds an unusable value.
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_error_keeps_api_path_through_step_error() {
        let err: StepError = SourceError::transport("deployments/a/links", "reset").into();
        assert_eq!(err.api_path(), Some("deployments/a/links"));
        assert!(err.is_retryable());
        assert_eq!(err.as_label(), "step_failed");
    }

    #[test]
    fn canceled_is_not_retryable() {
        assert!(!StepError::Canceled.is_retryable());
        assert!(StepError::Timeout { timeout: Duration::from_secs(3) }.is_retryable());
    }
}
