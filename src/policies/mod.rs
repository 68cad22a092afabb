//! Retry delay policies for enrichment steps.
//!
//! The task runner re-runs a rejected or timed-out step while its attempt
//! budget lasts. These knobs control **how long** it waits in between.
//!
//! ## Contents
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid retry storms
//!
//! ## Defaults
//! - `BackoffPolicy::immediate()` → zero delay: the step is retried on the next
//!   scheduler tick. This is what [`Config`](crate::Config) uses.
//! - `BackoffPolicy::default()` → first=100ms, factor=1.0 (constant), max=30s, jitter=None.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
