//! Pipeline events: types and broadcast bus.
//!
//! Every observable thing the pipeline does is an [`Event`] published on the
//! [`Bus`]: the `info`/`error` messages of the reconciler and the enrichment
//! driver, the step lifecycle of the task runner, and the poller's cycle
//! transitions.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Poller`, `reconcile`, `EnrichmentDriver`, the task runner
//!   (`TaskRunner`, step actors, `run_attempt`), `SubscriberSet` workers.
//! - **Consumers**: the poller's listener, which fans out to the
//!   [`SubscriberSet`](crate::SubscriberSet) (`LogWriter`, `Journal`, custom).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
