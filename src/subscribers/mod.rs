//! # Event subscribers.
//!
//! Every [`Event`](crate::Event) published on the bus is fanned out by the
//! poller to a [`SubscriberSet`]. Subscribers are where the pipeline's events
//! become logs, retained history, metrics or alerts.
//!
//! ## Architecture
//! ```text
//!   reconcile / driver / runner / poller ── publish(Event) ──► Bus
//!                                                               │
//!                                                     poller listener
//!                                                               │
//!                                                               ▼
//!                                                        SubscriberSet
//!                                                  ┌────────────┼────────────┐
//!                                                  ▼            ▼            ▼
//!                                              LogWriter     Journal       custom
//!                                              (tracing)   (last 200)
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use deploy_registry::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct FailureCounter;
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::StepExhausted {
//!             // increment failure counter
//!         }
//!     }
//! }
//! ```

mod journal;
mod log;
mod set;
mod subscribe;

pub use journal::{DEFAULT_JOURNAL_CAPACITY, Journal, JournalEntry};
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
