//! # Event bus for broadcasting pipeline events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so that the reconciler, the
//! enrichment driver, every step actor and the poller can publish without
//! blocking.
//!
//! ```text
//! Publishers (many):                    Subscriber (one):
//!   reconcile ───┐
//!   step actors ─┼──────► Bus ───────► poller listener ────► SubscriberSet
//!   runner ──────┤  (broadcast chan)
//!   poller ──────┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - One bounded ring buffer is shared by all receivers; laggards observe
//!   `RecvError::Lagged(n)` and skip the `n` oldest events.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for pipeline events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publishes an [`EventKind::Info`](super::EventKind::Info) message.
    pub fn info(&self, message: impl Into<std::sync::Arc<str>>) {
        self.publish(Event::info(message));
    }
}
