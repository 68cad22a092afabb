//! # Journal: the most recent info/error messages
//!
//! Keeps a bounded, time-ordered history of the pipeline's `info` and `error`
//! events for status pages and debugging. A permanent step failure shows up
//! once, as the error the enrichment driver reports for it. Entries are keyed by the event sequence number; once the cap is
//! reached the oldest entry is evicted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Default number of retained entries.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 200;

/// One retained message.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Sequence number of the originating event.
    pub seq: u64,
    /// When the event was created.
    pub at: SystemTime,
    /// `Info` or `Error`.
    pub kind: EventKind,
    /// Message text.
    pub message: Arc<str>,
    /// Task key, if the message is about one record.
    pub task: Option<Arc<str>>,
    /// Remote API path, if the message reports a remote failure.
    pub api_path: Option<Arc<str>>,
}

/// Capped message history subscriber.
pub struct Journal {
    capacity: usize,
    entries: RwLock<BTreeMap<u64, JournalEntry>>,
}

impl Journal {
    /// Creates a journal retaining at most `capacity` entries (min 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Records `event` if it is a message; returns whether it was kept.
    pub async fn record(&self, event: &Event) -> bool {
        if !matches!(event.kind, EventKind::Info | EventKind::Error) {
            return false;
        }

        let entry = JournalEntry {
            seq: event.seq,
            at: event.at,
            kind: event.kind,
            message: event.reason.clone().unwrap_or_else(|| Arc::from("")),
            task: event.task.clone(),
            api_path: event.api_path.clone(),
        };

        let mut entries = self.entries.write().await;
        entries.insert(entry.seq, entry);
        while entries.len() > self.capacity {
            entries.pop_first();
        }
        true
    }

    /// Newest-first copy of the retained entries.
    pub async fn snapshot(&self) -> Vec<JournalEntry> {
        self.entries.read().await.values().rev().cloned().collect()
    }

    /// Number of retained entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when nothing has been retained yet.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new(DEFAULT_JOURNAL_CAPACITY)
    }
}

#[async_trait]
impl Subscribe for Journal {
    async fn on_event(&self, event: &Event) {
        self.record(event).await;
    }

    fn name(&self) -> &'static str {
        "Journal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_only_the_most_recent_entries() {
        let journal = Journal::default();
        let events: Vec<Event> = (0..250).map(|i| Event::info(format!("msg {i}"))).collect();
        for ev in &events {
            journal.record(ev).await;
        }

        let snapshot = journal.snapshot().await;
        assert_eq!(snapshot.len(), DEFAULT_JOURNAL_CAPACITY);
        assert_eq!(snapshot[0].seq, events[249].seq);
        assert_eq!(snapshot.last().unwrap().seq, events[50].seq);
    }

    #[tokio::test]
    async fn ignores_lifecycle_events() {
        let journal = Journal::new(10);
        assert!(!journal.record(&Event::new(EventKind::TaskDone)).await);
        assert!(
            !journal
                .record(&Event::new(EventKind::StepExhausted).with_task("a"))
                .await
        );
        assert!(
            journal
                .record(&Event::error("reset").with_api_path("list"))
                .await
        );

        let snapshot = journal.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].api_path.as_deref(), Some("list"));
    }
}
