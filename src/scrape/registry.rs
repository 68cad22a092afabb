//! # Registry builder: newest deployment per `(name, version, env)`.
//!
//! The registry is recomputed from scratch every cycle and swapped in as a
//! whole; readers hold an `Arc` of whichever version was current when they
//! looked and never see a half-built one.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;

use crate::{
    events::{Bus, Event, EventKind},
    scrape::model::{DeploymentRecord, RegistryEntry},
    store::RecordStore,
};

/// Published registry value.
pub type Registry = Arc<Vec<RegistryEntry>>;

/// Reduces `records` to one entry per `(name, version, env)`.
///
/// Records without a non-empty `pkg.version` are ignored. Within a group the
/// entry takes `url`/`created` from the record with the largest `created`;
/// ties keep the first one encountered. The result is sorted by `created`,
/// newest first, ties in encounter order.
pub fn build_registry<'a>(
    records: impl IntoIterator<Item = &'a DeploymentRecord>,
) -> Vec<RegistryEntry> {
    let mut groups: IndexMap<(String, String, String), RegistryEntry> = IndexMap::new();

    for record in records {
        let Some(version) = record.version() else {
            continue;
        };
        let env = record
            .pkg
            .as_ref()
            .and_then(|p| p.env.clone())
            .unwrap_or_default();
        let name = record.name.clone().unwrap_or_default();
        let url = record.url.clone().unwrap_or_default();
        let created = record.created.unwrap_or_default();

        let key = (name.clone(), version.to_string(), env.clone());
        match groups.get_mut(&key) {
            Some(found) => {
                if found.created < created {
                    found.url = url;
                    found.created = created;
                }
            }
            None => {
                groups.insert(
                    key,
                    RegistryEntry {
                        name,
                        version: version.to_string(),
                        env,
                        url,
                        created,
                    },
                );
            }
        }
    }

    let mut entries: Vec<RegistryEntry> = groups.into_values().collect();
    entries.sort_by(|a, b| b.created.cmp(&a.created));
    entries
}

/// Shared handle to the published registry. Cheap to clone.
#[derive(Clone, Debug)]
pub struct RegistryHandle {
    tx: Arc<watch::Sender<Registry>>,
}

impl Default for RegistryHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryHandle {
    /// Empty registry.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Registry::default());
        Self { tx: Arc::new(tx) }
    }

    /// Replaces the published registry.
    pub fn publish(&self, entries: Vec<RegistryEntry>) {
        self.tx.send_replace(Arc::new(entries));
    }

    /// The current registry.
    pub fn snapshot(&self) -> Registry {
        Arc::clone(&self.tx.borrow())
    }

    /// Receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Registry> {
        self.tx.subscribe()
    }
}

/// Rebuilds the registry from every stored record and publishes it.
///
/// Returns the number of entries.
pub async fn rebuild_registry(
    store: &dyn RecordStore,
    registry: &RegistryHandle,
    bus: &Bus,
) -> usize {
    let records = store.records().await;
    let entries = build_registry(records.iter().map(|(_, r)| r));
    let n = entries.len();
    registry.publish(entries);
    bus.publish(Event::new(EventKind::RegistryPublished).with_reason(format!("{n} entries")));
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::model::Manifest;

    fn record(name: &str, version: &str, env: &str, created: i64, url: &str) -> DeploymentRecord {
        DeploymentRecord {
            id: Some(url.to_string()),
            created: Some(created),
            name: Some(name.to_string()),
            url: Some(url.to_string()),
            pkg: Some(Manifest {
                version: Some(version.to_string()),
                env: Some(env.to_string()),
                ..Manifest::default()
            }),
        }
    }

    fn urls(entries: &[RegistryEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.url.as_str()).collect()
    }

    #[test]
    fn keeps_newest_per_key() {
        let records = [
            record("x", "1", "p", 10, "u1"),
            record("x", "1", "p", 20, "u2"),
        ];
        let registry = build_registry(&records);
        assert_eq!(
            registry,
            vec![RegistryEntry {
                name: "x".into(),
                version: "1".into(),
                env: "p".into(),
                url: "u2".into(),
                created: 20,
            }]
        );
    }

    #[test]
    fn equal_created_keeps_first_encountered() {
        let records = [
            record("x", "1", "p", 10, "first"),
            record("x", "1", "p", 10, "second"),
        ];
        assert_eq!(urls(&build_registry(&records)), vec!["first"]);
    }

    #[test]
    fn sorted_newest_first_with_stable_ties() {
        let records = [
            record("a", "1", "", 10, "u10"),
            record("b", "1", "", 30, "u30"),
            record("c", "1", "", 20, "u20a"),
            record("d", "1", "", 20, "u20b"),
        ];
        assert_eq!(
            urls(&build_registry(&records)),
            vec!["u30", "u20a", "u20b", "u10"]
        );
    }

    #[test]
    fn skips_records_without_version() {
        let mut given_up = record("x", "1", "p", 50, "gone");
        given_up.pkg = Some(Manifest::default());
        let mut empty = record("x", "", "p", 40, "empty");
        empty.pkg.as_mut().unwrap().version = Some(String::new());
        let mut pending = record("y", "1", "p", 30, "pending");
        pending.pkg = None;

        let records = [given_up, empty, pending, record("x", "1", "p", 10, "kept")];
        assert_eq!(urls(&build_registry(&records)), vec!["kept"]);
    }

    #[test]
    fn env_is_part_of_the_key() {
        let records = [
            record("x", "1", "staging", 10, "s"),
            record("x", "1", "prod", 5, "p"),
        ];
        assert_eq!(urls(&build_registry(&records)), vec!["s", "p"]);
    }

    #[tokio::test]
    async fn publish_swaps_whole_registry() {
        let handle = RegistryHandle::new();
        let mut rx = handle.subscribe();
        let before = handle.snapshot();

        handle.publish(build_registry(&[record("x", "1", "p", 1, "u")]));

        rx.changed().await.unwrap();
        assert!(before.is_empty());
        assert_eq!(handle.snapshot().len(), 1);
        assert_eq!(rx.borrow().len(), 1);
    }
}
