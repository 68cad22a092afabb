//! # Listing reconciler: brings the store in line with the remote listing.
//!
//! ```text
//! source.deployments()
//!   ├─► item without uid/url        → ignored
//!   ├─► stored with pkg             → untouched
//!   ├─► otherwise                   → put (stored `created` wins), pending
//!   ├─► Err                         → abandon the pass (no removals)
//!   └─► end of stream
//!         ├─► info "{n} new deployments found"
//!         └─► stored ids not listed → remove, info "Deployment removed: {id}"
//! ```
//!
//! A record is only ever re-enriched while it has no `pkg`; a record that
//! enrichment gave up on carries an empty manifest and is left alone.

use std::collections::HashSet;

use futures::StreamExt;

use crate::{
    error::ScrapeError,
    events::{Bus, Event},
    runner::TaskSeed,
    source::{ApiToken, RemoteSource},
    store::RecordStore,
};

/// What one reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Ids seen for the first time.
    pub added: Vec<String>,
    /// Ids deleted because the listing no longer has them.
    pub removed: Vec<String>,
    /// Records that still need enrichment, in listing order.
    pub pending: Vec<TaskSeed>,
}

impl ReconcileReport {
    /// True when nothing needs enrichment.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Runs one full reconcile pass.
///
/// # Errors
/// [`ScrapeError::Listing`] when the listing fails; records written before the
/// failure stay, nothing is removed.
pub async fn reconcile(
    source: &dyn RemoteSource,
    token: &ApiToken,
    store: &dyn RecordStore,
    bus: &Bus,
) -> Result<ReconcileReport, ScrapeError> {
    let mut report = ReconcileReport::default();
    let mut listed: HashSet<String> = HashSet::new();

    let mut items = source.deployments(token);
    while let Some(item) = items.next().await {
        let raw = item.map_err(|source| ScrapeError::Listing {
            api_path: source.api_path().to_string(),
            source,
        })?;
        let Some(mut record) = raw.into_record() else {
            continue;
        };
        let Some(id) = record.id.clone() else {
            continue;
        };
        if !listed.insert(id.clone()) {
            continue;
        }

        let existing = store.get(&id).await;
        match &existing {
            Some(stored) if stored.pkg.is_some() => continue,
            Some(stored) => {
                if stored.created.is_some() {
                    record.created = stored.created;
                }
            }
            None => report.added.push(id.clone()),
        }
        let created = record.created;
        store.put(&id, record).await;
        report.pending.push(TaskSeed::new(id, created));
    }
    drop(items);

    bus.info(format!("{} new deployments found", report.pending.len()));

    for id in store.ids().await {
        if listed.contains(&id) {
            continue;
        }
        if store.remove(&id).await.is_some() {
            bus.info(format!("Deployment removed: {id}"));
            report.removed.push(id);
        }
    }

    Ok(report)
}

/// Deletes every record missing a required field; run once after loading.
///
/// Returns the removed ids.
pub async fn fix_integrity(store: &dyn RecordStore, bus: &Bus) -> Vec<String> {
    let records = store.records().await;
    bus.info(format!("{} deployments loaded", records.len()));

    let corrupt: Vec<(String, &'static str)> = records
        .iter()
        .filter_map(|(id, r)| r.missing_field().map(|field| (id.clone(), field)))
        .collect();
    bus.info(format!("{} corrupt deployments will be removed", corrupt.len()));

    let mut removed = Vec::with_capacity(corrupt.len());
    for (id, field) in corrupt {
        store.remove(&id).await;
        bus.publish(
            Event::info(format!("Deployment removed: {id}"))
                .with_task(id.as_str())
                .with_reason(format!("missing {field}")),
        );
        removed.push(id);
    }
    removed
}
