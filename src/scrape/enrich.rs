//! # Enrichment driver: attaches package manifests to pending records.
//!
//! Every pending record becomes one task of a [`TaskRunner`] with two steps:
//!
//! ```text
//! resolve-manifest-id   files(id) ──► first entry named package.json ──► Resolved(sha)
//!                                 └─► stream end without match      ──► Skipped
//! fetch-manifest        Skipped upstream                            ──► Skipped
//!                       file(id, sha) ──► null                      ──► Skipped
//!                                     ├─► no version                ──► GiveUp
//!                                     ├─► unparsable, young record  ──► Skipped
//!                                     ├─► unparsable, old record    ──► GiveUp
//!                                     └─► manifest                  ──► Resolved(manifest)
//! ```
//!
//! When a task finishes, `Resolved` is written to the record's `pkg` and
//! `GiveUp` writes an empty manifest so the record is not revisited. A
//! skipped record keeps no `pkg` and is picked up again by the next reconcile.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use serde_json::Value;
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::StepError,
    events::{Bus, Event},
    runner::{
        RunProgress, RunSummary, Step, StepOutcome, StepSpec, TaskInput, TaskReport, TaskRunner,
        TaskSeed, TaskState,
    },
    scrape::model::Manifest,
    source::{ApiToken, RemoteSource, file_path, files_path},
    store::RecordStore,
};

/// Name of the first enrichment step.
pub const RESOLVE_MANIFEST_ID: &str = "resolve-manifest-id";
/// Name of the second enrichment step.
pub const FETCH_MANIFEST: &str = "fetch-manifest";

/// Value produced by the enrichment steps.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichValue {
    /// Content id of the manifest file.
    ManifestId(String),
    /// Parsed manifest.
    Manifest(Manifest),
}

/// Current wall-clock time in epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| Utc::now().timestamp_millis())
}

/// Finds the content id of the manifest file in a deployment's file listing.
pub struct ResolveManifestId {
    source: Arc<dyn RemoteSource>,
    token: ApiToken,
    manifest_file: String,
}

impl ResolveManifestId {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        token: ApiToken,
        manifest_file: impl Into<String>,
    ) -> Self {
        Self {
            source,
            token,
            manifest_file: manifest_file.into(),
        }
    }
}

#[async_trait]
impl Step<EnrichValue> for ResolveManifestId {
    fn name(&self) -> &str {
        RESOLVE_MANIFEST_ID
    }

    async fn run(
        &self,
        input: &TaskInput<EnrichValue>,
        ctx: CancellationToken,
    ) -> Result<StepOutcome<EnrichValue>, StepError> {
        let mut files = self.source.files(&self.token, input.key());
        loop {
            let item = select! {
                item = files.next() => item,
                _ = ctx.cancelled() => return Err(StepError::Canceled),
            };
            match item {
                Some(Ok(entry)) if entry.file == self.manifest_file => {
                    return Ok(StepOutcome::Resolved(EnrichValue::ManifestId(entry.sha)));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(StepOutcome::Skipped),
            }
        }
    }
}

/// Fetches and interprets the manifest found by [`ResolveManifestId`].
pub struct FetchManifest {
    source: Arc<dyn RemoteSource>,
    token: ApiToken,
    young_window: Duration,
    clock: Clock,
}

impl FetchManifest {
    pub fn new(source: Arc<dyn RemoteSource>, token: ApiToken, young_window: Duration) -> Self {
        Self {
            source,
            token,
            young_window,
            clock: system_clock(),
        }
    }

    /// Replaces the wall clock used to age records.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// A record created within the young window may still get a valid manifest.
    fn is_young(&self, created: Option<i64>) -> bool {
        let window = i64::try_from(self.young_window.as_millis()).unwrap_or(i64::MAX);
        let cutoff = (self.clock)().saturating_sub(window);
        created.is_some_and(|c| c > cutoff)
    }
}

#[async_trait]
impl Step<EnrichValue> for FetchManifest {
    fn name(&self) -> &str {
        FETCH_MANIFEST
    }

    async fn run(
        &self,
        input: &TaskInput<EnrichValue>,
        ctx: CancellationToken,
    ) -> Result<StepOutcome<EnrichValue>, StepError> {
        let sha = match input.outcome(RESOLVE_MANIFEST_ID).and_then(StepOutcome::value) {
            Some(EnrichValue::ManifestId(sha)) => sha,
            _ => return Ok(StepOutcome::Skipped),
        };

        let body = select! {
            body = self.source.file(&self.token, input.key(), sha) => body?,
            _ = ctx.cancelled() => return Err(StepError::Canceled),
        };

        let doc: Value = match serde_json::from_str(&body) {
            Ok(doc) => doc,
            Err(_) if self.is_young(input.created()) => return Ok(StepOutcome::Skipped),
            Err(_) => return Ok(StepOutcome::GiveUp),
        };
        if doc.is_null() {
            return Ok(StepOutcome::Skipped);
        }

        Ok(match Manifest::from_document(&doc) {
            Some(manifest) => StepOutcome::Resolved(EnrichValue::Manifest(manifest)),
            None => StepOutcome::GiveUp,
        })
    }
}

/// Runs the enrichment pipeline over one cycle's pending records.
pub struct EnrichmentDriver {
    source: Arc<dyn RemoteSource>,
    store: Arc<dyn RecordStore>,
    token: ApiToken,
    bus: Bus,
    config: Config,
    clock: Clock,
}

impl EnrichmentDriver {
    /// Creates a driver with step timeouts, attempt budgets and concurrency
    /// taken from `config`.
    pub fn new(
        source: Arc<dyn RemoteSource>,
        store: Arc<dyn RecordStore>,
        token: ApiToken,
        bus: Bus,
        config: Config,
    ) -> Self {
        Self {
            source,
            store,
            token,
            bus,
            config,
            clock: system_clock(),
        }
    }

    /// Replaces the wall clock used to age records.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The two enrichment steps, in order.
    pub fn steps(&self) -> Vec<StepSpec<EnrichValue>> {
        let resolve = ResolveManifestId::new(
            Arc::clone(&self.source),
            self.token.clone(),
            self.config.manifest_file.clone(),
        );
        let fetch = FetchManifest::new(
            Arc::clone(&self.source),
            self.token.clone(),
            self.config.young_window,
        )
        .with_clock(Arc::clone(&self.clock));

        vec![
            StepSpec::new(
                Arc::new(resolve),
                Some(self.config.resolve_timeout),
                self.config.step_attempts,
            ),
            StepSpec::new(
                Arc::new(fetch),
                Some(self.config.fetch_timeout),
                self.config.step_attempts,
            ),
        ]
    }

    /// Enriches `pending` and writes every result back to the store.
    ///
    /// Returns once every task is terminal; cancelling `token` abandons the
    /// remaining work.
    pub async fn run(&self, pending: Vec<TaskSeed>, token: &CancellationToken) -> RunSummary {
        let runner = TaskRunner::new(
            self.bus.clone(),
            self.config.max_concurrent,
            self.steps(),
            pending,
        )
        .with_retry_backoff(self.config.retry_backoff);
        let progress = runner.progress();

        runner
            .run(token, |report| {
                let store = Arc::clone(&self.store);
                let bus = self.bus.clone();
                let progress = Arc::clone(&progress);
                async move { apply_report(store.as_ref(), &bus, &progress, report).await }
            })
            .await
    }
}

async fn apply_report(
    store: &dyn RecordStore,
    bus: &Bus,
    progress: &RunProgress,
    report: TaskReport<EnrichValue>,
) {
    let key = report.key.clone();
    match &report.state {
        TaskState::Completed(_) => match report.final_outcome() {
            Some(StepOutcome::Resolved(EnrichValue::Manifest(manifest))) => {
                store.set_pkg(&key, manifest.clone()).await;
            }
            Some(StepOutcome::GiveUp) => {
                store.set_pkg(&key, Manifest::default()).await;
            }
            _ => {}
        },
        TaskState::Failed { step, error } => {
            let api_path = error
                .api_path()
                .map(str::to_owned)
                .unwrap_or_else(|| step_api_path(step, &key));
            bus.publish(
                Event::error(format!("{step} failed for {key}: {error}"))
                    .with_task(key.clone())
                    .with_step(step.clone())
                    .with_api_path(api_path),
            );
        }
        TaskState::Canceled => return,
    }

    bus.info(format!("Deployment scraped: {key}"));
    bus.info(progress.to_string());
}

/// Best-effort api path for a failure that did not carry one (a timeout).
fn step_api_path(step: &str, key: &str) -> String {
    match step {
        RESOLVE_MANIFEST_ID => files_path(key),
        _ => file_path(key, "*"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::EventKind,
        scrape::model::{DeploymentRecord, FileEntry},
        source::MemorySource,
        store::MemoryStore,
        subscribers::Journal,
    };

    const NOW: i64 = 1_700_000_000_000;
    const HOUR: i64 = 3_600_000;

    fn fixed_clock() -> Clock {
        Arc::new(|| NOW)
    }

    struct Fixture {
        source: Arc<MemorySource>,
        store: Arc<MemoryStore>,
        bus: Bus,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                source: Arc::new(MemorySource::new()),
                store: Arc::new(MemoryStore::new()),
                bus: Bus::new(1024),
            }
        }

        /// Stores a pending record whose manifest body is `body`.
        async fn deployment(&self, id: &str, created: i64, body: &str) -> TaskSeed {
            self.store
                .put(
                    id,
                    DeploymentRecord {
                        id: Some(id.into()),
                        created: Some(created),
                        name: Some("svc".into()),
                        url: Some(format!("{id}.example")),
                        pkg: None,
                    },
                )
                .await;
            let sha = format!("sha-{id}");
            self.source.set_files(
                id,
                [FileEntry::new("index.js", "other"), FileEntry::new("package.json", &sha)],
            );
            self.source.set_body(id, &sha, body);
            TaskSeed::new(id, Some(created))
        }

        fn driver(&self) -> EnrichmentDriver {
            let source: Arc<dyn RemoteSource> = self.source.clone();
            let store: Arc<dyn RecordStore> = self.store.clone();
            EnrichmentDriver::new(
                source,
                store,
                ApiToken::default(),
                self.bus.clone(),
                Config::default(),
            )
            .with_clock(fixed_clock())
        }

        async fn pkg(&self, id: &str) -> Option<Manifest> {
            self.store.get(id).await.and_then(|r| r.pkg)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn writes_parsed_manifest() {
        let fx = Fixture::new();
        let seed = fx
            .deployment("a", NOW, r#"{"version":"1.2.0","_env":"prod","_routes":{"/":"index"}}"#)
            .await;
        let mut rx = fx.bus.subscribe();

        let summary = fx.driver().run(vec![seed], &CancellationToken::new()).await;

        assert_eq!(summary.completed, 1);
        let pkg = fx.pkg("a").await.unwrap();
        assert_eq!(pkg.version.as_deref(), Some("1.2.0"));
        assert_eq!(pkg.env.as_deref(), Some("prod"));
        assert!(pkg.routes.is_some());

        let mut scraped = false;
        while let Ok(ev) = rx.try_recv() {
            scraped |= ev.reason.as_deref() == Some("Deployment scraped: a");
        }
        assert!(scraped);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_manifest_is_retried_later_only_while_young() {
        let fx = Fixture::new();
        let young = fx.deployment("young", NOW - HOUR, "{ nope").await;
        let old = fx.deployment("old", NOW - 3 * HOUR, "{ nope").await;

        fx.driver().run(vec![young, old], &CancellationToken::new()).await;

        assert_eq!(fx.pkg("young").await, None);
        assert_eq!(fx.pkg("old").await, Some(Manifest::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_version_gives_up_and_null_skips() {
        let fx = Fixture::new();
        let no_version = fx.deployment("nv", NOW, r#"{"name":"svc"}"#).await;
        let null = fx.deployment("null", NOW, "null").await;

        fx.driver()
            .run(vec![no_version, null], &CancellationToken::new())
            .await;

        assert_eq!(fx.pkg("nv").await, Some(Manifest::default()));
        assert_eq!(fx.pkg("null").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn no_manifest_file_skips_without_fetching() {
        let fx = Fixture::new();
        let seed = fx.deployment("a", NOW, "{}").await;
        fx.source.set_files("a", [FileEntry::new("index.js", "other")]);

        let summary = fx.driver().run(vec![seed], &CancellationToken::new()).await;

        assert_eq!(summary.completed, 1);
        assert_eq!(fx.source.requests(&file_path("a", "sha-a")), 0);
        assert_eq!(fx.pkg("a").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried_within_budget() {
        let fx = Fixture::new();
        let seed = fx.deployment("a", NOW, r#"{"version":"1.0.0"}"#).await;
        fx.source.fail_next(&files_path("a"), 3);
        fx.source.fail_next(&file_path("a", "sha-a"), 2);

        let summary = fx.driver().run(vec![seed], &CancellationToken::new()).await;

        assert_eq!(summary.completed, 1);
        assert_eq!(fx.source.requests(&files_path("a")), 4);
        assert_eq!(fx.source.requests(&file_path("a", "sha-a")), 3);
        assert!(fx.pkg("a").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_step_reports_error_with_key_and_api_path() {
        let fx = Fixture::new();
        let seed = fx.deployment("a", NOW, r#"{"version":"1.0.0"}"#).await;
        fx.source.fail_next(&files_path("a"), 20);
        let mut rx = fx.bus.subscribe();

        let summary = fx.driver().run(vec![seed], &CancellationToken::new()).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(fx.source.requests(&files_path("a")), 20);
        assert_eq!(fx.pkg("a").await, None);

        let errors: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|ev| ev.kind == EventKind::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].task.as_deref(), Some("a"));
        assert_eq!(errors[0].api_path.as_deref(), Some("deployments/a/links"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_step_takes_one_journal_entry() {
        let fx = Fixture::new();
        let seed = fx.deployment("a", NOW, r#"{"version":"1.0.0"}"#).await;
        fx.source.fail_next(&files_path("a"), 20);
        let mut rx = fx.bus.subscribe();

        fx.driver().run(vec![seed], &CancellationToken::new()).await;

        let journal = Journal::new(200);
        while let Ok(ev) = rx.try_recv() {
            journal.record(&ev).await;
        }
        let failures: Vec<_> = journal
            .snapshot()
            .await
            .into_iter()
            .filter(|e| e.kind != EventKind::Info)
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, EventKind::Error);
        assert_eq!(failures[0].task.as_deref(), Some("a"));
    }
}
