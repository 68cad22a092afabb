//! # deploy-registry
//!
//! Keeps a local table of deployments in sync with a deployment-hosting
//! service, enriches each deployment with its package manifest, and publishes
//! a registry of the newest deployment per `(name, version, env)`.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                      ┌──────────────────────────────────────┐
//!                      │  Poller (start / stop, one cycle at  │
//!                      │  a time, idle 2s / busy 1s waits)    │
//!                      └───┬──────────────┬──────────────┬────┘
//!                          ▼              ▼              ▼
//!                   ┌────────────┐ ┌──────────────┐ ┌────────────────┐
//!                   │ reconcile  │ │ Enrichment   │ │ build_registry │
//!                   │ (listing → │ │ Driver       │ │ (dedup, newest │
//!                   │  store)    │ │ (TaskRunner) │ │  first)        │
//!                   └─────┬──────┘ └──────┬───────┘ └───────┬────────┘
//!                         │               │                 │
//!        RemoteSource ◄───┴───────────────┤                 ▼
//!        RecordStore  ◄───────────────────┴──────── RegistryHandle (watch)
//!
//!   every stage ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                     ┌──────┴──────┐
//!                                                     ▼             ▼
//!                                                 LogWriter      Journal
//! ```
//!
//! ### Cycle
//! ```text
//! reconcile()
//!   ├─ Err              ─► Error event, wait idle_delay
//!   ├─ nothing pending  ─► rebuild registry, wait idle_delay
//!   └─ pending records  ─► TaskRunner (20 in flight)
//!                            resolve-manifest-id (5s, 20 attempts)
//!                            fetch-manifest      (3s, 20 attempts)
//!                          ─► write pkg, rebuild registry, wait busy_delay
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                         |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Orchestration** | Start/stop lifecycle around repeated scrape cycles.          | [`Poller`], [`PollerState`]                |
//! | **Task runner**   | Bounded-concurrency ordered steps with timeouts and retries. | [`TaskRunner`], [`Step`], [`StepOutcome`]  |
//! | **Pipeline**      | Listing reconcile, manifest enrichment, registry reduction.  | [`reconcile`], [`EnrichmentDriver`], [`build_registry`] |
//! | **Collaborators** | Record store and remote API seams with in-process impls.     | [`RecordStore`], [`RemoteSource`]          |
//! | **Subscriber API**| Hook into pipeline events (logging, history, metrics).       | [`Subscribe`], [`LogWriter`], [`Journal`]  |
//! | **Configuration** | Defaults plus environment overrides.                         | [`Config`]                                 |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use deploy_registry::{
//!     ApiToken, Config, FileEntry, Journal, LogWriter, MemorySource, Poller, RawDeployment,
//!     Subscribe,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = Arc::new(MemorySource::new());
//!     source.set_listing([RawDeployment {
//!         uid: Some("d1".into()),
//!         name: Some("svc".into()),
//!         url: Some("svc-d1.example".into()),
//!         created: Some(1),
//!     }]);
//!     source.set_files("d1", [FileEntry::new("package.json", "abc")]);
//!     source.set_body("d1", "abc", r#"{"version":"1.0.0","_env":"prod"}"#);
//!
//!     let config = Config::default();
//!     let journal = Arc::new(Journal::new(config.journal_capacity));
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new()), journal.clone()];
//!
//!     let poller = Poller::builder(config, source)
//!         .with_subscribers(subs)
//!         .build();
//!     let mut registry = poller.registry().subscribe();
//!
//!     poller.start(ApiToken::new("token")).await?;
//!     registry.changed().await?;
//!     poller.stop().await;
//!
//!     assert_eq!(poller.registry().snapshot()[0].version, "1.0.0");
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod events;
mod policies;
mod poller;
mod runner;
mod scrape;
mod source;
mod store;
mod subscribers;

// ---- Public re-exports ----

pub use config::{Config, ENV_DATA_DIR, ENV_TABLE};
pub use error::{ConfigError, ScrapeError, SourceError, StepError, StoreError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use poller::{Poller, PollerBuilder, PollerState, wait_for_shutdown_signal};
pub use runner::{
    Payload, RunProgress, RunSummary, Step, StepFn, StepOutcome, StepRecord, StepRef, StepSpec,
    StepStatus, TaskInput, TaskReport, TaskRunner, TaskSeed, TaskState,
};
pub use scrape::{
    Clock, DeploymentRecord, EnrichValue, EnrichmentDriver, FetchManifest, FileEntry, Manifest,
    RawDeployment, ReconcileReport, Registry, RegistryEntry, RegistryHandle, ResolveManifestId,
    build_registry, fix_integrity, rebuild_registry, reconcile,
};
pub use scrape::enrich::{FETCH_MANIFEST, RESOLVE_MANIFEST_ID};
pub use source::{
    ApiToken, ItemStream, LIST_PATH, MemorySource, RemoteSource, file_path, files_path,
};
pub use store::{MemoryStore, RecordStore};
pub use subscribers::{
    DEFAULT_JOURNAL_CAPACITY, Journal, JournalEntry, LogWriter, Subscribe, SubscriberSet,
};
