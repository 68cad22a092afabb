//! Scrape pipeline stages: reconcile the listing, enrich pending records,
//! rebuild the registry.
//!
//! Each stage is usable on its own; the [`Poller`](crate::Poller) chains them
//! into cycles.

pub mod enrich;
pub mod model;
pub mod reconcile;
pub mod registry;

pub use enrich::{Clock, EnrichValue, EnrichmentDriver, FetchManifest, ResolveManifestId};
pub use model::{DeploymentRecord, FileEntry, Manifest, RawDeployment, RegistryEntry};
pub use reconcile::{ReconcileReport, fix_integrity, reconcile};
pub use registry::{Registry, RegistryHandle, build_registry, rebuild_registry};
