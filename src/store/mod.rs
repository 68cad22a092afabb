//! # Record store: the local table of deployment records.
//!
//! [`RecordStore`] is the seam the reconciler, the enrichment driver and the
//! registry builder write through. Records are keyed by id and iterate in
//! insertion order; every call is atomic on its own.
//!
//! [`MemoryStore`] keeps the table in memory and, when given a path, persists
//! it as one JSON snapshot named after the table.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::scrape::model::{DeploymentRecord, Manifest};

/// Keyed table of [`DeploymentRecord`]s.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Replaces the in-memory table with the persisted one.
    ///
    /// Returns the number of records loaded.
    async fn load(&self) -> Result<usize, StoreError>;

    /// Persists the current table.
    async fn flush(&self) -> Result<(), StoreError>;

    /// Every stored id, in insertion order.
    async fn ids(&self) -> Vec<String>;

    /// Record stored under `id`.
    async fn get(&self, id: &str) -> Option<DeploymentRecord>;

    /// Every `(id, record)` pair, in insertion order.
    async fn records(&self) -> Vec<(String, DeploymentRecord)>;

    /// Inserts or replaces the record under `id`.
    ///
    /// A replaced record keeps its position.
    async fn put(&self, id: &str, record: DeploymentRecord);

    /// Attaches `pkg` to the record under `id`.
    ///
    /// Returns `false` if no such record exists.
    async fn set_pkg(&self, id: &str, pkg: Manifest) -> bool;

    /// Deletes the record under `id`.
    async fn remove(&self, id: &str) -> Option<DeploymentRecord>;
}
