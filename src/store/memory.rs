use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::{fs, sync::RwLock};

use crate::{
    error::StoreError,
    scrape::model::{DeploymentRecord, Manifest},
    store::RecordStore,
};

type Table = IndexMap<String, DeploymentRecord>;

/// In-memory record table with an optional JSON snapshot.
///
/// The snapshot is a single JSON object mapping id to record, in insertion
/// order. Flushing writes a sibling temp file and renames it over the
/// snapshot, so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<Table>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    /// Store that never touches the filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store persisted at `path` (usually `data_dir/{table}.json`).
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        Self {
            table: RwLock::new(Table::new()),
            snapshot: Some(path.into()),
        }
    }

    /// Store pre-filled with `records`, keyed by their own id.
    ///
    /// Records without an id are skipped.
    pub fn from_records(records: impl IntoIterator<Item = DeploymentRecord>) -> Self {
        let table = records
            .into_iter()
            .filter_map(|r| r.id.clone().map(|id| (id, r)))
            .collect();
        Self {
            table: RwLock::new(table),
            snapshot: None,
        }
    }

    /// Snapshot path, if persisted.
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    /// True if no record is stored.
    pub async fn is_empty(&self) -> bool {
        self.table.read().await.is_empty()
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self) -> Result<usize, StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(self.table.read().await.len());
        };

        let loaded: Table = match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Table::new(),
            Err(e) => return Err(io_err(path, e)),
        };

        let n = loaded.len();
        *self.table.write().await = loaded;
        Ok(n)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let bytes = {
            let table = self.table.read().await;
            serde_json::to_vec_pretty(&*table).map_err(|source| StoreError::Json {
                path: path.display().to_string(),
                source,
            })?
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(|e| io_err(dir, e))?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await.map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, path).await.map_err(|e| io_err(path, e))
    }

    async fn ids(&self) -> Vec<String> {
        self.table.read().await.keys().cloned().collect()
    }

    async fn get(&self, id: &str) -> Option<DeploymentRecord> {
        self.table.read().await.get(id).cloned()
    }

    async fn records(&self) -> Vec<(String, DeploymentRecord)> {
        self.table
            .read()
            .await
            .iter()
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect()
    }

    async fn put(&self, id: &str, record: DeploymentRecord) {
        self.table.write().await.insert(id.to_string(), record);
    }

    async fn set_pkg(&self, id: &str, pkg: Manifest) -> bool {
        match self.table.write().await.get_mut(id) {
            Some(record) => {
                record.pkg = Some(pkg);
                true
            }
            None => false,
        }
    }

    async fn remove(&self, id: &str) -> Option<DeploymentRecord> {
        self.table.write().await.shift_remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, created: i64) -> DeploymentRecord {
        DeploymentRecord {
            id: Some(id.to_string()),
            created: Some(created),
            name: Some("svc".into()),
            url: Some(format!("{id}.example")),
            pkg: None,
        }
    }

    #[tokio::test]
    async fn keeps_insertion_order_across_replace_and_remove() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            store.put(id, record(id, 1)).await;
        }
        store.put("a", record("a", 2)).await;
        assert_eq!(store.ids().await, vec!["a", "b", "c"]);

        store.remove("b").await;
        assert_eq!(store.ids().await, vec!["a", "c"]);
        assert_eq!(store.get("a").await.and_then(|r| r.created), Some(2));
    }

    #[tokio::test]
    async fn set_pkg_on_unknown_id_is_a_no_op() {
        let store = MemoryStore::new();
        assert!(!store.set_pkg("nope", Manifest::default()).await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn snapshot_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let store = MemoryStore::with_snapshot(&path);
        assert_eq!(store.load().await.unwrap(), 0);
        store.put("b", record("b", 2)).await;
        store.put("a", record("a", 1)).await;
        store
            .set_pkg(
                "a",
                Manifest {
                    version: Some("1.0.0".into()),
                    env: Some(String::new()),
                    ..Manifest::default()
                },
            )
            .await;
        store.flush().await.unwrap();

        let reopened = MemoryStore::with_snapshot(&path);
        assert_eq!(reopened.load().await.unwrap(), 2);
        assert_eq!(reopened.ids().await, vec!["b", "a"]);
        assert_eq!(
            reopened.get("a").await.and_then(|r| r.version().map(str::to_owned)),
            Some("1.0.0".to_string())
        );
    }

    #[tokio::test]
    async fn malformed_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = MemoryStore::with_snapshot(&path).load().await.unwrap_err();
        assert_eq!(err.as_label(), "store_json");
    }
}
