//! # Global pipeline configuration.
//!
//! Provides [`Config`], the centralized settings for the poller, the listing
//! reconciler, the enrichment steps and the event plumbing.
//!
//! Config is read once, at startup, either from [`Config::default`] (tests,
//! embedding) or from the environment via [`Config::from_env`].
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no semaphore created)
//! - `step_timeout = 0s` → no timeout for that step

use std::{env, path::PathBuf, time::Duration};

use crate::{error::ConfigError, policies::BackoffPolicy};

/// Environment variable overriding the storage table name.
pub const ENV_TABLE: &str = "REGISTRY_TABLE";
/// Environment variable pointing at the directory holding table snapshots.
pub const ENV_DATA_DIR: &str = "REGISTRY_DATA_DIR";

/// Global configuration for the scrape pipeline.
///
/// ## Field semantics
/// - `max_concurrent`: enrichment steps in flight at once (`0` = unlimited)
/// - `idle_delay`: wait before the next reconcile when nothing needed enrichment
/// - `busy_delay`: wait before the next reconcile after an enrichment run
/// - `young_window`: records younger than this retry unparsable manifests next cycle
/// - `step_attempts`: attempt budget of each enrichment step
/// - `retry_backoff`: delay between attempts of the same step
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `journal_capacity`: number of entries the [`Journal`](crate::Journal) keeps
#[derive(Clone, Debug)]
pub struct Config {
    /// Name of the table the records are persisted under.
    pub table: String,

    /// Directory holding the table snapshot; `None` keeps records in memory only.
    pub data_dir: Option<PathBuf>,

    /// Maximum number of enrichment steps running concurrently.
    ///
    /// - `0` = unlimited (no semaphore)
    /// - `n > 0` = at most `n` steps in flight across all tasks
    pub max_concurrent: usize,

    /// Delay before the next cycle when the reconcile found nothing to enrich.
    pub idle_delay: Duration,

    /// Delay before the next cycle after an enrichment run completed.
    pub busy_delay: Duration,

    /// Age under which an unparsable manifest is retried on the next cycle.
    pub young_window: Duration,

    /// File name identifying the package manifest in a deployment's file listing.
    pub manifest_file: String,

    /// Timeout of the manifest-id resolution step.
    pub resolve_timeout: Duration,

    /// Timeout of the manifest fetch step.
    pub fetch_timeout: Duration,

    /// Attempt budget of each enrichment step.
    pub step_attempts: u32,

    /// Delay policy between attempts of the same step.
    pub retry_backoff: BackoffPolicy,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Number of events the journal retains.
    pub journal_capacity: usize,
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// `REGISTRY_TABLE` and `REGISTRY_DATA_DIR` override the table name and
    /// the snapshot directory. Everything else keeps its default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(table) = lookup(ENV_TABLE) {
            let table = table.trim();
            if table.is_empty() || table.contains(['/', '\\']) {
                return Err(ConfigError::Invalid {
                    var: ENV_TABLE,
                    reason: format!("{table:?} is not a usable table name"),
                });
            }
            cfg.table = table.to_string();
        }
        cfg.data_dir = lookup(ENV_DATA_DIR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(cfg)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Path of the table snapshot, if records are persisted.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", self.table)))
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `max_concurrent = 20`
    /// - `idle_delay = 2s`, `busy_delay = 1s`
    /// - `young_window = 7200s`
    /// - `manifest_file = "package.json"`
    /// - `resolve_timeout = 5s`, `fetch_timeout = 3s`, `step_attempts = 20`
    /// - `retry_backoff = BackoffPolicy::immediate()` (retry on the next tick)
    /// - `bus_capacity = 1024`, `journal_capacity = 200`
    fn default() -> Self {
        Self {
            table: "deploy-registry".to_string(),
            data_dir: None,
            max_concurrent: 20,
            idle_delay: Duration::from_millis(2000),
            busy_delay: Duration::from_millis(1000),
            young_window: Duration::from_secs(7200),
            manifest_file: "package.json".to_string(),
            resolve_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(3),
            step_attempts: 20,
            retry_backoff: BackoffPolicy::immediate(),
            bus_capacity: 1024,
            journal_capacity: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_keeps_defaults() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.table, "deploy-registry");
        assert_eq!(cfg.snapshot_path(), None);
        assert_eq!(cfg.max_concurrent, 20);
    }

    #[test]
    fn from_lookup_reads_table_and_data_dir() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_TABLE, "ploy-registry"),
            (ENV_DATA_DIR, "/var/lib/registry"),
        ]))
        .unwrap();

        assert_eq!(cfg.table, "ploy-registry");
        assert_eq!(
            cfg.snapshot_path(),
            Some(PathBuf::from("/var/lib/registry/ploy-registry.json"))
        );
        assert_eq!(cfg.max_concurrent, 20);
    }

    #[test]
    fn from_lookup_rejects_path_like_table() {
        let err = Config::from_lookup(lookup(&[(ENV_TABLE, "../etc")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_TABLE, .. }));
    }
}
