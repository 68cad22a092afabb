use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use futures::{StreamExt, stream};

use crate::{
    error::SourceError,
    scrape::model::{FileEntry, RawDeployment},
    source::{ApiToken, ItemStream, LIST_PATH, RemoteSource, file_path, files_path},
};

#[derive(Debug, Default)]
struct Script {
    listing: Vec<Result<RawDeployment, SourceError>>,
    files: HashMap<String, Vec<Result<FileEntry, SourceError>>>,
    bodies: HashMap<String, String>,
    failures: HashMap<String, VecDeque<SourceError>>,
    requests: HashMap<String, usize>,
    latency: Duration,
}

impl Script {
    /// Counts the request and pops a scripted failure for `path`, if any.
    fn hit(&mut self, path: &str) -> Option<SourceError> {
        *self.requests.entry(path.to_string()).or_default() += 1;
        self.failures.get_mut(path).and_then(VecDeque::pop_front)
    }
}

/// Scripted in-process [`RemoteSource`].
///
/// Serves whatever listing, file listings and bodies it was given; unknown
/// deployments have no files and unknown bodies are `NotFound`. Failures can
/// be queued per api path and are served before the scripted answer.
#[derive(Debug, Default)]
pub struct MemorySource {
    script: Mutex<Script>,
}

impl MemorySource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the deployment listing.
    pub fn set_listing(&self, items: impl IntoIterator<Item = RawDeployment>) {
        self.script().listing = items.into_iter().map(Ok).collect();
    }

    /// Replaces the deployment listing, including mid-stream failures.
    pub fn set_listing_items(
        &self,
        items: impl IntoIterator<Item = Result<RawDeployment, SourceError>>,
    ) {
        self.script().listing = items.into_iter().collect();
    }

    /// Replaces the file listing of deployment `id`.
    pub fn set_files(&self, id: &str, files: impl IntoIterator<Item = FileEntry>) {
        self.script()
            .files
            .insert(id.to_string(), files.into_iter().map(Ok).collect());
    }

    /// Sets the body served for file `sha` of deployment `id`.
    pub fn set_body(&self, id: &str, sha: &str, body: impl Into<String>) {
        self.script().bodies.insert(file_path(id, sha), body.into());
    }

    /// Makes the next `n` requests to `api_path` fail with a transport error.
    pub fn fail_next(&self, api_path: &str, n: usize) {
        let mut script = self.script();
        let queue = script.failures.entry(api_path.to_string()).or_default();
        for _ in 0..n {
            queue.push_back(SourceError::transport(api_path, "connection reset"));
        }
    }

    /// Delays every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.script().latency = latency;
    }

    /// Number of requests made to `api_path` so far.
    pub fn requests(&self, api_path: &str) -> usize {
        self.script().requests.get(api_path).copied().unwrap_or(0)
    }

    fn serve<T: Send + 'static>(
        &self,
        path: &str,
        answer: impl FnOnce(&Script) -> Vec<Result<T, SourceError>>,
    ) -> ItemStream<T> {
        let mut script = self.script();
        let items = match script.hit(path) {
            Some(err) => vec![Err(err)],
            None => answer(&script),
        };
        let latency = script.latency;
        drop(script);

        // a failure ends the stream
        let items = stream::iter(items).scan(false, |failed, item| {
            let out = (!*failed).then(|| {
                *failed = item.is_err();
                item
            });
            futures::future::ready(out)
        });

        if latency.is_zero() {
            items.boxed()
        } else {
            stream::once(tokio::time::sleep(latency))
                .filter_map(|()| futures::future::ready(None))
                .chain(items)
                .boxed()
        }
    }
}

#[async_trait]
impl RemoteSource for MemorySource {
    fn deployments(&self, _token: &ApiToken) -> ItemStream<RawDeployment> {
        self.serve(LIST_PATH, |s| s.listing.clone())
    }

    fn files(&self, _token: &ApiToken, id: &str) -> ItemStream<FileEntry> {
        self.serve(&files_path(id), |s| s.files.get(id).cloned().unwrap_or_default())
    }

    async fn file(&self, _token: &ApiToken, id: &str, sha: &str) -> Result<String, SourceError> {
        let path = file_path(id, sha);
        let (res, latency) = {
            let mut script = self.script();
            let res = match script.hit(&path) {
                Some(err) => Err(err),
                None => script
                    .bodies
                    .get(&path)
                    .cloned()
                    .ok_or_else(|| SourceError::NotFound {
                        api_path: path.clone(),
                    }),
            };
            (res, script.latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        res
    }
}
