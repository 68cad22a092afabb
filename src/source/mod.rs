//! # Remote source: the deployment-hosting service's listing and file API.
//!
//! Listings are exposed as [`ItemStream`]s: items arrive as they are decoded,
//! a transport failure arrives as an `Err` item and ends the stream, and
//! dropping the stream aborts the underlying request. File bodies are fetched
//! with a single request.
//!
//! Every error carries the api path of the request that failed:
//!
//! | Request | Api path |
//! |---|---|
//! | deployment listing | `list` |
//! | files of a deployment | `deployments/{id}/links` |
//! | one file body | `deployments/{id}/files/{sha}` |

mod memory;

pub use memory::MemorySource;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::SourceError;
use crate::scrape::model::{FileEntry, RawDeployment};

/// Api path of the deployment listing.
pub const LIST_PATH: &str = "list";

/// Api path of a deployment's file listing.
pub fn files_path(id: &str) -> String {
    format!("deployments/{id}/links")
}

/// Api path of one file body.
pub fn file_path(id: &str, sha: &str) -> String {
    format!("deployments/{id}/files/{sha}")
}

/// Stream of decoded items; ends after the first `Err`.
pub type ItemStream<T> = BoxStream<'static, Result<T, SourceError>>;

/// Bearer credential for the remote API.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wraps a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

/// Read access to the deployment-hosting service.
#[async_trait]
pub trait RemoteSource: Send + Sync + 'static {
    /// Streams the full deployment listing.
    fn deployments(&self, token: &ApiToken) -> ItemStream<RawDeployment>;

    /// Streams the file listing of deployment `id`.
    fn files(&self, token: &ApiToken, id: &str) -> ItemStream<FileEntry>;

    /// Fetches the body of file `sha` of deployment `id` as text.
    async fn file(&self, token: &ApiToken, id: &str, sha: &str) -> Result<String, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_paths() {
        assert_eq!(files_path("d1"), "deployments/d1/links");
        assert_eq!(file_path("d1", "abc"), "deployments/d1/files/abc");
    }

    #[test]
    fn token_is_redacted() {
        let token = ApiToken::new("s3cret");
        assert_eq!(format!("{token:?}"), "ApiToken(***)");
        assert_eq!(token.expose(), "s3cret");
    }
}
