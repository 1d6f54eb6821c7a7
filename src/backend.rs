use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::Result,
    types::{CommitInfo, FileMetadata, RemoteEntry, RepoTarget},
};

/// Core abstraction for the remote versioned file store
///
/// Every write and delete creates an immutable version record whose
/// message is later mined by the listing handler.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch the current version of a file
    ///
    /// Unlike [`StorageBackend::get_metadata`] this keeps the failure cause
    async fn fetch_metadata(&self, target: &RepoTarget, path: &str) -> Result<FileMetadata>;

    /// Create or update a file; `previous_sha` must name the current version
    /// when the path already exists. Returns the stored path.
    async fn put_content(
        &self,
        target: &RepoTarget,
        path: &str,
        content: Bytes,
        message: &str,
        previous_sha: Option<&str>,
    ) -> Result<String>;

    /// Remove a file; fails if `sha` is not the current version
    async fn delete_content(
        &self,
        target: &RepoTarget,
        path: &str,
        sha: &str,
        message: &str,
    ) -> Result<()>;

    /// List the first page (at most 100 entries) of a directory
    async fn list_directory(&self, target: &RepoTarget, path: &str) -> Result<Vec<RemoteEntry>>;

    /// The most recent version record for a path, if the history is readable
    async fn latest_commit(&self, target: &RepoTarget, path: &str) -> Result<Option<CommitInfo>>;

    /// Check a credential against the identity endpoint, returning the login
    async fn verify_credential(&self, token: Option<&str>) -> Result<String>;

    /// Get a human-readable identifier for this backend (for logging/debugging)
    fn identifier(&self) -> String;

    /// Look up the current version token
    ///
    /// Every failure (auth, rate limit, missing file, network) collapses to `None`
    async fn get_metadata(&self, target: &RepoTarget, path: &str) -> Option<FileMetadata> {
        self.fetch_metadata(target, path).await.ok()
    }
}
