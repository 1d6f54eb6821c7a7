use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::{
    backend::StorageBackend,
    config::ListingPolicy,
    error::Result,
    provenance,
    types::{EntryType, ListedFile, RemoteEntry, RepoTarget},
    upload::extension_of,
};

/// Enumerates stored files and recovers their upload provenance
///
/// Walks the tree depth-first in backend order. Only the first page of each
/// directory is visited.
#[derive(Clone)]
pub struct ListingHandler {
    backend: Arc<dyn StorageBackend>,
    policy: ListingPolicy,
}

impl ListingHandler {
    pub fn new(backend: Arc<dyn StorageBackend>, policy: ListingPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn default_dir(&self) -> &str {
        &self.policy.default_dir
    }

    pub fn is_listed(&self, name: &str) -> bool {
        let ext = extension_of(name);
        self.policy.allowed_extensions.iter().any(|e| *e == ext)
    }

    /// Every allowed file at or below `path`
    pub async fn list(&self, target: &RepoTarget, path: &str) -> Result<Vec<ListedFile>> {
        self.walk(target, path.trim().trim_matches('/').to_string()).await
    }

    fn walk<'a>(&'a self, target: &'a RepoTarget, path: String) -> BoxFuture<'a, Result<Vec<ListedFile>>> {
        async move {
            let entries = match self.backend.list_directory(target, &path).await {
                Ok(entries) => entries,
                // Missing or unreadable directories contribute nothing
                Err(e) if e.is_remote_status() => {
                    debug!(%path, "skipping directory: {}", e);
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            };

            let mut files = Vec::new();
            for entry in entries {
                match entry.entry_type {
                    EntryType::File if self.is_listed(&entry.name) => {
                        files.push(self.describe(target, entry).await?);
                    }
                    EntryType::File => {}
                    EntryType::Dir => {
                        let nested = self.walk(target, entry.path).await?;
                        files.extend(nested);
                    }
                }
            }
            Ok(files)
        }
        .boxed()
    }

    async fn describe(&self, target: &RepoTarget, entry: RemoteEntry) -> Result<ListedFile> {
        let commit = self
            .backend
            .latest_commit(target, &entry.path)
            .await?
            .unwrap_or_default();

        Ok(ListedFile {
            kind: "file".to_string(),
            original_name: provenance::original_name(&commit.message),
            upload_time: commit.date,
            name: entry.name,
            path: entry.path,
            sha: entry.sha,
            size: entry.size,
        })
    }
}
