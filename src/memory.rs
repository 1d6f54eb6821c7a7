use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    backend::StorageBackend,
    error::{RelayError, Result},
    types::{CommitInfo, EntryType, FileMetadata, RemoteEntry, RepoTarget},
};

const PAGE_SIZE: usize = 100;

struct StoredObject {
    content: Bytes,
    sha: String,
}

struct CommitRecord {
    key: String,
    message: String,
    date: String,
}

#[derive(Default)]
struct Store {
    files: HashMap<String, StoredObject>,
    /// Append-only; newest last
    commits: Vec<CommitRecord>,
    revision: u64,
}

/// In-process backend with the same version-token rules as the remote store
///
/// Used for local development and as the test double for the handlers.
#[derive(Clone)]
pub struct MemoryBackend {
    store: Arc<RwLock<Store>>,
    login: String,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
            login: "local".to_string(),
        }
    }

    /// Raw content currently stored at a path
    pub async fn read(&self, target: &RepoTarget, path: &str) -> Option<Bytes> {
        let store = self.store.read().await;
        store
            .files
            .get(&object_key(target, path))
            .map(|o| o.content.clone())
    }

    /// Number of version records written so far, across all paths
    pub async fn commit_count(&self) -> usize {
        self.store.read().await.commits.len()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

fn repo_prefix(target: &RepoTarget) -> String {
    format!("{}/{}@{}:", target.owner, target.repo, target.reference)
}

fn object_key(target: &RepoTarget, path: &str) -> String {
    format!("{}{}", repo_prefix(target), normalize(path))
}

/// Version token: SHA-256 over the path, the store revision and the content
fn version_token(path: &str, revision: u64, content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(revision.to_be_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn fetch_metadata(&self, target: &RepoTarget, path: &str) -> Result<FileMetadata> {
        let store = self.store.read().await;
        if let Some(o) = store.files.get(&object_key(target, path)) {
            return Ok(FileMetadata {
                path: normalize(path).to_string(),
                sha: o.sha.clone(),
                size: o.content.len() as u64,
                kind: EntryType::File,
            });
        }

        let dir_prefix = format!("{}/", object_key(target, path));
        if !normalize(path).is_empty() && store.files.keys().any(|k| k.starts_with(&dir_prefix)) {
            return Ok(FileMetadata {
                path: normalize(path).to_string(),
                sha: String::new(),
                size: 0,
                kind: EntryType::Dir,
            });
        }

        Err(RelayError::NotFound {
            path: path.to_string(),
        })
    }

    async fn put_content(
        &self,
        target: &RepoTarget,
        path: &str,
        content: Bytes,
        message: &str,
        previous_sha: Option<&str>,
    ) -> Result<String> {
        let key = object_key(target, path);
        let mut store = self.store.write().await;

        match (store.files.get(&key), previous_sha) {
            (Some(existing), Some(sha)) if existing.sha == sha => {}
            (Some(_), Some(_)) => {
                return Err(RelayError::backend("upload failed", format!("{} does not match", path)))
            }
            (Some(_), None) => {
                return Err(RelayError::backend(
                    "upload failed",
                    "Invalid request. \"sha\" wasn't supplied.",
                ))
            }
            (None, Some(_)) => {
                return Err(RelayError::backend("upload failed", format!("{} does not exist", path)))
            }
            (None, None) => {}
        }

        store.revision += 1;
        let sha = version_token(normalize(path), store.revision, &content);
        store.files.insert(key.clone(), StoredObject { content, sha });
        store.commits.push(CommitRecord {
            key,
            message: message.to_string(),
            date: now(),
        });

        Ok(path.to_string())
    }

    async fn delete_content(
        &self,
        target: &RepoTarget,
        path: &str,
        sha: &str,
        message: &str,
    ) -> Result<()> {
        let key = object_key(target, path);
        let mut store = self.store.write().await;

        match store.files.get(&key) {
            Some(existing) if existing.sha == sha => {}
            Some(_) => {
                return Err(RelayError::backend("delete failed", format!("{} does not match {}", path, sha)))
            }
            None => return Err(RelayError::backend("delete failed", "Not Found")),
        }

        store.files.remove(&key);
        store.revision += 1;
        store.commits.push(CommitRecord {
            key,
            message: message.to_string(),
            date: now(),
        });
        Ok(())
    }

    async fn list_directory(&self, target: &RepoTarget, path: &str) -> Result<Vec<RemoteEntry>> {
        let dir = normalize(path);
        let prefix = if dir.is_empty() {
            repo_prefix(target)
        } else {
            format!("{}{}/", repo_prefix(target), dir)
        };

        let store = self.store.read().await;
        let mut entries: BTreeMap<String, RemoteEntry> = BTreeMap::new();

        for (key, object) in &store.files {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            let entry_path = |name: &str| {
                if dir.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", dir, name)
                }
            };
            match rest.split_once('/') {
                Some((sub, _)) => {
                    entries.entry(sub.to_string()).or_insert_with(|| RemoteEntry {
                        name: sub.to_string(),
                        path: entry_path(sub),
                        entry_type: EntryType::Dir,
                        sha: String::new(),
                        size: 0,
                    });
                }
                None => {
                    entries.insert(
                        rest.to_string(),
                        RemoteEntry {
                            name: rest.to_string(),
                            path: entry_path(rest),
                            entry_type: EntryType::File,
                            sha: object.sha.clone(),
                            size: object.content.len() as u64,
                        },
                    );
                }
            }
        }

        if entries.is_empty() {
            return Err(RelayError::NotFound {
                path: path.to_string(),
            });
        }

        Ok(entries.into_values().take(PAGE_SIZE).collect())
    }

    async fn latest_commit(&self, target: &RepoTarget, path: &str) -> Result<Option<CommitInfo>> {
        let key = object_key(target, path);
        let store = self.store.read().await;
        Ok(store
            .commits
            .iter()
            .rev()
            .find(|c| c.key == key)
            .map(|c| CommitInfo {
                message: c.message.clone(),
                date: c.date.clone(),
            }))
    }

    async fn verify_credential(&self, token: Option<&str>) -> Result<String> {
        match token {
            Some(t) if !t.trim().is_empty() => Ok(self.login.clone()),
            _ => Err(RelayError::CredentialMissing),
        }
    }

    fn identifier(&self) -> String {
        "memory://".to_string()
    }
}
