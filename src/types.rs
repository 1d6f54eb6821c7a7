use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Repository coordinates a backend call operates on
///
/// Uploads and deletions always use the configured repository; listing and
/// file lookups may override every field per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
    pub owner: String,
    pub repo: String,
    /// Branch, tag or commit to read from and write to
    pub reference: String,
    /// Per-request credential; falls back to the configured one when absent
    pub token: Option<String>,
}

impl RepoTarget {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            reference: reference.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }
}

/// Current version of a stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub path: String,
    /// Opaque version token; changes on every overwrite
    pub sha: String,
    pub size: u64,
    /// Directories carry no version token
    pub kind: EntryType,
}

/// Type of a remote directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
}

/// Represents an entry in a remote directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    /// Repository-relative path
    pub path: String,
    pub entry_type: EntryType,
    pub sha: String,
    pub size: u64,
}

/// The most recent version record touching a path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitInfo {
    pub message: String,
    /// Committer timestamp as reported by the backend
    pub date: String,
}

/// A file reported by the listing handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedFile {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub original_name: String,
    pub upload_time: String,
    pub path: String,
    pub sha: String,
    pub size: u64,
}

/// A file received from a client, held only for the duration of one request
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub content: Bytes,
}

/// Inbound upload: the file (if any) and an optional target directory
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub file: Option<UploadedFile>,
    pub target_dir: Option<String>,
}

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub url: String,
    pub path: String,
    pub name: String,
    pub size: u64,
    /// Whether an existing version at the generated path was replaced
    pub overwritten: bool,
}

/// Body of a deletion request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteRequest {
    pub path: Option<String>,
    pub sha: Option<String>,
    pub message: Option<String>,
}
