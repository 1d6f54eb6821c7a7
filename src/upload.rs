use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    backend::StorageBackend,
    config::{normalize_dir, UploadPolicy},
    error::{RelayError, Result},
    provenance,
    types::{EntryType, RepoTarget, UploadReceipt, UploadRequest, UploadedFile},
};

const FALLBACK_EXTENSION: &str = "png";

/// Validates inbound files and writes them under a generated name
#[derive(Clone)]
pub struct UploadHandler {
    backend: Arc<dyn StorageBackend>,
    policy: UploadPolicy,
    target: RepoTarget,
}

/// Lower-cased text after the last dot of the name, empty if there is none
pub fn extension_of(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match base.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Random UUID name keeping the original extension, or `png` without one
pub fn generated_name(original_name: &str) -> String {
    let ext = extension_of(original_name);
    let ext = if ext.is_empty() { FALLBACK_EXTENSION.to_string() } else { ext };
    format!("{}.{}", Uuid::new_v4(), ext)
}

impl UploadHandler {
    pub fn new(backend: Arc<dyn StorageBackend>, policy: UploadPolicy, target: RepoTarget) -> Self {
        Self {
            backend,
            policy,
            target,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Size, MIME type and extension checks; all must pass
    pub fn validate<'a>(&self, file: Option<&'a UploadedFile>) -> Result<&'a UploadedFile> {
        let file = file.ok_or(RelayError::MissingFile)?;

        let size = file.content.len() as u64;
        if size > self.policy.max_file_size {
            return Err(RelayError::FileTooLarge {
                size,
                limit: self.policy.max_file_size,
            });
        }

        if !self.policy.allowed_mime_types.iter().any(|m| *m == file.content_type) {
            return Err(RelayError::UnsupportedMimeType(file.content_type.clone()));
        }

        let ext = extension_of(&file.file_name);
        if !self.policy.allowed_extensions.iter().any(|e| *e == ext) {
            return Err(RelayError::UnsupportedExtension(ext));
        }

        Ok(file)
    }

    /// Caller-supplied directory in `a/b/` form, or the configured default
    pub fn target_dir(&self, requested: Option<&str>) -> String {
        requested
            .map(normalize_dir)
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| self.policy.default_dir.clone())
    }

    pub fn public_url(&self, stored_path: &str) -> String {
        format!("{}{}", self.policy.public_base_url, stored_path)
    }

    pub async fn handle(&self, request: UploadRequest) -> Result<UploadReceipt> {
        let file = self.validate(request.file.as_ref())?;
        let dir = self.target_dir(request.target_dir.as_deref());
        let name = generated_name(&file.file_name);
        self.store(file, &dir, name).await
    }

    /// Write a validated file at `dir + name`, replacing any existing version
    async fn store(&self, file: &UploadedFile, dir: &str, name: String) -> Result<UploadReceipt> {
        let path = format!("{}{}", dir, name);
        info!(original = %file.file_name, %path, "uploading file");

        // Only a retried request can hit an existing path
        let existing = self
            .backend
            .get_metadata(&self.target, &path)
            .await
            .filter(|m| m.kind == EntryType::File);
        let previous_sha = existing.as_ref().map(|m| m.sha.as_str());
        if previous_sha.is_some() {
            debug!(%path, "overwriting existing version");
        }

        let message = provenance::upload_message(
            &self.policy.commit_prefix,
            &file.file_name,
            &name,
            previous_sha.is_some(),
        );

        let stored = self
            .backend
            .put_content(&self.target, &path, file.content.clone(), &message, previous_sha)
            .await?;

        let receipt = UploadReceipt {
            url: self.public_url(&stored),
            path: stored,
            name,
            size: file.content.len() as u64,
            overwritten: existing.is_some(),
        };
        info!(url = %receipt.url, "upload complete");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use bytes::Bytes;

    fn handler(backend: Arc<MemoryBackend>) -> UploadHandler {
        UploadHandler::new(
            backend,
            UploadPolicy::default(),
            RepoTarget::new("o", "r", "main"),
        )
    }

    fn file(name: &str, mime: &str, len: usize) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: mime.to_string(),
            content: Bytes::from(vec![0u8; len]),
        }
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("photo.JPG"), "jpg");
        assert_eq!(extension_of("archive.tar.GZ"), "gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of("dir.v2/notes"), "");
    }

    #[test]
    fn test_generated_name() {
        let name = generated_name("photo.JPG");
        assert!(name.ends_with(".jpg"));
        assert_ne!(name, "photo.JPG");
        let uuid = name.trim_end_matches(".jpg");
        assert!(Uuid::parse_str(uuid).is_ok());

        assert!(generated_name("noext").ends_with(".png"));
        assert_ne!(generated_name("a.png"), generated_name("a.png"));
    }

    #[test]
    fn test_size_boundary() {
        let h = handler(Arc::new(MemoryBackend::new()));
        let limit = h.policy().max_file_size as usize;

        let exact = file("a.png", "image/png", limit);
        assert!(h.validate(Some(&exact)).is_ok());

        let over = file("a.png", "image/png", limit + 1);
        assert!(matches!(
            h.validate(Some(&over)),
            Err(RelayError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_mime_and_extension_are_independent() {
        let h = handler(Arc::new(MemoryBackend::new()));

        let bad_ext = file("script.exe", "image/png", 1);
        assert!(matches!(
            h.validate(Some(&bad_ext)),
            Err(RelayError::UnsupportedExtension(_))
        ));

        let bad_mime = file("a.png", "application/x-msdownload", 1);
        assert!(matches!(
            h.validate(Some(&bad_mime)),
            Err(RelayError::UnsupportedMimeType(_))
        ));

        // Listing accepts ico, uploads do not
        let ico = file("favicon.ico", "image/png", 1);
        assert!(h.validate(Some(&ico)).is_err());

        assert!(matches!(h.validate(None), Err(RelayError::MissingFile)));
    }

    #[test]
    fn test_target_dir() {
        let h = handler(Arc::new(MemoryBackend::new()));
        assert_eq!(h.target_dir(None), "public/mweb/");
        assert_eq!(h.target_dir(Some("  ")), "public/mweb/");
        assert_eq!(h.target_dir(Some("/notes/2024/")), "notes/2024/");
    }

    #[tokio::test]
    async fn test_upload_to_default_dir() {
        let backend = Arc::new(MemoryBackend::new());
        let h = handler(backend.clone());

        let receipt = h
            .handle(UploadRequest {
                file: Some(file("photo.JPG", "image/jpeg", 10)),
                target_dir: None,
            })
            .await
            .unwrap();

        assert!(receipt.path.starts_with("public/mweb/"));
        assert!(receipt.path.ends_with(".jpg"));
        assert_eq!(receipt.url, format!("https://pic.pipbest.com/{}", receipt.path));
        assert_eq!(receipt.size, 10);
        assert!(!receipt.overwritten);

        let target = RepoTarget::new("o", "r", "main");
        let stored = backend.read(&target, &receipt.path).await.unwrap();
        assert_eq!(stored, Bytes::from(vec![0u8; 10]));

        let commit = backend.latest_commit(&target, &receipt.path).await.unwrap().unwrap();
        assert_eq!(provenance::original_name(&commit.message), "photo.JPG");
    }

    #[tokio::test]
    async fn test_store_twice_overwrites() {
        let backend = Arc::new(MemoryBackend::new());
        let h = handler(backend.clone());
        let upload = file("cat.png", "image/png", 3);
        let target = RepoTarget::new("o", "r", "main");

        let first = h.store(&upload, "img/", "fixed.png".into()).await.unwrap();
        let first_sha = backend.fetch_metadata(&target, &first.path).await.unwrap().sha;
        let second = h.store(&upload, "img/", "fixed.png".into()).await.unwrap();
        let second_sha = backend.fetch_metadata(&target, &second.path).await.unwrap().sha;

        assert_eq!(first.path, second.path);
        assert_eq!(first.url, second.url);
        assert!(!first.overwritten);
        assert!(second.overwritten);
        assert_ne!(first_sha, second_sha);

        let commit = backend.latest_commit(&target, "img/fixed.png").await.unwrap().unwrap();
        assert!(commit.message.contains("(overwrite)"));
    }

    #[tokio::test]
    async fn test_rejected_upload_writes_nothing() {
        let backend = Arc::new(MemoryBackend::new());
        let h = handler(backend.clone());

        let err = h
            .handle(UploadRequest {
                file: Some(file("a.exe", "image/png", 1)),
                target_dir: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(backend.commit_count().await, 0);
    }
}
