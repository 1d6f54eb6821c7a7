use std::sync::Arc;

use tracing::info;

use crate::{
    backend::StorageBackend,
    error::{RelayError, Result},
    types::{DeleteRequest, RepoTarget},
};

/// Removes a stored file given its current version token
#[derive(Clone)]
pub struct DeletionHandler {
    backend: Arc<dyn StorageBackend>,
    target: RepoTarget,
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl DeletionHandler {
    pub fn new(backend: Arc<dyn StorageBackend>, target: RepoTarget) -> Self {
        Self { backend, target }
    }

    /// Both `path` and `sha` are checked before the backend is contacted
    pub async fn handle(&self, request: DeleteRequest) -> Result<()> {
        let (Some(path), Some(sha)) = (
            required(request.path.as_deref()),
            required(request.sha.as_deref()),
        ) else {
            return Err(RelayError::MissingParameters);
        };

        let path = path.trim_start_matches('/');
        let message = request
            .message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Delete file: {}", path));

        self.backend
            .delete_content(&self.target, path, sha, &message)
            .await?;
        info!(path, "file deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use bytes::Bytes;

    fn target() -> RepoTarget {
        RepoTarget::new("o", "r", "main")
    }

    #[tokio::test]
    async fn test_missing_parameters() {
        let backend = Arc::new(MemoryBackend::new());
        let handler = DeletionHandler::new(backend.clone(), target());

        let err = handler
            .handle(DeleteRequest {
                path: Some("a.png".into()),
                sha: None,
                message: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingParameters));

        let err = handler
            .handle(DeleteRequest {
                path: Some(" ".into()),
                sha: Some("abc".into()),
                message: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MissingParameters));
        assert_eq!(backend.commit_count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_with_default_message() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .put_content(&target(), "img/a.png", Bytes::from("x"), "create", None)
            .await
            .unwrap();
        let sha = backend.fetch_metadata(&target(), "img/a.png").await.unwrap().sha;

        let handler = DeletionHandler::new(backend.clone(), target());
        handler
            .handle(DeleteRequest {
                path: Some("/img/a.png".into()),
                sha: Some(sha),
                message: None,
            })
            .await
            .unwrap();

        assert!(backend.get_metadata(&target(), "img/a.png").await.is_none());
        let commit = backend.latest_commit(&target(), "img/a.png").await.unwrap().unwrap();
        assert_eq!(commit.message, "Delete file: img/a.png");
    }

    #[tokio::test]
    async fn test_stale_token_fails() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .put_content(&target(), "a.png", Bytes::from("x"), "create", None)
            .await
            .unwrap();

        let handler = DeletionHandler::new(backend, target());
        let err = handler
            .handle(DeleteRequest {
                path: Some("a.png".into()),
                sha: Some("stale".into()),
                message: Some("remove".into()),
            })
            .await
            .unwrap_err();
        assert!(err.is_remote_status());
    }
}
