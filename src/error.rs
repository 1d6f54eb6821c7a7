use thiserror::Error;

/// Errors that can occur while relaying files to the storage backend
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("no valid file received")]
    MissingFile,

    #[error("file exceeds the size limit ({size} bytes, max {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("unsupported file type: {0}")]
    UnsupportedMimeType(String),

    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),

    #[error("missing required parameters")]
    MissingParameters,

    #[error("credential not configured")]
    CredentialMissing,

    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Content not found: {path}")]
    NotFound { path: String },

    #[error("Rate limited by remote service: {message}")]
    RateLimited { message: String },

    #[error("{context}: {message}")]
    Backend { context: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl RelayError {
    /// Bad or missing input from the caller, rejected before any backend call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingFile
                | Self::FileTooLarge { .. }
                | Self::UnsupportedMimeType(_)
                | Self::UnsupportedExtension(_)
                | Self::MissingParameters
        )
    }

    /// The backend was reached and answered with a non-success status
    pub fn is_remote_status(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::RateLimited { .. } | Self::Backend { .. }
        )
    }

    /// Failures that are not attributable to the request or the backend
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Serialization(_) | Self::InvalidConfig { .. }
        )
    }

    pub(crate) fn backend(context: &str, message: impl Into<String>) -> Self {
        Self::Backend {
            context: context.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(RelayError::MissingFile.is_validation());
        assert!(RelayError::MissingParameters.is_validation());
        assert!(RelayError::FileTooLarge { size: 2, limit: 1 }.is_validation());
        assert!(!RelayError::CredentialMissing.is_validation());
        assert!(!RelayError::backend("upload failed", "conflict").is_validation());
    }

    #[test]
    fn test_remote_status_classification() {
        assert!(RelayError::NotFound { path: "a".into() }.is_remote_status());
        assert!(RelayError::backend("delete failed", "sha mismatch").is_remote_status());
        assert!(!RelayError::CredentialMissing.is_remote_status());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            RelayError::CredentialMissing.to_string(),
            "credential not configured"
        );
        assert_eq!(
            RelayError::backend("upload failed", "Invalid request").to_string(),
            "upload failed: Invalid request"
        );
    }
}
