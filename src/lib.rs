pub mod backend;
pub mod config;
pub mod deletion;
pub mod error;
pub mod github;
pub mod listing;
pub mod memory;
pub mod provenance;
pub mod routes;
pub mod snapshot;
pub mod types;
pub mod upload;

pub use backend::StorageBackend;
pub use config::{BackendKind, Config};
pub use deletion::DeletionHandler;
pub use error::{RelayError, Result};
pub use github::GitHubBackend;
pub use listing::ListingHandler;
pub use memory::MemoryBackend;
pub use routes::{create_router, AppState};
pub use snapshot::{DirectoryNode, ImageProber, PlaceholderProber, ScanOptions, Scanner};
pub use types::{
    CommitInfo, DeleteRequest, EntryType, FileMetadata, ListedFile, RemoteEntry, RepoTarget,
    UploadReceipt, UploadRequest, UploadedFile,
};
pub use upload::UploadHandler;
