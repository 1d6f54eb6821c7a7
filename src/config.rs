use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::types::RepoTarget;

pub const DEFAULT_OWNER: &str = "pipbestcom";
pub const DEFAULT_REPO: &str = "piccom";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_TARGET_DIR: &str = "public/mweb/";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://pic.pipbest.com/";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const COMMIT_MESSAGE_PREFIX: &str = "Upload by PicCom";
pub const MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;

const TOKEN_PLACEHOLDER: &str = "your_github_token_here";

const UPLOAD_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "image/bmp",
    "application/pdf",
    "text/plain",
    "text/markdown",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

const UPLOAD_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "pdf", "txt", "md", "doc", "docx",
];

const LISTING_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico", "pdf", "txt", "md", "doc", "docx",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub repository: RepositoryConfig,
    pub upload: UploadPolicy,
    pub listing: ListingPolicy,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root of the static file browser
    pub public_dir: PathBuf,
    /// Snapshot document served at `/api/directory`
    pub directory_data: PathBuf,
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    GitHub,
    Memory,
}

#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub owner: String,
    pub name: String,
    pub branch: String,
    pub api_url: String,
    pub token: Option<String>,
    pub ca_bundle: Option<PathBuf>,
    pub ssl_verify: bool,
    pub timeout: Duration,
}

/// Limits and allow-lists applied to every upload
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub default_dir: String,
    pub public_base_url: String,
    pub max_file_size: u64,
    pub allowed_mime_types: Vec<String>,
    pub allowed_extensions: Vec<String>,
    pub commit_prefix: String,
}

#[derive(Debug, Clone)]
pub struct ListingPolicy {
    pub default_dir: String,
    pub allowed_extensions: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            owner: DEFAULT_OWNER.to_string(),
            name: DEFAULT_REPO.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            ca_bundle: None,
            ssl_verify: true,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            default_dir: DEFAULT_TARGET_DIR.to_string(),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            max_file_size: MAX_FILE_SIZE,
            allowed_mime_types: owned(UPLOAD_MIME_TYPES),
            allowed_extensions: owned(UPLOAD_EXTENSIONS),
            commit_prefix: COMMIT_MESSAGE_PREFIX.to_string(),
        }
    }
}

impl Default for ListingPolicy {
    fn default() -> Self {
        Self {
            default_dir: DEFAULT_TARGET_DIR.to_string(),
            allowed_extensions: owned(LISTING_EXTENSIONS),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_dir: PathBuf::from("public"),
            directory_data: PathBuf::from("directory-data.json"),
            backend: BackendKind::GitHub,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            repository: RepositoryConfig::default(),
            upload: UploadPolicy::default(),
            listing: ListingPolicy::default(),
        }
    }
}


fn invalid(name: &str, value: &str) -> RelayError {
    RelayError::InvalidConfig {
        message: format!("{} has an invalid value: {}", name, value),
    }
}

/// `0`, `false`, `no` and `off` disable verification; anything else keeps it on
pub fn parse_ssl_verify(value: Option<&str>) -> bool {
    match value {
        Some(v) => !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"),
        None => true,
    }
}

/// Normalise a directory to `a/b/` form; empty input yields an empty string
pub fn normalize_dir(dir: &str) -> String {
    let trimmed = dir.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let port = match var("PORT") {
            Some(p) => p.parse().map_err(|_| invalid("PORT", &p))?,
            None => defaults.server.port,
        };
        let backend = match var("RELAY_BACKEND").as_deref() {
            None | Some("github") => BackendKind::GitHub,
            Some("memory") => BackendKind::Memory,
            Some(other) => return Err(invalid("RELAY_BACKEND", other)),
        };
        let timeout = match var("GITHUB_TIMEOUT_SECS") {
            Some(t) => Duration::from_secs(t.parse().map_err(|_| invalid("GITHUB_TIMEOUT_SECS", &t))?),
            None => defaults.repository.timeout,
        };

        let default_dir = var("UPLOAD_DEFAULT_DIR")
            .map(|d| normalize_dir(&d))
            .filter(|d| !d.is_empty())
            .unwrap_or(defaults.upload.default_dir);

        Ok(Self {
            server: ServerConfig {
                host: var("HOST").unwrap_or(defaults.server.host),
                port,
                public_dir: var("PUBLIC_DIR").map(PathBuf::from).unwrap_or(defaults.server.public_dir),
                directory_data: var("DIRECTORY_DATA")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.server.directory_data),
                backend,
            },
            repository: RepositoryConfig {
                owner: var("REPO_OWNER").unwrap_or(defaults.repository.owner),
                name: var("REPO_NAME").unwrap_or(defaults.repository.name),
                branch: var("REPO_BRANCH").unwrap_or(defaults.repository.branch),
                api_url: var("GITHUB_API_URL").unwrap_or(defaults.repository.api_url),
                token: var("GITHUB_TOKEN").filter(|t| t != TOKEN_PLACEHOLDER),
                ca_bundle: var("GITHUB_CA_BUNDLE")
                    .or_else(|| var("CURL_CA_BUNDLE"))
                    .map(PathBuf::from),
                ssl_verify: parse_ssl_verify(var("GITHUB_SSL_VERIFY").as_deref()),
                timeout,
            },
            upload: UploadPolicy {
                default_dir: default_dir.clone(),
                public_base_url: var("PUBLIC_BASE_URL").unwrap_or(defaults.upload.public_base_url),
                ..defaults.upload
            },
            listing: ListingPolicy {
                default_dir,
                ..defaults.listing
            },
        })
    }

    /// The repository uploads and deletions are written to
    pub fn default_target(&self) -> RepoTarget {
        RepoTarget::new(
            self.repository.owner.clone(),
            self.repository.name.clone(),
            self.repository.branch.clone(),
        )
    }

    pub fn token_configured(&self) -> bool {
        self.repository.token.is_some()
    }

    /// Configuration problems an operator should fix
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !self.token_configured() {
            issues.push("GitHub token not configured".to_string());
        }
        if self.repository.owner.is_empty() {
            issues.push("repository owner not configured".to_string());
        }
        if self.repository.name.is_empty() {
            issues.push("repository name not configured".to_string());
        }
        issues
    }
}
