use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::{Certificate, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    backend::StorageBackend,
    config::RepositoryConfig,
    error::{RelayError, Result},
    types::{CommitInfo, EntryType, FileMetadata, RemoteEntry, RepoTarget},
};

const USER_AGENT: &str = "pic-relay/1.0";
const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: &str = "100";

/// GitHub-backed storage
///
/// Talks to the GitHub REST API:
/// - `contents` endpoints for metadata, create/update and delete
/// - `commits` for the history of a path
/// - `user` for credential checks
#[derive(Clone)]
pub struct GitHubBackend {
    client: Client,
    api_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct GitHubContent {
    name: String,
    path: String,
    #[serde(default)]
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "type")]
    entry_type: String,
}

#[derive(Deserialize)]
struct GitHubCommitEntry {
    commit: GitHubCommit,
}

#[derive(Deserialize)]
struct GitHubCommit {
    #[serde(default)]
    message: String,
    committer: Option<GitHubCommitter>,
}

#[derive(Deserialize)]
struct GitHubCommitter {
    #[serde(default)]
    date: String,
}

#[derive(Deserialize)]
struct GitHubUser {
    #[serde(default)]
    login: String,
}

#[derive(Deserialize)]
struct GitHubMessage {
    message: Option<String>,
}

#[derive(Serialize)]
struct PutContentBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Serialize)]
struct DeleteContentBody<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

impl GitHubBackend {
    /// Create a new GitHub backend from the repository configuration
    ///
    /// Honours the CA bundle override and the TLS verification toggle.
    pub fn new(config: &RepositoryConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout);

        if !config.ssl_verify {
            warn!("TLS certificate verification is disabled for GitHub requests");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(bundle) = &config.ca_bundle {
            let bad_bundle = |detail: String| RelayError::InvalidConfig {
                message: format!("unreadable CA bundle {}: {}", bundle.display(), detail),
            };
            let pem = std::fs::read(bundle).map_err(|e| bad_bundle(e.to_string()))?;
            let certs = Certificate::from_pem_bundle(&pem).map_err(|e| bad_bundle(e.to_string()))?;
            if certs.is_empty() {
                return Err(bad_bundle("no certificates found".to_string()));
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder.build().map_err(|e| RelayError::InvalidConfig {
            message: format!("failed to build HTTP client: {}", e),
        })?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Build the contents API URL for a path
    fn contents_url(&self, target: &RepoTarget, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url,
            urlencoding::encode(&target.owner),
            urlencoding::encode(&target.repo),
            encode_path(path)
        )
    }

    fn commits_url(&self, target: &RepoTarget) -> String {
        format!(
            "{}/repos/{}/{}/commits",
            self.api_url,
            urlencoding::encode(&target.owner),
            urlencoding::encode(&target.repo)
        )
    }

    /// Pick the request credential, falling back to the configured one
    fn resolve_token<'a>(&'a self, requested: Option<&'a str>) -> Result<&'a str> {
        requested
            .filter(|t| !t.trim().is_empty())
            .or(self.token.as_deref())
            .ok_or(RelayError::CredentialMissing)
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Check if a status is a rate limit response
    fn is_rate_limit_error(response: &Response) -> bool {
        let exhausted = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");
        response.status() == StatusCode::TOO_MANY_REQUESTS
            || (response.status() == StatusCode::FORBIDDEN && exhausted)
    }

    /// Turn a non-success response into an error carrying the backend message
    async fn remote_error(response: Response, path: &str, context: &str, read: bool) -> RelayError {
        let status = response.status();
        let rate_limited = Self::is_rate_limit_error(&response);
        let message = response_message(response).await;
        warn!(%status, path, "GitHub request failed: {}", message);

        if rate_limited {
            RelayError::RateLimited { message }
        } else if read && status == StatusCode::NOT_FOUND {
            RelayError::NotFound {
                path: path.to_string(),
            }
        } else {
            RelayError::backend(context, message)
        }
    }
}

/// Percent-encode each segment of a repository path, keeping the separators
fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

async fn response_message(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<GitHubMessage>(&body)
        .ok()
        .and_then(|m| m.message)
        .unwrap_or_else(|| "unknown error".to_string())
}

#[async_trait]
impl StorageBackend for GitHubBackend {
    async fn fetch_metadata(&self, target: &RepoTarget, path: &str) -> Result<FileMetadata> {
        let token = self.resolve_token(target.token.as_deref())?;
        let url = self.contents_url(target, path);

        let response = self
            .authorized(self.client.get(&url), token)
            .query(&[("ref", target.reference.as_str())])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::remote_error(response, path, "lookup failed", true).await);
        }

        // A directory path answers with its listing
        let value: serde_json::Value = response.json().await?;
        if value.is_array() {
            return Ok(FileMetadata {
                path: path.trim_matches('/').to_string(),
                sha: String::new(),
                size: 0,
                kind: EntryType::Dir,
            });
        }

        let content: GitHubContent = serde_json::from_value(value)?;
        Ok(FileMetadata {
            path: content.path,
            sha: content.sha,
            size: content.size,
            kind: EntryType::File,
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
        let token = self.resolve_token(target.token.as_deref())?;
        let url = self.contents_url(target, path);
        let body = PutContentBody {
            message,
            content: STANDARD.encode(&content),
            branch: &target.reference,
            sha: previous_sha,
        };

        debug!(path, bytes = content.len(), update = previous_sha.is_some(), "PUT contents");
        let response = self
            .authorized(self.client.put(&url), token)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(path.to_string()),
            _ => Err(Self::remote_error(response, path, "upload failed", false).await),
        }
    }

    async fn delete_content(
        &self,
        target: &RepoTarget,
        path: &str,
        sha: &str,
        message: &str,
    ) -> Result<()> {
        let token = self.resolve_token(target.token.as_deref())?;
        let url = self.contents_url(target, path);
        let body = DeleteContentBody {
            message,
            sha,
            branch: &target.reference,
        };

        let response = self
            .authorized(self.client.delete(&url), token)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            _ => Err(Self::remote_error(response, path, "delete failed", false).await),
        }
    }

    async fn list_directory(&self, target: &RepoTarget, path: &str) -> Result<Vec<RemoteEntry>> {
        let token = self.resolve_token(target.token.as_deref())?;
        let url = self.contents_url(target, path);

        let response = self
            .authorized(self.client.get(&url), token)
            .query(&[("ref", target.reference.as_str()), ("per_page", PAGE_SIZE)])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::remote_error(response, path, "lookup failed", true).await);
        }

        // A file path answers with a single object instead of an array
        let value: serde_json::Value = response.json().await?;
        let api_entries: Vec<GitHubContent> = match value {
            serde_json::Value::Array(_) => serde_json::from_value(value)?,
            _ => Vec::new(),
        };

        Ok(api_entries
            .into_iter()
            .filter_map(|e| {
                let entry_type = match e.entry_type.as_str() {
                    "file" => EntryType::File,
                    "dir" => EntryType::Dir,
                    // Symlinks and submodules are not listed
                    _ => return None,
                };
                Some(RemoteEntry {
                    name: e.name,
                    path: e.path,
                    entry_type,
                    sha: e.sha,
                    size: e.size,
                })
            })
            .collect())
    }

    async fn latest_commit(&self, target: &RepoTarget, path: &str) -> Result<Option<CommitInfo>> {
        let token = self.resolve_token(target.token.as_deref())?;
        let path = path.trim_matches('/');

        let mut request = self
            .authorized(self.client.get(self.commits_url(target)), token)
            .query(&[("path", path)]);
        if !target.reference.is_empty() {
            request = request.query(&[("sha", target.reference.as_str())]);
        }
        let response = request.send().await?;

        if response.status() != StatusCode::OK {
            warn!(status = %response.status(), path, "commit history unavailable");
            return Ok(None);
        }

        let commits: Vec<GitHubCommitEntry> = match response.json().await {
            Ok(commits) => commits,
            Err(e) => {
                warn!(path, "malformed commit history: {}", e);
                return Ok(None);
            }
        };

        Ok(commits.into_iter().next().map(|entry| CommitInfo {
            message: entry.commit.message,
            date: entry.commit.committer.map(|c| c.date).unwrap_or_default(),
        }))
    }

    async fn verify_credential(&self, token: Option<&str>) -> Result<String> {
        let token = self.resolve_token(token)?;
        let url = format!("{}/user", self.api_url);

        let response = self.authorized(self.client.get(&url), token).send().await?;

        if response.status() != StatusCode::OK {
            let message = response_message(response).await;
            return Err(RelayError::backend("token verification failed", message));
        }

        let user: GitHubUser = response.json().await?;
        Ok(user.login)
    }

    fn identifier(&self) -> String {
        format!("github://{}", self.api_url)
    }
}
