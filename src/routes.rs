//! HTTP surface
//!
//! The relay endpoint (`/upload`, alias `/upload.php`) dispatches on method
//! and the `action` query parameter:
//! - `POST` multipart upload (field `file`, optional `path`)
//! - `POST ?action=delete` with a JSON body
//! - `GET ?action=list|test_token|file_info`
//! - `GET|POST ?check` / `?config` operator diagnostics
//! - `OPTIONS` preflight
//!
//! `/api/directory` serves the snapshot document and every other path falls
//! back to the static file browser.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartError, rejection::QueryRejection, DefaultBodyLimit, FromRequest,
        Multipart, Query, Request, State,
    },
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    backend::StorageBackend,
    config::Config,
    deletion::DeletionHandler,
    error::RelayError,
    listing::ListingHandler,
    types::{DeleteRequest, EntryType, RepoTarget, UploadReceipt, UploadRequest, UploadedFile},
    upload::UploadHandler,
};

/// Headroom above the upload limit so oversized files reach validation
const BODY_LIMIT_SLACK: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Arc<dyn StorageBackend>,
    pub uploads: UploadHandler,
    pub listing: ListingHandler,
    pub deletion: DeletionHandler,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn StorageBackend>) -> Self {
        let target = config.default_target();
        Self {
            uploads: UploadHandler::new(backend.clone(), config.upload.clone(), target.clone()),
            listing: ListingHandler::new(backend.clone(), config.listing.clone()),
            deletion: DeletionHandler::new(backend.clone(), target),
            config: Arc::new(config),
            backend,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RelayQuery {
    action: Option<String>,
    path: Option<String>,
    owner: Option<String>,
    repo: Option<String>,
    #[serde(rename = "ref")]
    reference: Option<String>,
    token: Option<String>,
    check: Option<String>,
    config: Option<String>,
    debug: Option<String>,
}

impl RelayQuery {
    fn wants_diagnostics(&self) -> bool {
        self.check.is_some() || self.config.is_some()
    }

    /// Repository coordinates with per-request overrides applied
    fn target(&self, config: &Config) -> RepoTarget {
        let pick = |value: &Option<String>, default: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        RepoTarget::new(
            pick(&self.owner, &config.repository.owner),
            pick(&self.repo, &config.repository.name),
            pick(&self.reference, &config.repository.branch),
        )
        .with_token(self.token.clone())
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let body_limit = state.config.upload.max_file_size as usize + BODY_LIMIT_SLACK;
    let static_files = ServeDir::new(&state.config.server.public_dir);

    let relay = get(relay_get).post(relay_post).options(preflight);

    Router::new()
        .route("/upload", relay.clone())
        .route("/upload.php", relay)
        .route("/api/directory", get(directory_data))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    reply(status, json!({ "success": false, "error": message.into() }))
}

/// The backend's own message when it answered, otherwise the error text
fn remote_message(err: &RelayError) -> String {
    match err {
        RelayError::Backend { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Malformed query strings get the same JSON envelope as every other failure
fn bad_query(rejection: QueryRejection) -> Response {
    warn!("rejected query string: {}", rejection.body_text());
    failure(StatusCode::BAD_REQUEST, rejection.body_text())
}

async fn relay_get(
    State(state): State<AppState>,
    query: Result<Query<RelayQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return bad_query(rejection),
    };

    if query.wants_diagnostics() {
        return diagnostics(&state.config);
    }

    match query.action.as_deref() {
        Some("list") => list_files(&state, &query).await,
        Some("test_token") => test_token(&state, &query).await,
        Some("file_info") => file_info(&state, &query).await,
        _ => failure(StatusCode::METHOD_NOT_ALLOWED, "only POST requests are supported"),
    }
}

async fn relay_post(
    State(state): State<AppState>,
    query: Result<Query<RelayQuery>, QueryRejection>,
    headers: HeaderMap,
    request: Request,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return bad_query(rejection),
    };

    if query.action.as_deref() == Some("delete") {
        let body = Bytes::from_request(request, &state).await.unwrap_or_default();
        return delete_file(&state, &body).await;
    }

    if query.wants_diagnostics() {
        return diagnostics(&state.config);
    }

    let (upload, form_debug) = match read_upload(request, &state).await {
        Ok(parsed) => parsed,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.uploads.handle(upload).await {
        Ok(receipt) if receipt.url.is_empty() => {
            error!("upload produced an empty URL");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "generated URL is empty, check the configuration",
            )
        }
        Ok(receipt) => {
            let mut body = json!({
                "success": true,
                "url": receipt.url,
                "name": receipt.name,
                "path": receipt.path,
                "size": receipt.size,
            });
            if query.debug.is_some() || form_debug {
                body["debug"] = debug_info(&state.config, &headers, &receipt);
            }
            reply(StatusCode::OK, body)
        }
        Err(e) if e.is_unexpected() => {
            error!("upload failed unexpectedly: {}", e);
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("internal server error: {}", e),
            )
        }
        Err(e) => {
            warn!("upload rejected: {}", e);
            failure(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

/// A body cut off by the request limit is reported as an oversized file;
/// `size` is the body limit that was hit
fn unreadable_body(err: MultipartError, limit: u64) -> RelayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RelayError::FileTooLarge {
            size: limit + BODY_LIMIT_SLACK as u64,
            limit,
        }
    } else {
        RelayError::MissingFile
    }
}

/// Pull the `file`, `path` and `debug` form fields out of a multipart body
async fn read_upload(request: Request, state: &AppState) -> Result<(UploadRequest, bool), RelayError> {
    let limit = state.config.upload.max_file_size;
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|_| RelayError::MissingFile)?;

    let mut upload = UploadRequest::default();
    let mut debug = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| unreadable_body(e, limit))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let content = field.bytes().await.map_err(|e| unreadable_body(e, limit))?;
                if !file_name.is_empty() {
                    upload.file = Some(UploadedFile {
                        file_name,
                        content_type,
                        content,
                    });
                }
            }
            Some("path") => {
                let text = field.text().await.map_err(|_| RelayError::MissingParameters)?;
                upload.target_dir = Some(text);
            }
            Some("debug") => debug = true,
            _ => {}
        }
    }

    Ok((upload, debug))
}

fn debug_info(config: &Config, headers: &HeaderMap, receipt: &UploadReceipt) -> Value {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    json!({
        "user_agent": user_agent,
        "upload_time": chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        "target_path": receipt.path,
        "is_mweb": user_agent.contains("MWeb"),
        "overwritten": receipt.overwritten,
        "repo_info": {
            "owner": config.repository.owner,
            "name": config.repository.name,
            "branch": config.repository.branch,
        },
    })
}

fn diagnostics(config: &Config) -> Response {
    reply(
        StatusCode::OK,
        json!({
            "github_token_configured": config.token_configured(),
            "repo_owner": config.repository.owner,
            "repo_name": config.repository.name,
            "target_dir": config.upload.default_dir,
            "branch": config.repository.branch,
            "public_base_url": config.upload.public_base_url,
            "url_strategy": "public base URL + stored path",
            "issues": config.issues(),
        }),
    )
}

async fn list_files(state: &AppState, query: &RelayQuery) -> Response {
    let target = query.target(&state.config);
    let path = query
        .path
        .as_deref()
        .unwrap_or_else(|| state.listing.default_dir());

    match state.listing.list(&target, path).await {
        Ok(files) => reply(StatusCode::OK, json!({ "success": true, "files": files })),
        Err(e) => {
            error!("listing failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn test_token(state: &AppState, query: &RelayQuery) -> Response {
    match state.backend.verify_credential(query.token.as_deref()).await {
        Ok(login) => reply(StatusCode::OK, json!({ "success": true, "login": login })),
        Err(e) if e.is_remote_status() => failure(StatusCode::BAD_REQUEST, remote_message(&e)),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn file_info(state: &AppState, query: &RelayQuery) -> Response {
    let Some(path) = query.path.as_deref().filter(|p| !p.trim().is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, RelayError::MissingParameters.to_string());
    };
    let target = query.target(&state.config);

    match state
        .backend
        .fetch_metadata(&target, path.trim_start_matches('/'))
        .await
    {
        Ok(meta) => {
            let sha = (meta.kind == EntryType::File).then_some(meta.sha);
            reply(
                StatusCode::OK,
                json!({ "success": true, "path": path, "sha": sha }),
            )
        }
        Err(e) => failure(StatusCode::BAD_REQUEST, remote_message(&e)),
    }
}

async fn delete_file(state: &AppState, body: &[u8]) -> Response {
    // An unreadable body is reported the same way as missing fields
    let request: DeleteRequest = serde_json::from_slice(body).unwrap_or_default();

    match state.deletion.handle(request).await {
        Ok(()) => reply(
            StatusCode::OK,
            json!({ "success": true, "message": "file deleted" }),
        ),
        Err(e) => {
            warn!("delete failed: {}", e);
            failure(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

async fn directory_data(State(state): State<AppState>) -> Response {
    let loaded = tokio::fs::read(&state.config.server.directory_data)
        .await
        .map_err(RelayError::from)
        .and_then(|raw| serde_json::from_slice::<Value>(&raw).map_err(RelayError::from));

    match loaded {
        Ok(data) => reply(StatusCode::OK, data),
        Err(e) => {
            error!("directory data unavailable: {}", e);
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Failed to load directory data" }),
            )
        }
    }
}
