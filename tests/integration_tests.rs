/// End-to-end tests for the relay endpoint
///
/// The router runs against an in-memory backend wrapped in a call counter,
/// so no network access is needed.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use pic_relay::{
    create_router, AppState, CommitInfo, Config, FileMetadata, MemoryBackend, RemoteEntry,
    RepoTarget, StorageBackend,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "relay-test-boundary";

// Counts every backend call so tests can assert nothing was sent
struct CountingBackend {
    inner: MemoryBackend,
    calls: AtomicUsize,
}

impl CountingBackend {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageBackend for CountingBackend {
    async fn fetch_metadata(&self, target: &RepoTarget, path: &str) -> pic_relay::Result<FileMetadata> {
        self.tick();
        self.inner.fetch_metadata(target, path).await
    }

    async fn put_content(
        &self,
        target: &RepoTarget,
        path: &str,
        content: Bytes,
        message: &str,
        previous_sha: Option<&str>,
    ) -> pic_relay::Result<String> {
        self.tick();
        self.inner.put_content(target, path, content, message, previous_sha).await
    }

    async fn delete_content(
        &self,
        target: &RepoTarget,
        path: &str,
        sha: &str,
        message: &str,
    ) -> pic_relay::Result<()> {
        self.tick();
        self.inner.delete_content(target, path, sha, message).await
    }

    async fn list_directory(&self, target: &RepoTarget, path: &str) -> pic_relay::Result<Vec<RemoteEntry>> {
        self.tick();
        self.inner.list_directory(target, path).await
    }

    async fn latest_commit(&self, target: &RepoTarget, path: &str) -> pic_relay::Result<Option<CommitInfo>> {
        self.tick();
        self.inner.latest_commit(target, path).await
    }

    async fn verify_credential(&self, token: Option<&str>) -> pic_relay::Result<String> {
        self.tick();
        self.inner.verify_credential(token).await
    }

    fn identifier(&self) -> String {
        "counting".to_string()
    }
}

fn app_with(config: Config) -> (axum::Router, Arc<CountingBackend>) {
    let backend = Arc::new(CountingBackend::new());
    let state = AppState::new(config, backend.clone());
    (create_router(state), backend)
}

fn app() -> (axum::Router, Arc<CountingBackend>) {
    app_with(Config::default())
}

fn multipart_body(file_name: &str, content_type: &str, content: &[u8], path: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");
    if let Some(path) = path {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"path\"\r\n\r\n{path}\r\n").as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .header("user-agent", "MWeb/4.5")
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_upload_photo_to_default_dir() {
    let (app, _) = app();
    let body = multipart_body("photo.JPG", "image/jpeg", b"jpeg bytes", None);

    let (status, json) = send(&app, upload_request("/upload", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let path = json["path"].as_str().unwrap();
    let name = json["name"].as_str().unwrap();
    assert!(path.starts_with("public/mweb/"));
    assert!(name.ends_with(".jpg"));
    assert_eq!(path, format!("public/mweb/{}", name));
    assert_eq!(json["url"], format!("https://pic.pipbest.com/{}", path));
    assert_eq!(json["size"], 10);
    assert!(json.get("debug").is_none());
}

#[tokio::test]
async fn test_upload_then_list_recovers_original_name() {
    let (app, _) = app();
    let body = multipart_body("holiday.png", "image/png", b"png", Some("/albums/2024/"));

    let (status, uploaded) = send(&app, upload_request("/upload?debug=1", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(uploaded["path"].as_str().unwrap().starts_with("albums/2024/"));
    assert_eq!(uploaded["debug"]["is_mweb"], true);
    assert_eq!(uploaded["debug"]["overwritten"], false);

    let (status, listed) = send(&app, get("/upload?action=list&path=albums")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["success"], true);

    let files = listed["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["type"], "file");
    assert_eq!(files[0]["original_name"], "holiday.png");
    assert_eq!(files[0]["path"], uploaded["path"]);
    assert_eq!(files[0]["name"], uploaded["name"]);
    assert!(!files[0]["upload_time"].as_str().unwrap().is_empty());
    assert!(!files[0]["sha"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_rejects_extension_even_with_allowed_mime() {
    let (app, backend) = app();
    let body = multipart_body("tool.exe", "image/png", b"MZ", None);

    let (status, json) = send(&app, upload_request("/upload", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("extension"));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_upload_size_boundary() {
    let mut config = Config::default();
    config.upload.max_file_size = 1024;
    let (app, _) = app_with(config);

    let exact = multipart_body("a.txt", "text/plain", &vec![b'a'; 1024], None);
    let (status, _) = send(&app, upload_request("/upload", exact)).await;
    assert_eq!(status, StatusCode::OK);

    let over = multipart_body("a.txt", "text/plain", &vec![b'a'; 1025], None);
    let (status, json) = send(&app, upload_request("/upload", over)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("size limit"));
}

#[tokio::test]
async fn test_upload_without_file() {
    let (app, _) = app();
    let body = format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"path\"\r\n\r\nx\r\n--{BOUNDARY}--\r\n");

    let (status, json) = send(&app, upload_request("/upload", body.into_bytes())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "no valid file received");
}

#[tokio::test]
async fn test_list_empty_directory() {
    let (app, _) = app();
    let (status, json) = send(&app, get("/upload?action=list&path=public/mweb")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({ "success": true, "files": [] }));
}

#[tokio::test]
async fn test_delete_missing_sha_makes_no_backend_call() {
    let (app, backend) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/upload?action=delete")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"path":"public/mweb/a.png"}"#))
        .unwrap();

    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "missing required parameters");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_file_info_then_delete() {
    let (app, _) = app();
    let body = multipart_body("notes.md", "text/markdown", b"# notes", None);
    let (_, uploaded) = send(&app, upload_request("/upload", body)).await;
    let path = uploaded["path"].as_str().unwrap().to_string();

    let (status, info) = send(&app, get(&format!("/upload?action=file_info&path={}", path))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["path"], path.as_str());
    let sha = info["sha"].as_str().unwrap().to_string();

    let delete = Request::builder()
        .method("POST")
        .uri("/upload?action=delete")
        .body(Body::from(serde_json::json!({ "path": path, "sha": sha }).to_string()))
        .unwrap();
    let (status, json) = send(&app, delete).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let (status, json) = send(&app, get(&format!("/upload?action=file_info&path={}", path))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_test_token() {
    let (app, _) = app();

    let (status, json) = send(&app, get("/upload?action=test_token&token=abc")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["login"], "local");

    let (status, json) = send(&app, get("/upload?action=test_token")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "credential not configured");
}

#[tokio::test]
async fn test_diagnostics_and_method_handling() {
    let (app, _) = app();

    let (status, json) = send(&app, get("/upload?check")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["github_token_configured"], false);
    assert_eq!(json["repo_owner"], "pipbestcom");
    assert_eq!(json["target_dir"], "public/mweb/");
    assert_eq!(json["issues"].as_array().unwrap().len(), 1);

    let (status, json) = send(&app, get("/upload")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(json["success"], false);

    let options = Request::builder()
        .method("OPTIONS")
        .uri("/upload")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(options).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_directory_data_endpoint() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("directory-data.json");

    let mut config = Config::default();
    config.server.directory_data = data.clone();
    let (app, _) = app_with(config);

    let (status, json) = send(&app, get("/api/directory")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Failed to load directory data");

    std::fs::write(&data, r#"{"docs/":{"type":"folder","children":{}}}"#).unwrap();
    let (status, json) = send(&app, get("/api/directory")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["docs/"]["type"], "folder");
}

#[tokio::test]
async fn test_malformed_query_gets_json_error() {
    let (app, backend) = app();

    let (status, json) = send(&app, get("/upload?action=list&action=list")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("duplicate field"));

    let body = multipart_body("a.png", "image/png", b"x", None);
    let (status, json) = send(&app, upload_request("/upload?debug=1&debug=2", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_body_over_request_limit_reports_size() {
    let mut config = Config::default();
    config.upload.max_file_size = 1024;
    let (app, backend) = app_with(config);

    let huge = multipart_body("a.png", "image/png", &vec![0u8; 2 * 1024 * 1024], None);
    let (status, json) = send(&app, upload_request("/upload", huge)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("size limit"));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_file_info_on_directory() {
    let (app, _) = app();
    let body = multipart_body("cat.png", "image/png", b"png", None);
    let (status, _) = send(&app, upload_request("/upload", body)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, get("/upload?action=file_info&path=public/mweb/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["path"], "public/mweb/");
    assert!(json["sha"].is_null());
}
