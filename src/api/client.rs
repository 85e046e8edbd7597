//! HTTP client for the indexing API.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upload    | `POST /index` (multipart `file` + `update`) |
//! | search    | `POST /search` (JSON) |
//! | list      | `GET /files/?prefix=` |
//! | download  | `GET /files/{name}` |
//! | delete    | `DELETE /index/{name}` |

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::TransportError;
use crate::config::{Settings, SharedSettings};
use crate::watcher::Uploader;

/// Response body of `POST /index`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub job_id: String,
}

/// Response body of `DELETE /index/{name}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DeleteResponse {
    pub job_id: String,
}

/// Response body of `GET /files/`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ListFilesResponse {
    pub files: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
    score_threshold: f64,
}

/// Response body of `POST /search`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchHit {
    pub score: f64,
    pub payload: ChunkPayload,
}

/// Indexed chunk a search hit points at.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChunkPayload {
    pub file_path: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub chunk_index: usize,
}

/// Client for the indexing API.
///
/// Reads the API URL and key from the shared settings snapshot on every
/// request, so a config reload takes effect without rebuilding the client.
pub struct ApiClient {
    http: reqwest::Client,
    /// Used for loopback URLs only: no proxy, self-signed certificates accepted.
    local_http: reqwest::Client,
    settings: SharedSettings,
}

impl ApiClient {
    /// Create a client bound to a live settings snapshot.
    pub fn new(settings: SharedSettings) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().build()?;
        let local_http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .build()?;

        Ok(Self {
            http,
            local_http,
            settings,
        })
    }

    /// Create a client from a fixed settings value.
    pub fn from_settings(settings: Settings) -> Result<Self, TransportError> {
        Self::new(Arc::new(parking_lot::RwLock::new(Arc::new(settings))))
    }

    /// Start an authenticated request to `{api_url}/{segments...}`.
    ///
    /// Segments are percent-encoded, so remote file names can be passed as-is.
    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, TransportError> {
        let settings = Arc::clone(&self.settings.read());
        if settings.api_key.is_empty() {
            return Err(TransportError::MissingApiKey);
        }

        let invalid = |reason: String| TransportError::InvalidUrl {
            url: settings.api_url.clone(),
            reason,
        };
        let mut url = Url::parse(&settings.api_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(segments);

        let client = if is_local_url(&settings.api_url) {
            &self.local_http
        } else {
            &self.http
        };

        crate::debug_event!("api", "request", "{method} {url}");
        Ok(client
            .request(method, url)
            .header("X-API-Key", &settings.api_key))
    }

    /// Upload a file to `POST {api_url}/index`.
    ///
    /// `update` tells the server to replace an existing entry for the file.
    pub async fn upload_file(
        &self,
        path: &Path,
        update: bool,
    ) -> Result<UploadResponse, TransportError> {
        let request = self.request(Method::POST, &["index"])?;

        let absolute = std::path::absolute(path).map_err(|source| TransportError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let bytes = tokio::fs::read(&absolute)
            .await
            .map_err(|source| TransportError::ReadFile {
                path: absolute.clone(),
                source,
            })?;

        let form = Form::new()
            .part(
                "file",
                Part::bytes(bytes).file_name(remote_file_name(&absolute)),
            )
            .text("update", update.to_string());

        decode(request.multipart(form)).await
    }

    /// Semantic search over indexed files.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        score_threshold: f64,
    ) -> Result<SearchResponse, TransportError> {
        let body = SearchRequest {
            query,
            limit,
            score_threshold,
        };
        decode(self.request(Method::POST, &["search"])?.json(&body)).await
    }

    /// List indexed files, optionally only those whose name starts with `prefix`.
    pub async fn list_files(&self, prefix: Option<&str>) -> Result<ListFilesResponse, TransportError> {
        let mut request = self.request(Method::GET, &["files", ""])?;
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            request = request.query(&[("prefix", prefix)]);
        }
        decode(request).await
    }

    /// Remove a file and its index data.
    pub async fn delete_file(&self, name: &str) -> Result<DeleteResponse, TransportError> {
        decode(self.request(Method::DELETE, &["index", name])?).await
    }

    /// Download a stored file to `dest`. Returns the number of bytes written.
    pub async fn download_file(&self, name: &str, dest: &Path) -> Result<u64, TransportError> {
        let response = check_status(self.request(Method::GET, &["files", name])?.send().await?).await?;
        let bytes = response.bytes().await?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|source| TransportError::WriteFile {
                path: dest.to_path_buf(),
                source,
            })?;
        Ok(bytes.len() as u64)
    }
}

/// Send a request and decode its JSON body.
async fn decode<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, TransportError> {
    let response = check_status(request.send().await?).await?;
    Ok(response.json::<T>().await?)
}

/// Turn a non-2xx response into [`TransportError::Status`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Uploader for ApiClient {
    async fn upload(&self, path: &Path) -> Result<(), TransportError> {
        let response = self.upload_file(path, true).await?;
        crate::log_event!("api", "queued", "{} job {}", path.display(), response.job_id);
        Ok(())
    }
}

/// Name a file is stored under remotely: the absolute path with the leading
/// separator dropped and every separator replaced by `_`.
pub fn remote_file_name(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim_start_matches(['/', '\\']);
    trimmed.replace(['/', '\\'], "_")
}

/// Certificate checks are skipped only when the host is exactly a loopback name.
fn is_local_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(|host| matches!(host, "localhost" | "127.0.0.1")))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_remote_file_name() {
        assert_eq!(
            remote_file_name(Path::new("/home/user/docs/a.txt")),
            "home_user_docs_a.txt"
        );
        assert_eq!(remote_file_name(Path::new("relative/b.txt")), "relative_b.txt");
    }

    #[test]
    fn test_is_local_url() {
        assert!(is_local_url("https://localhost"));
        assert!(is_local_url("http://127.0.0.1:8000"));
        assert!(is_local_url("https://localhost:8443/api"));
        assert!(!is_local_url("https://api.example.com"));
    }

    #[test]
    fn test_lookalike_hosts_are_not_local() {
        assert!(!is_local_url("https://localhost.attacker.example"));
        assert!(!is_local_url("https://127.0.0.1.nip.io"));
        assert!(!is_local_url("https://evil.example/?next=://localhost"));
        assert!(!is_local_url("not a url"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_request() {
        let client = ApiClient::from_settings(Settings::default()).unwrap();
        let result = client.upload_file(Path::new("/nonexistent"), true).await;
        assert!(matches!(result, Err(TransportError::MissingApiKey)));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_read_error() {
        let mut settings = Settings::default();
        settings.api_key = "key".to_string();
        let client = ApiClient::from_settings(settings).unwrap();

        let temp_dir = TempDir::new().unwrap();
        let result = client
            .upload_file(&temp_dir.path().join("missing.txt"), true)
            .await;
        assert!(matches!(result, Err(TransportError::ReadFile { .. })));
    }

    /// Accept one HTTP request, return its raw text, reply with `response`.
    async fn serve_once(listener: TcpListener, response: impl AsRef<str>) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }

        socket.write_all(response.as_ref().as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_with_api_key() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 16\r\nConnection: close\r\n\r\n{\"job_id\":\"j-1\"}",
        ));

        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("report.txt");
        fs::write(&file, "quarterly numbers").unwrap();

        let mut settings = Settings::default();
        settings.api_url = format!("http://{addr}");
        settings.api_key = "secret-key".to_string();
        let client = ApiClient::from_settings(settings).unwrap();

        let response = client.upload_file(&file, true).await.unwrap();
        assert_eq!(response.job_id, "j-1");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /index "));
        assert!(request.to_ascii_lowercase().contains("x-api-key: secret-key"));
        assert!(request.contains(&remote_file_name(&file)));
        assert!(request.contains("quarterly numbers"));
        assert!(request.contains("name=\"update\""));
    }

    #[tokio::test]
    async fn test_upload_non_success_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: 11\r\nConnection: close\r\n\r\nbad api key",
        ));

        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("x.txt");
        fs::write(&file, "x").unwrap();

        let mut settings = Settings::default();
        settings.api_url = format!("http://{addr}");
        settings.api_key = "wrong".to_string();
        let client = ApiClient::from_settings(settings).unwrap();

        let result = client.upload_file(&file, false).await;
        server.await.unwrap();

        match result {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad api key");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    fn client_for(addr: std::net::SocketAddr) -> ApiClient {
        let mut settings = Settings::default();
        settings.api_url = format!("http://{addr}");
        settings.api_key = "secret-key".to_string();
        ApiClient::from_settings(settings).unwrap()
    }

    fn json_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[tokio::test]
    async fn test_search_posts_query_and_decodes_hits() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            json_response(
                r#"{"results":[{"score":0.91,"payload":{"file_path":"home_a.txt","text":"deploy","start":0,"end":6,"chunk_index":2}}]}"#,
            ),
        ));

        let response = client_for(addr).search("how to deploy", 3, 0.5).await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("POST /search "));
        assert!(request.contains(r#""query":"how to deploy""#));
        assert!(request.contains(r#""limit":3"#));
        assert!(request.contains(r#""score_threshold":0.5"#));
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].payload.file_path, "home_a.txt");
        assert_eq!(response.results[0].payload.chunk_index, 2);
    }

    #[tokio::test]
    async fn test_list_files_sends_prefix() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            json_response(r#"{"files":["docs_a.txt","docs_b.txt"],"count":2}"#),
        ));

        let response = client_for(addr).list_files(Some("docs_")).await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("GET /files/?prefix=docs_ "));
        assert_eq!(response.count, 2);
        assert_eq!(response.files, vec!["docs_a.txt", "docs_b.txt"]);
    }

    #[tokio::test]
    async fn test_delete_encodes_file_name() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener, json_response(r#"{"job_id":"d-7"}"#)));

        let response = client_for(addr).delete_file("my notes.txt").await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("DELETE /index/my%20notes.txt "));
        assert_eq!(response.job_id, "d-7");
    }

    #[tokio::test]
    async fn test_download_writes_body_to_destination() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nfile bodies",
        ));

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out.txt");
        let written = client_for(addr)
            .download_file("home_a.txt", &dest)
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("GET /files/home_a.txt "));
        assert_eq!(written, 11);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "file bodies");
    }

    #[tokio::test]
    async fn test_download_not_found_leaves_no_file() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found",
        ));

        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("out.txt");
        let result = client_for(addr).download_file("missing.txt", &dest).await;
        server.await.unwrap();

        assert!(matches!(result, Err(TransportError::Status { status: 404, .. })));
        assert!(!dest.exists());
    }
}
