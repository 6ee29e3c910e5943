//! Target dispatch.
//!
//! # Responsibilities
//! - Select one target from a matched route
//! - Execute `forward` against a remote origin with an abortable deadline
//! - Execute `static` against a local directory with traversal protection
//!
//! # Design Decisions
//! - Forward responses are surfaced decoded (`Content-Encoding: identity`);
//!   re-encoding is out of scope
//! - Redirects are followed upstream to depth 20
//! - Static bodies stream from disk unless post-processing needs the bytes

use std::path::{Component, Path, PathBuf};

use axum::http::header::{
    ACCEPT_ENCODING, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONNECTION,
    CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING, USER_AGENT,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use rand::Rng;
use tokio::time::Duration;

use crate::error::{ProxyError, Result};
use crate::routing::schema::{ForwardTarget, LoadBalancing, Route, StaticTarget, Target};

/// `User-Agent` presented to upstream origins.
pub const PRODUCT: &str = concat!("maegashira/", env!("CARGO_PKG_VERSION"));

/// Response body produced by a dispatch.
pub enum UpstreamBody {
    Buffered(Bytes),
    /// Open file handle plus its length, for streaming.
    File {
        file: tokio::fs::File,
        len: u64,
    },
}

impl UpstreamBody {
    pub fn len(&self) -> u64 {
        match self {
            UpstreamBody::Buffered(bytes) => bytes.len() as u64,
            UpstreamBody::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a successful dispatch.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

/// Pick the target a request is dispatched to.
///
/// A single target is always selected directly. Multiple targets are picked
/// uniformly at random; an unknown strategy tag falls back to the same with
/// a warning.
pub fn select_target(route: &Route) -> &Target {
    if route.targets.len() == 1 {
        return &route.targets[0];
    }
    if route.load_balancing == Some(LoadBalancing::Unknown) {
        tracing::warn!(
            hostname = %route.hostname,
            "Unknown load-balancing strategy, falling back to random selection"
        );
    }
    let idx = rand::thread_rng().gen_range(0..route.targets.len());
    &route.targets[idx]
}

/// Upstream URL for a forward dispatch: the matched prefix is stripped from
/// the request path and the remainder (plus query) is appended to the target
/// URL.
pub fn build_upstream_url(target_url: &str, route_path: &str, path: &str, query: Option<&str>) -> String {
    let stripped = path.strip_prefix(route_path).unwrap_or(path);
    let mut url = String::with_capacity(target_url.len() + stripped.len() + 8);
    url.push_str(target_url);
    url.push_str(stripped);
    if let Some(q) = query {
        url.push('?');
        url.push_str(q);
    }
    url
}

/// Executes dispatches. One instance is shared by all workers.
pub struct Dispatcher {
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(20))
            .build()
            .map_err(|e| ProxyError::ServerInternal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Forward the request to a remote origin.
    ///
    /// The call is armed with `timeout_ms`; on expiry the upstream future is
    /// dropped and the caller maps the error to 504.
    pub async fn forward(
        &self,
        target: &ForwardTarget,
        route_path: &str,
        path: &str,
        query: Option<&str>,
        method: Method,
        headers: HeaderMap,
        body: Bytes,
        timeout_ms: u64,
    ) -> Result<UpstreamResponse> {
        let url = build_upstream_url(&target.url, route_path, path, query);

        let mut outbound = headers;
        // The client re-derives these for the upstream connection. Leaving
        // the inbound accept-encoding in place would also disable the
        // client's own decompression.
        outbound.remove(HOST);
        outbound.remove(CONTENT_LENGTH);
        outbound.remove(CONNECTION);
        outbound.remove(ACCEPT_ENCODING);
        outbound.insert(USER_AGENT, HeaderValue::from_static(PRODUCT));

        let request = self
            .client
            .request(method, url)
            .headers(outbound)
            .body(body);

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, bytes))
        };

        let (status, upstream_headers, bytes) =
            match tokio::time::timeout(Duration::from_millis(timeout_ms), exchange).await {
                Ok(Ok(parts)) => parts,
                Ok(Err(e)) => return Err(ProxyError::UpstreamFetchFailed(e)),
                Err(_) => return Err(ProxyError::UpstreamTimeout(timeout_ms)),
            };

        let mut headers = upstream_headers;
        // The body below is the decoded, re-buffered payload.
        headers.remove(CONTENT_LENGTH);
        headers.remove(TRANSFER_ENCODING);
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("*"));

        Ok(UpstreamResponse {
            status,
            headers,
            body: UpstreamBody::Buffered(bytes),
        })
    }

    /// Serve a file from the target directory.
    ///
    /// `buffer` forces the body into memory (needed when post-processing
    /// middlewares will run); otherwise the file handle is handed back for
    /// streaming.
    pub async fn serve_static(
        &self,
        target: &StaticTarget,
        path: &str,
        buffer: bool,
    ) -> Result<UpstreamResponse> {
        let resolved = resolve_static_path(Path::new(&target.directory), path, target.index_file())
            .await
            .ok_or_else(|| ProxyError::StaticNotFound(path.to_owned()))?;

        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|_| ProxyError::StaticNotFound(path.to_owned()))?;
        if !metadata.is_file() {
            return Err(ProxyError::StaticNotFound(path.to_owned()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(content_type_for(&resolved)),
        );

        let body = if buffer {
            let bytes = tokio::fs::read(&resolved).await?;
            UpstreamBody::Buffered(Bytes::from(bytes))
        } else {
            let file = tokio::fs::File::open(&resolved).await?;
            UpstreamBody::File {
                file,
                len: metadata.len(),
            }
        };

        Ok(UpstreamResponse {
            status: StatusCode::OK,
            headers,
            body,
        })
    }

    /// Reserved target type.
    pub fn redirect_unimplemented(&self) -> UpstreamResponse {
        UpstreamResponse {
            status: StatusCode::NOT_IMPLEMENTED,
            headers: HeaderMap::new(),
            body: UpstreamBody::Buffered(Bytes::from_static(b"Not implemented")),
        }
    }
}

/// Resolve `directory + path (+ index)` and reject anything that escapes the
/// directory after normalization.
async fn resolve_static_path(directory: &Path, path: &str, index: &str) -> Option<PathBuf> {
    let relative = path.trim_start_matches('/');

    // Cheap rejection before touching the filesystem.
    if Path::new(relative)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }

    let mut candidate = directory.join(relative);
    if relative.is_empty() || path.ends_with('/') {
        candidate = candidate.join(index);
    }

    let root = tokio::fs::canonicalize(directory).await.ok()?;
    let resolved = tokio::fs::canonicalize(&candidate).await.ok()?;
    resolved.starts_with(&root).then_some(resolved)
}

/// Built-in content-type table, keyed by file extension.
fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        _ => "application/octet-stream",
    }
}
