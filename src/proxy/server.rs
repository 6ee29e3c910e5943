//! Public-listener request handling.
//!
//! # Responsibilities
//! - Build the Axum router a worker serves on the public port
//! - Drive the per-request state machine:
//!   resolve → pre-process → authenticate → dispatch → post-process → record
//! - Emit exactly one Transaction per request to the post-transaction sink
//!
//! # Design Decisions
//! - The routing snapshot is captured once, at the resolving step; in-flight
//!   requests finish against the snapshot they started with
//! - Error responses carry fixed, documented body texts
//! - Transaction response headers are only added at debug log level

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{CONTENT_TYPE, HOST, USER_AGENT, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::sync::{mpsc, watch};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::error::ProxyError;
use crate::observability::metrics::record_response;
use crate::proxy::auth::authenticate;
use crate::proxy::dispatch::{select_target, Dispatcher, UpstreamBody, UpstreamResponse};
use crate::proxy::middleware::{run_pipeline, MiddlewareRegistry, MiddlewareState};
use crate::proxy::transaction::{CacheOutcome, Transaction};
use crate::routing::matcher::match_route;
use crate::routing::schema::{CachePolicy, Route, RoutingTable, Target};

/// Requests with larger bodies are rejected with 413 before any processing.
const MAX_REQUEST_BODY_BYTES: usize = 32 * 1024 * 1024;

/// State injected into the request handler. One per worker.
#[derive(Clone)]
pub struct WorkerState {
    pub worker_id: usize,
    pub table: watch::Receiver<Arc<RoutingTable>>,
    pub registry: Arc<MiddlewareRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub sink: mpsc::Sender<Transaction>,
    pub default_timeout_ms: u64,
}

/// Build the Axum router served on the public listener.
pub fn build_router(state: WorkerState) -> Router {
    Router::new()
        .route("/", any(proxy_handler))
        .route("/{*path}", any(proxy_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Main proxy handler; executes the request state machine.
async fn proxy_handler(
    State(state): State<WorkerState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (parts, raw_body) = request.into_parts();
    let method = parts.method;
    let uri = parts.uri;

    let host_raw = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let host = strip_port(&host_raw).to_owned();
    let path = uri.path().to_owned();
    let query = uri.query().map(str::to_owned);

    let full_url = format!(
        "http://{host_raw}{}",
        uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    );
    let user_agent = parts
        .headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let mut transaction =
        Transaction::begin(addr.ip().to_string(), method.to_string(), full_url, user_agent);

    tracing::debug!(
        transaction_id = %transaction.id,
        worker = state.worker_id,
        method = %method,
        host = %host,
        path = %path,
        "Handling request"
    );

    // 1. Resolve against the snapshot captured right now.
    transaction.start_resolving();
    let snapshot = state.table.borrow().clone();
    let route = match_route(&host, &path, &snapshot).cloned();
    transaction.end_resolving();

    let Some(route) = route else {
        transaction.cancel("route_match");
        return finish(
            &state,
            transaction,
            text_response(StatusCode::NOT_FOUND, "Route not found"),
        )
        .await;
    };
    transaction.cache = cache_outcome(&route);

    // 2. Buffer the request body; middlewares and dispatch both need it.
    let mut req_headers = parts.headers;
    let mut req_body = match axum::body::to_bytes(raw_body, MAX_REQUEST_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return finish(
                &state,
                transaction,
                text_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"),
            )
            .await;
        }
    };
    transaction.request_bytes = req_body.len() as u64;

    // 3. Pre-processing.
    let pre_keys = route
        .middlewares
        .as_ref()
        .map(|m| m.pre.as_slice())
        .unwrap_or_default();
    if !pre_keys.is_empty() {
        transaction.start_preprocessing();
        let pipeline_state =
            MiddlewareState::new(transaction.clone(), req_headers.clone(), req_body.clone());
        let outcome = run_pipeline(&state.registry, pre_keys, pipeline_state).await;
        transaction.end_preprocessing();

        if let Some(reason) = outcome.cancelled {
            transaction.cancel(reason);
            return finish(
                &state,
                transaction,
                text_response(StatusCode::BAD_REQUEST, "Request cancelled"),
            )
            .await;
        }
        // The pipeline's view becomes authoritative.
        req_headers = outcome.state.headers;
        req_body = outcome.state.body;
    }

    // 4. Authenticate. Runs after pre-processing so middlewares may inject
    //    credentials.
    if let Some(policy) = &route.authentication {
        if let Err(challenge) = authenticate(policy, &req_headers, &host) {
            let mut response = text_response(StatusCode::UNAUTHORIZED, "Unauthorized");
            if let Ok(value) = HeaderValue::from_str(&challenge.header_value()) {
                response.headers.insert(WWW_AUTHENTICATE, value);
            }
            return finish(&state, transaction, response).await;
        }
    }

    // 5. Dispatch.
    let timeout_ms = route.timeout_ms.unwrap_or(state.default_timeout_ms);
    let target = select_target(&route).clone();
    let post_keys = route
        .middlewares
        .as_ref()
        .map(|m| m.post.as_slice())
        .unwrap_or_default();

    transaction.start_target_request(target.type_name());
    let dispatched = match &target {
        Target::Forward(forward) => {
            state
                .dispatcher
                .forward(
                    forward,
                    &route.path,
                    &path,
                    query.as_deref(),
                    method.clone(),
                    req_headers,
                    req_body,
                    timeout_ms,
                )
                .await
        }
        Target::Static(fileserver) => {
            state
                .dispatcher
                .serve_static(fileserver, &path, !post_keys.is_empty())
                .await
        }
        Target::Redirect(_) => Ok(state.dispatcher.redirect_unimplemented()),
    };
    transaction.end_target_request();

    let mut upstream = match dispatched {
        Ok(upstream) => upstream,
        Err(ProxyError::UpstreamTimeout(ms)) => {
            tracing::warn!(
                transaction_id = %transaction.id,
                timeout_ms = ms,
                "Upstream deadline expired"
            );
            transaction.cancel("timeout");
            return finish(
                &state,
                transaction,
                text_response(StatusCode::GATEWAY_TIMEOUT, "Request timed out"),
            )
            .await;
        }
        Err(err @ ProxyError::UpstreamFetchFailed(_)) => {
            tracing::error!(
                transaction_id = %transaction.id,
                error = %display_chain(&err),
                "Upstream request failed"
            );
            transaction.cancel("fetch_failed");
            return finish(
                &state,
                transaction,
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch the target URL"),
            )
            .await;
        }
        Err(ProxyError::StaticNotFound(missing)) => {
            tracing::debug!(transaction_id = %transaction.id, path = %missing, "Static file miss");
            return finish(
                &state,
                transaction,
                text_response(StatusCode::NOT_FOUND, "Not found"),
            )
            .await;
        }
        Err(err) => {
            tracing::error!(
                transaction_id = %transaction.id,
                error = %display_chain(&err),
                "Dispatch failed"
            );
            return finish(
                &state,
                transaction,
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
            )
            .await;
        }
    };

    // 6. Post-processing over the response headers and body.
    if !post_keys.is_empty() {
        transaction.start_postprocessing();
        let body_bytes = buffer_upstream_body(upstream.body).await;
        let pipeline_state =
            MiddlewareState::new(transaction.clone(), upstream.headers.clone(), body_bytes);
        let outcome = run_pipeline(&state.registry, post_keys, pipeline_state).await;
        transaction.end_postprocessing();

        if let Some(reason) = outcome.cancelled {
            // Dispatch already happened; a post-phase cancel can only mutate,
            // not unwind.
            tracing::warn!(
                transaction_id = %transaction.id,
                reason = %reason,
                "Post-processing middleware requested cancellation after dispatch"
            );
        }
        upstream.headers = outcome.state.headers;
        upstream.body = UpstreamBody::Buffered(outcome.state.body);
    }

    finish(&state, transaction, upstream).await
}

/// Finalize the transaction, record metrics, hand the record to the sink and
/// build the HTTP response.
async fn finish(
    state: &WorkerState,
    mut transaction: Transaction,
    upstream: UpstreamResponse,
) -> Response {
    let status = upstream.status;
    let mut headers = upstream.headers;
    let body = upstream.body;

    transaction.finalize(
        status.as_u16(),
        status.canonical_reason(),
        body.len(),
    );
    record_response(status.as_u16(), transaction.duration.unwrap_or(0));

    if tracing::enabled!(Level::DEBUG) {
        insert_transaction_headers(&mut headers, &transaction);
    }

    if let Err(e) = state.sink.send(transaction).await {
        tracing::warn!(error = %e, "Post-transaction sink channel closed, record dropped");
    }

    let mut builder = Response::builder().status(status);
    if let Some(response_headers) = builder.headers_mut() {
        *response_headers = headers;
    }

    let body = match body {
        UpstreamBody::Buffered(bytes) => Body::from(bytes),
        UpstreamBody::File { file, .. } => Body::from_stream(ReaderStream::new(file)),
    };

    builder.body(body).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to materialize response");
        Response::new(Body::empty())
    })
}

fn insert_transaction_headers(headers: &mut HeaderMap, transaction: &Transaction) {
    let cache = match transaction.cache {
        CacheOutcome::NoCache => "no-cache",
        CacheOutcome::Match => "match",
        CacheOutcome::Miss => "miss",
    };
    let pairs = [
        ("x-maegashira-transaction-id", transaction.id.to_string()),
        ("x-maegashira-transaction-cache", cache.to_owned()),
        (
            "x-maegashira-transaction-duration",
            transaction.duration.unwrap_or(0).to_string(),
        ),
        (
            "x-maegashira-transaction-overhead",
            transaction.total_overhead.unwrap_or(0).to_string(),
        ),
        (
            "x-maegashira-transaction-overhead-percentage",
            format!("{:.2}", transaction.overhead_pct.unwrap_or(0.0)),
        ),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

fn cache_outcome(route: &Route) -> CacheOutcome {
    match &route.cache {
        None | Some(CachePolicy::NoCache) => CacheOutcome::NoCache,
        // Reserved: no cache lookup is performed yet, so every request under
        // a basic policy is a miss.
        Some(CachePolicy::Basic(_)) => CacheOutcome::Miss,
    }
}

fn text_response(status: StatusCode, body: &'static str) -> UpstreamResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    UpstreamResponse {
        status,
        headers,
        body: UpstreamBody::Buffered(Bytes::from_static(body.as_bytes())),
    }
}

async fn buffer_upstream_body(body: UpstreamBody) -> Bytes {
    match body {
        UpstreamBody::Buffered(bytes) => bytes,
        UpstreamBody::File { mut file, len } => {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::with_capacity(len as usize);
            if file.read_to_end(&mut buf).await.is_err() {
                buf.clear();
            }
            Bytes::from(buf)
        }
    }
}

/// Host header without the port part. Handles bracketed IPv6 literals.
fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(host);
    }
    host.split(':').next().unwrap_or(host)
}

fn display_chain(err: &ProxyError) -> String {
    use std::error::Error;
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_port_handles_common_forms() {
        assert_eq!(strip_port("localhost:18080"), "localhost");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:8080"), "::1");
    }

    #[test]
    fn cache_outcome_defaults_to_no_cache() {
        let route = Route {
            hostname: "localhost".into(),
            path: String::new(),
            timeout_ms: None,
            middlewares: None,
            load_balancing: None,
            authentication: None,
            cache: None,
            targets: vec![],
        };
        assert_eq!(cache_outcome(&route), CacheOutcome::NoCache);
    }
}
