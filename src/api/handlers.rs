//! Management API handlers.

use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::json;

use crate::api::ApiState;
use crate::error::ProxyError;
use crate::observability::metrics::record_table_update;
use crate::routing::schema::RoutingTable;

pub async fn get_health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Current routing table as JSON.
pub async fn get_routes(State(state): State<ApiState>) -> Json<RoutingTable> {
    Json((*state.store.get()).clone())
}

/// Replace the routing table. The body is a candidate table; schema or
/// semantic failures return the structured error list.
pub async fn put_routes(State(state): State<ApiState>, body: Bytes) -> Response {
    let candidate: RoutingTable = match serde_json::from_slice(&body) {
        Ok(table) => table,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!([{
                    "route": 0,
                    "field": "<body>",
                    "message": format!("invalid routing table document: {e}"),
                }])),
            )
                .into_response();
        }
    };

    match state.store.set(candidate) {
        Ok(()) => {
            record_table_update();
            (StatusCode::OK, "OK").into_response()
        }
        Err(ProxyError::InvalidRoutingTable(errors)) => {
            (StatusCode::BAD_REQUEST, Json(errors)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Routing-table replacement failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Prometheus text exposition, aggregated across all workers.
pub async fn get_metrics(State(state): State<ApiState>) -> Response {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
        .into_response()
}

/// OpenAPI description of this API.
pub async fn get_openapi() -> Json<serde_json::Value> {
    Json(json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Maegashira Management API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Side-channel for health, metrics and live routing-table updates."
        },
        "paths": {
            "/health": {
                "get": {
                    "summary": "Liveness probe",
                    "responses": {"200": {"description": "Proxy is up"}}
                }
            },
            "/metrics": {
                "get": {
                    "summary": "Cluster-aggregated metrics in Prometheus text format",
                    "responses": {"200": {"description": "Metrics snapshot"}}
                }
            },
            "/routes": {
                "get": {
                    "summary": "Current routing table",
                    "security": [{"bearer": []}],
                    "responses": {
                        "200": {"description": "Routing table as a JSON array"},
                        "401": {"description": "Missing or invalid API key"}
                    }
                },
                "post": {
                    "summary": "Replace the routing table",
                    "security": [{"bearer": []}],
                    "requestBody": {"description": "Candidate table (JSON array of routes)"},
                    "responses": {
                        "200": {"description": "Table accepted and broadcast"},
                        "400": {"description": "Validation errors (structured list)"},
                        "401": {"description": "Missing or invalid API key"}
                    }
                }
            },
            "/explorer": {
                "get": {
                    "summary": "HTML API explorer",
                    "responses": {"200": {"description": "Explorer page"}}
                }
            }
        },
        "components": {
            "securitySchemes": {
                "bearer": {"type": "http", "scheme": "bearer"}
            }
        }
    }))
}

pub async fn get_explorer() -> Html<&'static str> {
    Html(EXPLORER_HTML)
}

const EXPLORER_HTML: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>Maegashira API explorer</title>
<style>
  body { font-family: ui-monospace, monospace; margin: 2rem; }
  input { width: 24rem; }
  pre { background: #f4f4f4; padding: 1rem; overflow: auto; }
  button { margin-right: .5rem; }
</style>
</head>
<body>
<h1>Maegashira API explorer</h1>
<p>API key: <input id="key" type="password" placeholder="Bearer key for /routes"></p>
<p>
  <button onclick="call('GET','/health')">GET /health</button>
  <button onclick="call('GET','/metrics')">GET /metrics</button>
  <button onclick="call('GET','/routes')">GET /routes</button>
  <button onclick="call('GET','/')">GET / (OpenAPI)</button>
</p>
<p>POST /routes body:</p>
<textarea id="body" rows="8" cols="80">[]</textarea><br>
<button onclick="call('POST','/routes',document.getElementById('body').value)">POST /routes</button>
<pre id="out">—</pre>
<script>
async function call(method, path, body) {
  const headers = {};
  const key = document.getElementById('key').value;
  if (key) headers['Authorization'] = 'Bearer ' + key;
  if (body) headers['Content-Type'] = 'application/json';
  const res = await fetch(path, { method, headers, body });
  const text = await res.text();
  document.getElementById('out').textContent = res.status + ' ' + res.statusText + '\n\n' + text;
}
</script>
</body>
</html>
"#;
