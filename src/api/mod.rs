//! Management API.
//!
//! Side-channel HTTP server on its own listener: health, metrics, OpenAPI
//! document, API explorer, and the routing-table read/replace endpoints.
//! Only the `/routes` pair requires the bearer key.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::schema::ApiConfig;
use crate::error::Result;
use crate::lifecycle::Shutdown;
use crate::routing::store::RoutingStore;

use self::auth::bearer_auth_middleware;
use self::handlers::{get_explorer, get_health, get_metrics, get_openapi, get_routes, put_routes};

/// State injected into management handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<RoutingStore>,
    pub api_key: String,
    pub metrics: PrometheusHandle,
}

/// Build the management router. `/routes` is gated by the bearer key; the
/// read-only endpoints are open.
pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/routes", get(get_routes).post(put_routes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_middleware,
        ))
        .route("/health", get(get_health))
        .route("/", get(get_openapi))
        .route("/explorer", get(get_explorer))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

/// Serve the management API on a pre-bound listener until shutdown.
///
/// The primary binds the listener itself so that an unusable address is
/// fatal at startup rather than a background failure.
pub async fn serve_api(
    listener: tokio::net::TcpListener,
    config: &ApiConfig,
    store: Arc<RoutingStore>,
    metrics: PrometheusHandle,
    shutdown: Shutdown,
) -> Result<()> {
    let state = ApiState {
        store,
        api_key: config.key.clone(),
        metrics,
    };

    tracing::info!(address = %listener.local_addr()?, "Management API listening");

    let mut rx = shutdown.subscribe();
    axum::serve(listener, build_api_router(state))
        .with_graceful_shutdown(async move {
            let _ = rx.recv().await;
        })
        .await?;

    tracing::info!("Management API stopped");
    Ok(())
}
