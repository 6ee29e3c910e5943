//! Middleware registry and pipeline.
//!
//! # Data Flow
//! ```text
//! Route lists middleware keys per phase
//!     → registry lookup (unknown keys are logged and skipped)
//!     → handlers run in listed order, state threaded through
//!     → Next: state becomes the proxy's authoritative view
//!     → Cancel: pipeline stops, dispatch is skipped (pre phase)
//! ```
//!
//! # Design Decisions
//! - Handlers are trait objects registered once at worker startup; the
//!   registry is immutable afterwards
//! - The same state shape serves both phases: request headers/body before
//!   dispatch, response headers/body after

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use bytes::Bytes;

use crate::proxy::transaction::Transaction;

/// What the pipeline should do after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Next,
    Cancel,
}

/// State threaded through a middleware phase.
///
/// In the pre phase `headers`/`body` are the request's; in the post phase
/// they are the response's. `transaction` is a read snapshot of the request
/// telemetry so far.
pub struct MiddlewareState {
    pub transaction: Transaction,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub action: Action,
    pub cancellation_reason: Option<String>,
}

impl MiddlewareState {
    pub fn new(transaction: Transaction, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            transaction,
            headers,
            body,
            action: Action::Next,
            cancellation_reason: None,
        }
    }
}

/// A user-registered handler participating in a processing phase.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Key routes use to opt into this handler.
    fn key(&self) -> &str;

    async fn handle(&self, state: MiddlewareState) -> MiddlewareState;
}

/// Set of middlewares known to a worker, keyed by name.
#[derive(Default)]
pub struct MiddlewareRegistry {
    handlers: HashMap<String, Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A later registration under the same key replaces
    /// the earlier one.
    pub fn register(&mut self, middleware: Arc<dyn Middleware>) {
        self.handlers
            .insert(middleware.key().to_owned(), middleware);
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn Middleware>> {
        self.handlers.get(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Result of running one phase.
pub struct PipelineOutcome {
    pub state: MiddlewareState,
    /// Cancellation reason when some handler cancelled the pipeline.
    pub cancelled: Option<String>,
}

/// Run the listed handlers in order, feeding each handler's output state to
/// the next. Unknown keys are skipped with a warning.
pub async fn run_pipeline(
    registry: &MiddlewareRegistry,
    keys: &[String],
    mut state: MiddlewareState,
) -> PipelineOutcome {
    for key in keys {
        let Some(handler) = registry.get(key) else {
            tracing::warn!(middleware = %key, "Unknown middleware key, skipping");
            continue;
        };

        state = handler.handle(state).await;

        if state.action == Action::Cancel {
            let reason = state
                .cancellation_reason
                .clone()
                .unwrap_or_else(|| format!("middleware_cancelled:{key}"));
            return PipelineOutcome {
                state,
                cancelled: Some(reason),
            };
        }
    }

    PipelineOutcome {
        state,
        cancelled: None,
    }
}
