//! Error types for Maegashira.

use axum::http::StatusCode;
use thiserror::Error;

use crate::routing::validation::ValidationError;

/// Main error type for the proxy.
///
/// Every variant carries a kind, a short human message, and (where one
/// exists) the inner cause, so logs at the top of the stack include the
/// full chain.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid routing table ({} error(s))", .0.len())]
    InvalidRoutingTable(Vec<ValidationError>),

    #[error("no route matched the request")]
    RouteMatchMiss,

    #[error("request cancelled by middleware '{0}'")]
    MiddlewareCancelled(String),

    #[error("authentication failed")]
    AuthFailed,

    #[error("upstream request timed out after {0} ms")]
    UpstreamTimeout(u64),

    #[error("failed to fetch the target URL")]
    UpstreamFetchFailed(#[source] reqwest::Error),

    #[error("static file not found: {0}")]
    StaticNotFound(String),

    #[error("{0}")]
    ApiUnauthorized(ApiAuthError),

    #[error("internal server error: {0}")]
    ServerInternal(String),

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("sink error")]
    Sink(#[source] redis::RedisError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// HTTP status this error surfaces as on the public listener or the
    /// management API.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRoutingTable(_) => StatusCode::BAD_REQUEST,
            ProxyError::RouteMatchMiss => StatusCode::NOT_FOUND,
            ProxyError::MiddlewareCancelled(_) => StatusCode::BAD_REQUEST,
            ProxyError::AuthFailed => StatusCode::UNAUTHORIZED,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamFetchFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::StaticNotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::ApiUnauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Management API authentication failures.
///
/// The exact message text is part of the API contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiAuthError {
    MissingHeader,
    MissingKey,
    InvalidKey,
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::MissingHeader => {
                write!(f, "Not authorized. Missing \"Authorization\" header")
            }
            ApiAuthError::MissingKey => write!(f, "Missing API key"),
            ApiAuthError::InvalidKey => write!(f, "API key invalid"),
        }
    }
}

/// Result type alias for Maegashira.
pub type Result<T> = std::result::Result<T, ProxyError>;
