//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryStrategy;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Public listener configuration.
    pub listener: ListenerConfig,

    /// Management API configuration.
    pub api: ApiConfig,

    /// Clustering / transaction-queue configuration.
    pub cluster: ClusterConfig,

    /// Service-discovery configuration.
    pub discovery: DiscoveryConfig,

    /// Default upstream deadline in milliseconds for routes without their
    /// own `timeout_ms`.
    pub timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            api: ApiConfig::default(),
            cluster: ClusterConfig::default(),
            discovery: DiscoveryConfig::default(),
            timeout_ms: 5000,
            log_level: "info".to_string(),
        }
    }
}

/// Public listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub hostname: String,
    pub port: u16,

    /// Worker count. 0 means one per available core; positive values are
    /// capped at the available parallelism.
    pub workers: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 8080,
            workers: 0,
        }
    }
}

/// Management API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub hostname: String,
    pub port: u16,

    /// Bearer token expected in the `Authorization` header.
    pub key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hostname: "127.0.0.1".to_string(),
            port: 8081,
            // WARNING: placeholder, override in production.
            key: "change-me".to_string(),
        }
    }
}

/// Clustering configuration. When enabled, transactions are delivered to the
/// Redis-backed queue instead of the structured log.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClusterConfig {
    pub clustering: bool,
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
        }
    }
}

/// Service-discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub strategy: DiscoveryStrategy,

    /// Poll interval for the `docker` strategy.
    pub refresh_interval_ms: u64,

    /// Docker daemon socket path.
    pub docker_socket: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            strategy: DiscoveryStrategy::None,
            refresh_interval_ms: 10_000,
            docker_socket: "/var/run/docker.sock".to_string(),
        }
    }
}

impl ProxyConfig {
    pub fn public_addr(&self) -> String {
        format!("{}:{}", self.listener.hostname, self.listener.port)
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.hostname, self.api.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ProxyConfig::default();
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.api.port, 8081);
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.cluster.redis.port, 6379);
        assert!(!config.cluster.clustering);
        assert_eq!(config.discovery.strategy, DiscoveryStrategy::None);
    }
}
