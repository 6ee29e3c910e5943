//! Service discovery.
//!
//! Discovery produces a full candidate routing table each cycle and hands it
//! to the store; a failed poll logs and keeps the last accepted table.

pub mod docker;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::config::schema::DiscoveryConfig;
use crate::lifecycle::Shutdown;
use crate::routing::store::RoutingStore;

use self::docker::{routes_from_containers, DockerClient};

/// Available discovery strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryStrategy {
    #[default]
    None,
    Docker,
}

impl std::str::FromStr for DiscoveryStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(DiscoveryStrategy::None),
            "docker" => Ok(DiscoveryStrategy::Docker),
            other => Err(format!("unknown discovery strategy '{other}'")),
        }
    }
}

impl std::fmt::Display for DiscoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryStrategy::None => write!(f, "none"),
            DiscoveryStrategy::Docker => write!(f, "docker"),
        }
    }
}

/// Poll loop for the configured strategy. Returns immediately for `none`.
pub async fn run_discovery(config: DiscoveryConfig, store: Arc<RoutingStore>, shutdown: Shutdown) {
    if config.strategy == DiscoveryStrategy::None {
        return;
    }

    let client = DockerClient::new(&config.docker_socket);
    let mut interval = tokio::time::interval(Duration::from_millis(config.refresh_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut rx = shutdown.subscribe();

    tracing::info!(
        socket = %config.docker_socket,
        refresh_interval_ms = config.refresh_interval_ms,
        "Docker discovery started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match client.list_containers().await {
                    Ok(containers) => {
                        let candidate = routes_from_containers(&containers);
                        if *store.get() != candidate {
                            if let Err(e) = store.set(candidate) {
                                tracing::warn!(error = %e, "Discovered table rejected by validation");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Discovery poll failed, keeping last table");
                    }
                }
            }
            _ = rx.recv() => break,
        }
    }

    tracing::debug!("Discovery loop stopped");
}
