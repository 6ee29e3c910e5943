//! Routing-table store.
//!
//! # Responsibilities
//! - Own the single current snapshot
//! - Validate candidates before they become visible
//! - Propagate accepted snapshots to every worker, in order
//! - Warm the host resolver for forward targets after a swap
//!
//! # Design Decisions
//! - `ArcSwap` gives wait-free readers; the swap is atomic so a reader sees
//!   either the old snapshot or the new one, never a partial table
//! - Propagation rides a `watch` channel: workers observe updates in the
//!   order the store accepted them, and a late subscriber immediately sees
//!   the current value
//! - DNS prefetch failures are logged and otherwise ignored

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use url::Url;

use crate::error::{ProxyError, Result};
use crate::routing::schema::{RoutingTable, Target};
use crate::routing::validation::validate_table;

/// Validated, versioned snapshot store for the routing table.
pub struct RoutingStore {
    current: ArcSwap<RoutingTable>,
    tx: watch::Sender<Arc<RoutingTable>>,
}

impl RoutingStore {
    /// Create a store holding an empty table.
    pub fn new() -> Self {
        let initial = Arc::new(RoutingTable::default());
        let (tx, _) = watch::channel(initial.clone());
        Self {
            current: ArcSwap::new(initial),
            tx,
        }
    }

    /// Current snapshot. Empty table if `set` was never called.
    pub fn get(&self) -> Arc<RoutingTable> {
        self.current.load_full()
    }

    /// Validate and atomically install a candidate table.
    ///
    /// On success the snapshot is propagated to all subscribers and the
    /// unique forward hosts are submitted for DNS warming.
    pub fn set(&self, candidate: RoutingTable) -> Result<()> {
        let errors = validate_table(&candidate);
        if !errors.is_empty() {
            return Err(ProxyError::InvalidRoutingTable(errors));
        }

        let snapshot = Arc::new(candidate);
        self.current.store(snapshot.clone());
        let _ = self.tx.send(snapshot.clone());

        tracing::info!(routes = snapshot.len(), "Routing table replaced");
        prefetch_dns(&snapshot);
        Ok(())
    }

    /// Subscribe to snapshot propagation. The receiver starts at the current
    /// snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RoutingTable>> {
        self.tx.subscribe()
    }

    /// Re-send the current snapshot to all subscribers.
    ///
    /// Covers the race where a freshly respawned worker subscribed while an
    /// update was in flight.
    pub fn rebroadcast(&self) {
        let _ = self.tx.send(self.current.load_full());
    }
}

impl Default for RoutingStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Submit the unique set of forward-target hosts to the resolver.
fn prefetch_dns(table: &RoutingTable) {
    let mut hosts = HashSet::new();
    for route in &table.routes {
        for target in &route.targets {
            if let Target::Forward(forward) = target {
                if let Ok(url) = Url::parse(&forward.url) {
                    if let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default())
                    {
                        hosts.insert(format!("{host}:{port}"));
                    }
                }
            }
        }
    }

    for host in hosts {
        tokio::spawn(async move {
            if let Err(e) = tokio::net::lookup_host(&host).await {
                tracing::debug!(host = %host, error = %e, "DNS prefetch failed");
            }
        });
    }
}
