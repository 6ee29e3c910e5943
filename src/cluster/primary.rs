//! Primary controller.
//!
//! # Responsibilities
//! - Own the authoritative routing table and the shutdown coordinator
//! - Start the post-transaction sink and the management API
//! - Spawn N workers, supervise them, and respawn on crash
//! - Run optional service discovery
//! - Orderly shutdown: API stops, workers drain, sink flushes
//!
//! # Design Decisions
//! - Middlewares are registered on the primary before `run`; every worker
//!   shares the same immutable registry
//! - A respawned worker immediately re-receives the current table via the
//!   store's rebroadcast, covering updates that raced its subscription

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::Duration;

use crate::api::serve_api;
use crate::config::schema::ProxyConfig;
use crate::discovery::run_discovery;
use crate::error::{ProxyError, Result};
use crate::lifecycle::Shutdown;
use crate::observability::metrics::{self, record_workers_online};
use crate::proxy::dispatch::Dispatcher;
use crate::proxy::middleware::{Middleware, MiddlewareRegistry};
use crate::proxy::server::WorkerState;
use crate::routing::store::RoutingStore;
use crate::sink::redis::RedisQueue;
use crate::sink::{spawn_sink, LogSink, TransactionSink};

use super::worker::{run_worker, DRAIN_GRACE};

/// Root orchestrator for one proxy process.
pub struct Primary {
    config: ProxyConfig,
    store: Arc<RoutingStore>,
    registry: MiddlewareRegistry,
    shutdown: Shutdown,
}

impl Primary {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            store: Arc::new(RoutingStore::new()),
            registry: MiddlewareRegistry::new(),
            shutdown: Shutdown::new(),
        }
    }

    /// Register a middleware. Registration is only possible before `run`;
    /// workers see an immutable set.
    pub fn register_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.registry.register(middleware);
    }

    /// Authoritative routing store (for loading an initial table or for
    /// embedding applications that drive updates directly).
    pub fn store(&self) -> Arc<RoutingStore> {
        self.store.clone()
    }

    /// Handle that triggers graceful shutdown.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Boot the cluster and block until shutdown completes.
    pub async fn run(self) -> Result<()> {
        let Primary {
            config,
            store,
            registry,
            shutdown,
        } = self;

        let metrics_handle = metrics::handle();

        // Sink first: workers need the sender.
        let sink: Box<dyn TransactionSink> = if config.cluster.clustering {
            tracing::info!(
                redis_host = %config.cluster.redis.host,
                redis_port = config.cluster.redis.port,
                "Clustering enabled, transactions go to the Redis queue"
            );
            Box::new(RedisQueue::new(&config.cluster.redis)?)
        } else {
            Box::new(LogSink)
        };
        let (sink_tx, sink_task) = spawn_sink(sink, shutdown.subscribe());

        // Management API. Binding failures are fatal at startup.
        let api_task = if config.api.enabled {
            let listener = tokio::net::TcpListener::bind(&config.api_addr()).await?;
            let api_config = config.api.clone();
            let api_store = store.clone();
            let api_metrics = metrics_handle.clone();
            let api_shutdown = shutdown.clone();
            Some(tokio::spawn(async move {
                serve_api(listener, &api_config, api_store, api_metrics, api_shutdown).await
            }))
        } else {
            None
        };

        // Optional discovery.
        let discovery_task = tokio::spawn(run_discovery(
            config.discovery.clone(),
            store.clone(),
            shutdown.clone(),
        ));

        // Workers.
        let public_addr = resolve_addr(&config.public_addr()).await?;
        let worker_count = resolve_worker_count(config.listener.workers);
        let dispatcher = Arc::new(Dispatcher::new()?);
        let registry = Arc::new(registry);

        let spawn_state = |id: usize| WorkerState {
            worker_id: id,
            table: store.subscribe(),
            registry: registry.clone(),
            dispatcher: dispatcher.clone(),
            sink: sink_tx.clone(),
            default_timeout_ms: config.timeout_ms,
        };

        let mut workers: JoinSet<Result<()>> = JoinSet::new();
        let mut worker_ids: HashMap<tokio::task::Id, usize> = HashMap::new();
        for id in 0..worker_count {
            let handle = workers.spawn(run_worker(id, public_addr, spawn_state(id), shutdown.clone()));
            worker_ids.insert(handle.id(), id);
        }
        record_workers_online(worker_count);
        tracing::info!(
            address = %public_addr,
            workers = worker_count,
            "Cluster online"
        );

        // Supervision loop.
        let mut rx = shutdown.subscribe();
        loop {
            tokio::select! {
                // Checked first so a worker draining on shutdown is not
                // mistaken for a crash and respawned.
                biased;
                reason = rx.recv() => {
                    tracing::info!(reason = ?reason.ok(), "Stop requested");
                    break;
                }
                Some(joined) = workers.join_next_with_id() => {
                    let id = match &joined {
                        Ok((task_id, _)) => worker_ids.remove(task_id),
                        Err(join_error) => worker_ids.remove(&join_error.id()),
                    }
                    .unwrap_or_default();

                    if shutdown.is_triggered() {
                        // Teardown already underway; this exit is a drain,
                        // not a crash.
                        continue;
                    }

                    match joined {
                        Ok((_, Ok(()))) => {
                            tracing::warn!(worker = id, "Worker exited unexpectedly, respawning");
                        }
                        Ok((_, Err(e))) => {
                            tracing::error!(worker = id, error = %e, "Worker failed, respawning");
                        }
                        Err(e) => {
                            tracing::error!(worker = id, error = %e, "Worker panicked, respawning");
                        }
                    }

                    let handle =
                        workers.spawn(run_worker(id, public_addr, spawn_state(id), shutdown.clone()));
                    worker_ids.insert(handle.id(), id);
                    // Cover the race where the update landed while the worker
                    // was being replaced.
                    store.rebroadcast();
                }
            }
        }

        tracing::info!(reason = ?shutdown.reason(), "Shutting down");

        // 1. Management API goes first; it observes the same shutdown signal.
        if let Some(task) = api_task {
            match tokio::time::timeout(Duration::from_secs(2), task).await {
                Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Management API shutdown error"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Management API task failed"),
                Err(_) => tracing::warn!("Management API did not stop in time"),
                _ => {}
            }
        }

        // 2. Workers drain for the grace period, then get aborted.
        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!("Drain grace expired, aborting remaining workers");
            workers.shutdown().await;
        }
        record_workers_online(0);

        // 3. Flush the sink queue.
        drop(sink_tx);
        if tokio::time::timeout(Duration::from_secs(2), sink_task)
            .await
            .is_err()
        {
            tracing::warn!("Sink flush did not finish in time");
        }

        let _ = discovery_task.await;

        tracing::info!("Shutdown complete");
        Ok(())
    }
}

/// 0 means one worker per available core; positive values are capped at the
/// available parallelism.
fn resolve_worker_count(configured: usize) -> usize {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match configured {
        0 => parallelism,
        n => n.min(parallelism),
    }
}

async fn resolve_addr(addr: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| ProxyError::ServerInternal(format!("'{addr}' resolved to no address")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_workers_means_available_parallelism() {
        let n = resolve_worker_count(0);
        assert!(n >= 1);
    }

    #[test]
    fn explicit_count_is_capped() {
        let parallelism = std::thread::available_parallelism().unwrap().get();
        assert_eq!(resolve_worker_count(1), 1);
        assert!(resolve_worker_count(parallelism * 8) <= parallelism);
    }

    #[tokio::test]
    async fn resolves_localhost() {
        let addr = resolve_addr("localhost:18099").await.unwrap();
        assert_eq!(addr.port(), 18099);
    }
}
