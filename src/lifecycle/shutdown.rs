//! Shutdown coordination.
//!
//! The primary drives an ordered teardown: management API first, then worker
//! drain, then sink flush. This coordinator carries the stop reason to every
//! subscribed task and records it so the supervision loop can tell a
//! draining worker from a crashed one.

use std::sync::{Arc, OnceLock};

use tokio::sync::broadcast;

/// Why the cluster is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Operator request: SIGINT/SIGTERM, or an embedding application's stop.
    Signal,
    /// A core task failed in a way the primary cannot recover from.
    Fault,
}

/// Coordinator for the cluster's graceful stop.
///
/// The API server, workers, discovery loop and sink drain all subscribe;
/// the signal listener and the primary trigger. The first reason sticks.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<ShutdownReason>,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Subscribe to the stop signal. The received value is the stop reason.
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.tx.subscribe()
    }

    /// Begin the stop. The first caller's reason wins; later triggers are
    /// no-ops, so a fault observed mid-teardown cannot restart it.
    pub fn trigger(&self, reason: ShutdownReason) {
        if self.reason.set(reason).is_ok() {
            tracing::debug!(?reason, "Shutdown triggered");
            let _ = self.tx.send(reason);
        }
    }

    /// Whether a stop is underway. The supervision loop consults this before
    /// treating a finished worker as a crash.
    pub fn is_triggered(&self) -> bool {
        self.reason.get().is_some()
    }

    /// The recorded stop reason, once one exists.
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_the_reason() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        shutdown.trigger(ShutdownReason::Signal);
        assert_eq!(rx.recv().await.unwrap(), ShutdownReason::Signal);
    }

    #[tokio::test]
    async fn first_reason_sticks() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());

        shutdown.trigger(ShutdownReason::Fault);
        shutdown.trigger(ShutdownReason::Signal);

        assert!(shutdown.is_triggered());
        assert_eq!(shutdown.reason(), Some(ShutdownReason::Fault));
    }

    #[tokio::test]
    async fn clones_share_the_trigger_state() {
        let shutdown = Shutdown::new();
        let handle = shutdown.clone();
        let mut rx = shutdown.subscribe();

        handle.trigger(ShutdownReason::Signal);
        assert_eq!(rx.recv().await.unwrap(), ShutdownReason::Signal);
        assert_eq!(shutdown.reason(), Some(ShutdownReason::Signal));
    }
}
