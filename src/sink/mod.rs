//! Post-transaction sink.
//!
//! # Responsibilities
//! - Accept one Transaction per request from every worker
//! - Deliver records at-least-once to the configured backend
//! - Reconnect with exponential backoff when the backend is away
//!
//! # Design Decisions
//! - Workers enqueue onto a bounded channel; a single drain task owns the
//!   backend connection
//! - Delivery failures retry the same record; the sink tolerates duplicates
//! - Without clustering, records go to the structured log instead

pub mod redis;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::error::Result;
use crate::lifecycle::shutdown::ShutdownReason;
use crate::proxy::transaction::Transaction;

/// Records buffered between the workers and the drain task.
const SINK_QUEUE_DEPTH: usize = 10_000;

/// Destination for finalized transaction records.
#[async_trait]
pub trait TransactionSink: Send {
    async fn deliver(&mut self, transaction: &Transaction) -> Result<()>;
}

/// Fallback sink used when clustering is disabled: records land in the
/// structured log.
pub struct LogSink;

#[async_trait]
impl TransactionSink for LogSink {
    async fn deliver(&mut self, transaction: &Transaction) -> Result<()> {
        match serde_json::to_string(transaction) {
            Ok(json) => tracing::debug!(transaction = %json, "Transaction recorded"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize transaction"),
        }
        Ok(())
    }
}

/// Reconnect delay: `clamp(exp(attempt), 1000ms, 20000ms)`.
pub fn reconnect_backoff(attempt: u32) -> Duration {
    let millis = (attempt as f64).exp().clamp(1000.0, 20000.0);
    Duration::from_millis(millis as u64)
}

/// Spawn the drain task. Returns the sender workers enqueue onto and the
/// task handle the primary awaits during shutdown flush.
pub fn spawn_sink(
    mut sink: Box<dyn TransactionSink>,
    mut shutdown: broadcast::Receiver<ShutdownReason>,
) -> (mpsc::Sender<Transaction>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Transaction>(SINK_QUEUE_DEPTH);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(transaction) => {
                        deliver_with_retry(sink.as_mut(), &transaction, &mut shutdown).await;
                    }
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }

        // Flush whatever is still buffered; one attempt per record.
        while let Ok(transaction) = rx.try_recv() {
            if let Err(e) = sink.deliver(&transaction).await {
                tracing::warn!(
                    transaction_id = %transaction.id,
                    error = %e,
                    "Dropped transaction during shutdown flush"
                );
            }
        }
        tracing::debug!("Post-transaction sink drained");
    });

    (tx, handle)
}

async fn deliver_with_retry(
    sink: &mut dyn TransactionSink,
    transaction: &Transaction,
    shutdown: &mut broadcast::Receiver<ShutdownReason>,
) {
    let mut attempt: u32 = 0;
    loop {
        match sink.deliver(transaction).await {
            Ok(()) => return,
            Err(e) => {
                attempt += 1;
                let delay = reconnect_backoff(attempt);
                tracing::warn!(
                    transaction_id = %transaction.id,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Sink delivery failed, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.recv() => {
                        tracing::warn!(
                            transaction_id = %transaction.id,
                            "Shutdown during sink retry, record dropped"
                        );
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_clamped() {
        assert_eq!(reconnect_backoff(0), Duration::from_millis(1000));
        assert_eq!(reconnect_backoff(1), Duration::from_millis(1000));
        // e^7 ≈ 1096 ms, inside the window.
        assert_eq!(reconnect_backoff(7), Duration::from_millis(1096));
        assert_eq!(reconnect_backoff(30), Duration::from_millis(20000));
    }

    #[tokio::test]
    async fn log_sink_accepts_records() {
        let mut sink = LogSink;
        let transaction = Transaction::begin(
            "127.0.0.1".into(),
            "GET".into(),
            "http://localhost/".into(),
            None,
        );
        assert!(sink.deliver(&transaction).await.is_ok());
    }

    #[tokio::test]
    async fn drain_task_consumes_queue() {
        let shutdown = crate::lifecycle::Shutdown::new();
        let (tx, handle) = spawn_sink(Box::new(LogSink), shutdown.subscribe());

        for _ in 0..4 {
            let transaction = Transaction::begin(
                "127.0.0.1".into(),
                "GET".into(),
                "http://localhost/".into(),
                None,
            );
            tx.send(transaction).await.unwrap();
        }

        drop(tx);
        handle.await.unwrap();
    }
}
