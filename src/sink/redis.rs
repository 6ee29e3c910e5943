//! Redis-backed durable queue sink.
//!
//! Each record is `RPUSH`ed as JSON onto a list; consumers pop from the other
//! end. A lost connection is dropped and re-established on the next delivery,
//! with the retry pacing owned by the drain task.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::config::schema::RedisConfig;
use crate::error::{ProxyError, Result};
use crate::proxy::transaction::Transaction;
use crate::sink::TransactionSink;

/// List key transactions are enqueued onto.
pub const QUEUE_KEY: &str = "maegashira:transactions";

pub struct RedisQueue {
    client: redis::Client,
    connection: Option<MultiplexedConnection>,
}

impl RedisQueue {
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let url = match &config.password {
            Some(password) => format!("redis://:{}@{}:{}/", password, config.host, config.port),
            None => format!("redis://{}:{}/", config.host, config.port),
        };
        let client = redis::Client::open(url).map_err(ProxyError::Sink)?;
        Ok(Self {
            client,
            connection: None,
        })
    }

    async fn connection(&mut self) -> Result<&mut MultiplexedConnection> {
        if self.connection.is_none() {
            let conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(ProxyError::Sink)?;
            tracing::info!("Connected to Redis transaction queue");
            self.connection = Some(conn);
        }
        Ok(self.connection.as_mut().expect("connection just set"))
    }
}

#[async_trait]
impl TransactionSink for RedisQueue {
    async fn deliver(&mut self, transaction: &Transaction) -> Result<()> {
        let payload = serde_json::to_string(transaction)
            .map_err(|e| ProxyError::ServerInternal(format!("transaction serialization: {e}")))?;

        let conn = self.connection().await?;
        let pushed: std::result::Result<(), redis::RedisError> =
            conn.rpush(QUEUE_KEY, payload).await;

        if let Err(e) = pushed {
            // Force a fresh connection on the next attempt.
            self.connection = None;
            return Err(ProxyError::Sink(e));
        }
        Ok(())
    }
}
