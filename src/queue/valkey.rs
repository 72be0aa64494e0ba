// ValkeyQueue — work queue on a Redis list.
//
// LPUSH to send; BRPOP to wait for the oldest message, then non-blocking
// RPOPs to fill the rest of the batch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use super::{Message, WorkQueue, MAX_BATCH, RECEIVE_WAIT};
use crate::cache::valkey::connect_manager;

#[derive(Clone)]
pub struct ValkeyQueue {
    connection: ConnectionManager,
    name: String,
}

impl ValkeyQueue {
    pub async fn connect(address: &str, tls: bool, name: &str) -> Result<Self> {
        let connection = connect_manager(address, tls).await?;
        Ok(Self {
            connection,
            name: name.to_string(),
        })
    }

    fn decode(&self, raw: &str) -> Option<Message> {
        match serde_json::from_str(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(queue = %self.name, error = %e, "Dropping malformed queue message");
                None
            }
        }
    }
}

#[async_trait]
impl WorkQueue for ValkeyQueue {
    async fn send(&self, message: &Message) -> Result<()> {
        let body = serde_json::to_string(message)?;
        let mut conn = self.connection.clone();
        let _: i64 = conn
            .lpush(&self.name, body)
            .await
            .with_context(|| format!("Failed to send to queue {}", self.name))?;
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<Message>> {
        let mut conn = self.connection.clone();
        let first: Option<(String, String)> = conn
            .brpop(&self.name, RECEIVE_WAIT.as_secs_f64())
            .await
            .with_context(|| format!("Failed to receive from queue {}", self.name))?;

        let Some((_, raw)) = first else {
            return Ok(Vec::new());
        };

        let mut messages = Vec::with_capacity(MAX_BATCH);
        messages.extend(self.decode(&raw));

        // Messages already popped are returned even if a later pop fails
        for _ in 1..MAX_BATCH {
            let next: redis::RedisResult<Option<String>> = conn.rpop(&self.name, None).await;
            match next {
                Ok(Some(raw)) => messages.extend(self.decode(&raw)),
                Ok(None) => break,
                Err(e) => {
                    warn!(queue = %self.name, error = %e, "Failed to fill batch");
                    break;
                }
            }
        }
        Ok(messages)
    }
}
