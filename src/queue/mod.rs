// Work queue — shortened URLs waiting for redirect resolution.
//
// Intake sends one message per newly seen shortener URL; the normalization
// service receives them in batches. Delivery is at-least-once: receiving a
// message removes it from the queue, so a crash mid-resolution loses it
// until the URL is posted again.
//
// Implementors: ValkeyQueue (Redis list) and MemoryQueue (tests).

pub mod valkey;

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

pub use self::valkey::ValkeyQueue;

/// Default queue name.
pub const DEFAULT_QUEUE_NAME: &str = "link-normalization";

/// Upper bound on messages returned by one `receive`.
pub const MAX_BATCH: usize = 10;

/// How long `receive` waits for the first message.
pub const RECEIVE_WAIT: Duration = Duration::from_secs(10);

/// A URL to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub url: String,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue one message.
    async fn send(&self, message: &Message) -> Result<()>;

    /// Wait up to [`RECEIVE_WAIT`] for messages and return at most
    /// [`MAX_BATCH`] of them, removed from the queue. Empty on timeout.
    async fn receive(&self) -> Result<Vec<Message>>;
}

/// Process-local queue with the same batching rules.
pub struct MemoryQueue {
    messages: Mutex<VecDeque<Message>>,
    ready: Notify,
    wait: Duration,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::with_wait(RECEIVE_WAIT)
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wait(wait: Duration) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            wait,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    fn take_batch(&self) -> Vec<Message> {
        let mut messages = self.messages.lock();
        let count = messages.len().min(MAX_BATCH);
        messages.drain(..count).collect()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn send(&self, message: &Message) -> Result<()> {
        self.messages.lock().push_back(message.clone());
        self.ready.notify_one();
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<Message>> {
        let batch = self.take_batch();
        if !batch.is_empty() {
            return Ok(batch);
        }
        // notify_one stores a permit, so a send between the check and the
        // wait still wakes us
        if tokio::time::timeout(self.wait, self.ready.notified())
            .await
            .is_err()
        {
            return Ok(Vec::new());
        }
        Ok(self.take_batch())
    }
}
