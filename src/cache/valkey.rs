// ValkeyCache — hot cache backed by a Redis-protocol server.
//
// The ConnectionManager reconnects on its own and is cheap to clone, so each
// call clones it instead of holding a lock.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use super::{decode, encode, post_key, url_key, HotCache, PostRecord, UrlRecord, CACHE_TTL_SECS};

#[derive(Clone)]
pub struct ValkeyCache {
    connection: ConnectionManager,
}

impl ValkeyCache {
    /// Connect to `address` (`host:port`), over TLS when `tls` is set.
    pub async fn connect(address: &str, tls: bool) -> Result<Self> {
        let connection = connect_manager(address, tls).await?;
        Ok(Self { connection })
    }

    async fn read<T>(&self, key: &str) -> Result<T>
    where
        T: Default + for<'de> serde::Deserialize<'de>,
    {
        let mut conn = self.connection.clone();
        let raw: Option<Vec<u8>> = conn
            .get(key)
            .await
            .with_context(|| format!("Cache GET failed for {key}"))?;
        match raw {
            Some(bytes) => decode(&bytes).with_context(|| format!("Corrupt cache value at {key}")),
            None => {
                debug!(key = key, "Cache miss");
                Ok(T::default())
            }
        }
    }

    async fn write<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = encode(value)?;
        let mut conn = self.connection.clone();
        let _: () = conn
            .set_ex(key, bytes, CACHE_TTL_SECS)
            .await
            .with_context(|| format!("Cache SET failed for {key}"))?;
        Ok(())
    }

    async fn refresh(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: bool = conn
            .expire(key, CACHE_TTL_SECS as i64)
            .await
            .with_context(|| format!("Cache EXPIRE failed for {key}"))?;
        Ok(())
    }
}

/// Open a managed connection to a Redis-protocol server.
pub async fn connect_manager(address: &str, tls: bool) -> Result<ConnectionManager> {
    let scheme = if tls { "rediss" } else { "redis" };
    let url = format!("{scheme}://{address}");
    info!(address = address, tls = tls, "Connecting to Valkey");

    let client = redis::Client::open(url.as_str())
        .with_context(|| format!("Invalid Valkey address {address}"))?;
    ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Valkey at {address}"))
}

#[async_trait]
impl HotCache for ValkeyCache {
    async fn read_post(&self, hash: &str) -> Result<PostRecord> {
        self.read(&post_key(hash)).await
    }

    async fn save_post(&self, hash: &str, record: &PostRecord) -> Result<()> {
        self.write(&post_key(hash), record).await
    }

    async fn refresh_post(&self, hash: &str) -> Result<()> {
        self.refresh(&post_key(hash)).await
    }

    async fn read_url(&self, hash: &str) -> Result<UrlRecord> {
        self.read(&url_key(hash)).await
    }

    async fn save_url(&self, hash: &str, record: &UrlRecord) -> Result<()> {
        self.write(&url_key(hash), record).await
    }

    async fn refresh_url(&self, hash: &str) -> Result<()> {
        self.refresh(&url_key(hash)).await
    }
}
