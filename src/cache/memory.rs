// MemoryCache — process-local hot cache with the same TTL rules as Valkey.
//
// Values are stored encoded, exactly as they would be on the server, so
// tests exercise the real encoding. Expiry uses tokio's clock, which lets
// paused-time tests fast-forward past the TTL.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{decode, encode, post_key, url_key, HotCache, PostRecord, UrlRecord, CACHE_TTL_SECS};

struct Entry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(CACHE_TTL_SECS))
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Time left before `key` expires, if it is live.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.expires_at - now)
    }

    fn read<T: Default + for<'de> serde::Deserialize<'de>>(&self, key: &str) -> Result<T> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => decode(&entry.bytes),
            Some(_) => {
                entries.remove(key);
                Ok(T::default())
            }
            None => Ok(T::default()),
        }
    }

    /// Live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = encode(value)?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        // Expired keys would otherwise stay until read again
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                bytes,
                expires_at: now + self.ttl,
            },
        );
        Ok(())
    }

    fn refresh(&self, key: &str) {
        let now = Instant::now();
        if let Some(entry) = self.entries.lock().get_mut(key) {
            if entry.expires_at > now {
                entry.expires_at = now + self.ttl;
            }
        }
    }
}

#[async_trait]
impl HotCache for MemoryCache {
    async fn read_post(&self, hash: &str) -> Result<PostRecord> {
        self.read(&post_key(hash))
    }

    async fn save_post(&self, hash: &str, record: &PostRecord) -> Result<()> {
        self.write(&post_key(hash), record)
    }

    async fn refresh_post(&self, hash: &str) -> Result<()> {
        self.refresh(&post_key(hash));
        Ok(())
    }

    async fn read_url(&self, hash: &str) -> Result<UrlRecord> {
        self.read(&url_key(hash))
    }

    async fn save_url(&self, hash: &str, record: &UrlRecord) -> Result<()> {
        self.write(&url_key(hash), record)
    }

    async fn refresh_url(&self, hash: &str) -> Result<()> {
        self.refresh(&url_key(hash));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(url: &str) -> PostRecord {
        PostRecord {
            url: url.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache.save_post("abc", &post("https://example.com")).await.unwrap();

        tokio::time::advance(Duration::from_secs(CACHE_TTL_SECS - 1)).await;
        assert!(cache.read_post("abc").await.unwrap().is_valid());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.read_post("abc").await.unwrap(), PostRecord::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_extends_ttl() {
        let cache = MemoryCache::new();
        cache.save_post("abc", &post("https://example.com")).await.unwrap();

        tokio::time::advance(Duration::from_secs(CACHE_TTL_SECS - 10)).await;
        cache.refresh_post("abc").await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(cache.read_post("abc").await.unwrap().is_valid());
        assert!(cache.ttl_remaining("post:abc").unwrap() > Duration::from_secs(CACHE_TTL_SECS - 61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_sweep_expired_entries() {
        let cache = MemoryCache::new();
        for n in 0..5 {
            cache.save_post(&format!("old{n}"), &post("https://example.com")).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(CACHE_TTL_SECS + 1)).await;
        cache.save_post("new", &post("https://example.com")).await.unwrap();

        assert_eq!(cache.entries.lock().len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_of_missing_key_is_a_no_op() {
        let cache = MemoryCache::new();
        cache.refresh_url("missing").await.unwrap();
        assert_eq!(cache.read_url("missing").await.unwrap(), UrlRecord::default());
    }
}
