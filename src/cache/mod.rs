// Hot cache — short-lived join table between posts and the links they carry.
//
// When a post with a link arrives we remember `post -> url` for 12 hours so
// later likes, reposts and quotes (which only reference the post) can be
// credited to the link. A miss is an empty record, never an error.
//
// Implementors: ValkeyCache (Redis protocol, shared across processes) and
// MemoryCache (single process, tests).

pub mod memory;
pub mod valkey;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::memory::MemoryCache;
pub use self::valkey::ValkeyCache;

/// Lifetime of every cache entry, reset on save and refresh.
pub const CACHE_TTL_SECS: u64 = 12 * 60 * 60;

/// The link carried by a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    #[serde(rename = "u", default)]
    pub url: String,
}

impl PostRecord {
    /// False for the empty record returned on a miss.
    pub fn is_valid(&self) -> bool {
        !self.url.is_empty()
    }
}

/// Interaction tallies seen while a URL record is alive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    #[serde(rename = "p", default)]
    pub posts: u32,
    #[serde(rename = "r", default)]
    pub reposts: u32,
    #[serde(rename = "l", default)]
    pub likes: u32,
}

/// What intake knows about a URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    #[serde(rename = "t", default)]
    pub title: String,
    #[serde(rename = "p", default)]
    pub image_url: String,
    #[serde(rename = "m", default)]
    pub totals: Totals,
    /// Already queued for redirect resolution.
    #[serde(rename = "n", default)]
    pub normalized: bool,
}

impl UrlRecord {
    /// Fill empty fields from a later sighting. Existing values win.
    pub fn merge_fill(&mut self, title: &str, image_url: &str) {
        if self.title.is_empty() && !title.is_empty() {
            self.title = title.to_string();
        }
        if self.image_url.is_empty() && !image_url.is_empty() {
            self.image_url = image_url.to_string();
        }
    }
}

/// Cache key for a post, from the hash of its CID.
pub fn post_key(hash: &str) -> String {
    format!("post:{hash}")
}

/// Cache key for a URL, from the hash of the cleaned URL.
pub fn url_key(hash: &str) -> String {
    format!("url:{hash}")
}

/// Encode a record with the compact binary encoding used for cache values.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_cbor::to_vec(value)?)
}

/// Decode a cache value.
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    Ok(serde_cbor::from_slice(bytes)?)
}

#[async_trait]
pub trait HotCache: Send + Sync {
    async fn read_post(&self, hash: &str) -> Result<PostRecord>;

    /// Store a post record and reset its TTL.
    async fn save_post(&self, hash: &str, record: &PostRecord) -> Result<()>;

    /// Extend a post's TTL without reading it.
    async fn refresh_post(&self, hash: &str) -> Result<()>;

    async fn read_url(&self, hash: &str) -> Result<UrlRecord>;

    /// Store a URL record and reset its TTL.
    async fn save_url(&self, hash: &str, record: &UrlRecord) -> Result<()>;

    /// Extend a URL record's TTL without reading it.
    async fn refresh_url(&self, hash: &str) -> Result<()>;
}
