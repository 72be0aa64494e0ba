// Object storage — buckets of keyed blobs (event log, snapshots, feeds, thumbnails).
//
// Implementors: FsObjectStore (a directory per bucket) and MemoryObjectStore
// (tests). Keys are `/`-separated paths such as `events/2024-01-01-00-00-00.json`.

pub mod events;
pub mod fs;
pub mod memory;
pub mod thumbnails;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use events::{EventKind, EventLog, EventRecord};
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use thumbnails::ThumbnailStore;

/// Headers stored alongside an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOptions {
    pub content_type: String,
    pub cache_control: Option<String>,
    /// Request encryption at rest.
    pub encrypted: bool,
}

impl PutOptions {
    pub fn new(content_type: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            ..Default::default()
        }
    }

    pub fn cache_control(mut self, value: &str) -> Self {
        self.cache_control = Some(value.to_string());
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }
}

/// Metadata for a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub options: PutOptions,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object in one piece, replacing any existing object at `key`.
    async fn put(&self, key: &str, body: Vec<u8>, options: &PutOptions) -> Result<()>;

    /// Read an object. `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Read an object's metadata without its body.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.head(key).await?.is_some())
    }

    /// All keys starting with `prefix`, in lexicographic order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove an object. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Reject keys that could escape a bucket directory.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        anyhow::bail!("Invalid object key: {key:?}");
    }
    Ok(())
}
