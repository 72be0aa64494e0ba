// Database trait — async interface over the document tables.
//
// Implementors: SqliteDatabase (wraps rusqlite). Methods are async so the
// pipeline can hold an `Arc<dyn Database>` regardless of backend.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{FeedEntry, UrlMetadata, UrlTranslation};

#[async_trait]
pub trait Database: Send + Sync {
    // --- URL metadata ---

    /// Saved title for a URL hash, if any.
    async fn get_url_metadata(&self, url_hash: &str) -> Result<Option<UrlMetadata>>;

    /// Save or replace the title for a URL.
    async fn save_url_metadata(&self, metadata: &UrlMetadata) -> Result<()>;

    // --- Translations ---

    /// Upsert a translation keyed by the hash of its source URL.
    async fn save_translation(&self, translation: &UrlTranslation) -> Result<()>;

    /// All translations updated at or after `since`, as `source -> destination`.
    async fn get_translations_since(&self, since: DateTime<Utc>)
        -> Result<HashMap<String, String>>;

    // --- Feed ---

    /// Timestamp of the newest feed entry.
    async fn latest_feed_timestamp(&self) -> Result<Option<DateTime<Utc>>>;

    /// Insert an entry unless one with the same URL hash exists.
    /// Returns true if a row was written.
    async fn add_feed_entry(&self, entry: &FeedEntry) -> Result<bool>;

    /// Delete entries older than `cutoff`. Returns the number removed.
    async fn delete_feed_entries_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// All feed entries, newest first.
    async fn list_feed_entries(&self) -> Result<Vec<FeedEntry>>;
}
