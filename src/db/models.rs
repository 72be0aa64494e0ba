// Data models — rows of the document tables.
//
// Kept free of rusqlite types so the pipeline can build and inspect them
// without touching the database layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::Post;

/// Names of the three document tables. Configurable per deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub url_metadata: String,
    pub url_translations: String,
    pub feed: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            url_metadata: "url_metadata".to_string(),
            url_translations: "url_translations".to_string(),
            feed: "feed".to_string(),
        }
    }
}

impl TableNames {
    /// Table names are spliced into SQL, so only `[A-Za-z0-9_]` is allowed.
    pub fn validate(&self) -> anyhow::Result<()> {
        for name in [&self.url_metadata, &self.url_translations, &self.feed] {
            let valid = !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                anyhow::bail!("Invalid table name {name:?}: use letters, digits and underscores");
            }
        }
        Ok(())
    }
}

/// Saved title for a URL, keyed by the URL hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMetadata {
    pub url_hash: String,
    pub url: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

/// A resolved shortener: `source` redirects to `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlTranslation {
    pub source: String,
    pub destination: String,
    pub updated_at: DateTime<Utc>,
}

/// What a feed entry points at. Stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntryContent {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub recommended_posts: Vec<Post>,
}

/// One item of the "top link of the day" feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub url_hash: String,
    pub timestamp: DateTime<Utc>,
    pub content: FeedEntryContent,
    pub published: bool,
}
