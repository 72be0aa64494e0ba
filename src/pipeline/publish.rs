// Publisher — upload snapshots and feeds to the public bucket.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::feed::{
    atom_feed, json_feed, update_feed, FeedLocation, ATOM_CONTENT_TYPE, ATOM_FEED_KEY,
    JSON_FEED_CONTENT_TYPE, JSON_FEED_KEY,
};
use crate::db::Database;
use crate::snapshot::{Snapshot, SitesSnapshot, LINKS_SNAPSHOT_KEY, SITES_SNAPSHOT_KEY};
use crate::storage::{ObjectStore, PutOptions};

/// Cache policy for everything the site reads.
pub const PUBLIC_CACHE_CONTROL: &str = "public; max-age=600";

pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    db: Arc<dyn Database>,
    location: FeedLocation,
    /// Also write snapshots here when set (debug runs).
    local_dir: Option<PathBuf>,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>, db: Arc<dyn Database>, location: FeedLocation) -> Self {
        Self {
            store,
            db,
            location,
            local_dir: None,
        }
    }

    pub fn with_local_copy(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_dir = Some(dir.into());
        self
    }

    async fn put_public(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let options = PutOptions::new(content_type).cache_control(PUBLIC_CACHE_CONTROL);
        self.store
            .put(key, body, &options)
            .await
            .with_context(|| format!("Failed to publish {key}"))
    }

    async fn write_local(&self, name: &str, body: &[u8]) {
        let Some(dir) = &self.local_dir else {
            return;
        };
        let path = dir.join(name);
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, body).await
        }
        .await;
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to write local snapshot copy");
        }
    }

    /// Publish the links snapshot, then update and republish the feeds.
    pub async fn publish_links(&self, snapshot: &Snapshot) -> Result<()> {
        let body = encode(snapshot)?;
        self.write_local("snapshot.json", &body).await;
        self.put_public(LINKS_SNAPSHOT_KEY, body, "application/json").await?;
        info!(key = LINKS_SNAPSHOT_KEY, "Published links snapshot");

        let now = Utc::now();
        update_feed(&self.db, snapshot.top_day_link(), now).await?;
        self.publish_feeds().await
    }

    /// Regenerate both feeds from the stored entries.
    pub async fn publish_feeds(&self) -> Result<()> {
        let entries = self
            .db
            .list_feed_entries()
            .await
            .context("Failed to list feed entries")?;

        let atom = atom_feed(&entries, &self.location, Utc::now());
        self.put_public(ATOM_FEED_KEY, atom.into_bytes(), ATOM_CONTENT_TYPE)
            .await?;
        let json = json_feed(&entries, &self.location)?;
        self.put_public(JSON_FEED_KEY, json, JSON_FEED_CONTENT_TYPE)
            .await?;

        info!(entries = entries.len(), "Published feeds");
        Ok(())
    }

    pub async fn publish_sites(&self, snapshot: &SitesSnapshot) -> Result<()> {
        let body = encode(snapshot)?;
        self.write_local("sites.json", &body).await;
        self.put_public(SITES_SNAPSHOT_KEY, body, "application/json").await?;
        info!(key = SITES_SNAPSHOT_KEY, sites = snapshot.sites.len(), "Published sites snapshot");
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).context("Failed to encode snapshot")
}
