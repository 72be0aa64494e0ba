// Thumbnails — preview images copied into the public bucket.
//
// Stored as `thumbnails/<url hash>.<ext>` and served from a CDN prefix, so
// the site never hotlinks third-party images.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{ObjectStore, PutOptions};

/// Default public URL prefix for stored thumbnails.
pub const DEFAULT_THUMBNAIL_BASE_URL: &str = "https://data.theblue.report/thumbnails";

const THUMBNAIL_PREFIX: &str = "thumbnails";
const THUMBNAIL_EXTENSIONS: &[&str] = &["png", "jpg", "gif"];
const THUMBNAIL_CACHE_CONTROL: &str = "max-age=28800";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ThumbnailStore {
    store: Arc<dyn ObjectStore>,
    http: reqwest::Client,
    base_url: String,
}

impl ThumbnailStore {
    pub fn new(store: Arc<dyn ObjectStore>, base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .context("Failed to build thumbnail HTTP client")?;
        Ok(Self {
            store,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn key(hash: &str, ext: &str) -> String {
        format!("{THUMBNAIL_PREFIX}/{hash}.{ext}")
    }

    fn public_url(&self, hash: &str, ext: &str) -> String {
        format!("{}/{hash}.{ext}", self.base_url)
    }

    /// Public URL of an existing thumbnail for `hash`, if one was saved.
    ///
    /// Extensions are checked in the order png, jpg, gif.
    pub async fn thumbnail_url(&self, hash: &str) -> Result<Option<String>> {
        for ext in THUMBNAIL_EXTENSIONS {
            if self.store.exists(&Self::key(hash, ext)).await? {
                return Ok(Some(self.public_url(hash, ext)));
            }
        }
        Ok(None)
    }

    /// Download `image_url` and store it as the thumbnail for `hash`.
    ///
    /// Returns the public URL of the stored image.
    pub async fn save_thumbnail(&self, hash: &str, image_url: &str) -> Result<String> {
        let response = self
            .http
            .get(image_url)
            .send()
            .await
            .with_context(|| format!("Failed to download thumbnail {image_url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("Thumbnail {image_url} returned {}", response.status());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let ext = extension_for(&content_type);

        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read thumbnail body {image_url}"))?;

        let key = Self::key(hash, ext);
        let stored_type = if content_type.is_empty() {
            "image/jpeg"
        } else {
            content_type.as_str()
        };
        let options = PutOptions::new(stored_type).cache_control(THUMBNAIL_CACHE_CONTROL);
        self.store.put(&key, body.to_vec(), &options).await?;

        debug!(key = %key, source = image_url, "Saved thumbnail");
        Ok(self.public_url(hash, ext))
    }
}

/// File extension for an image content type. Unknown types are stored as jpg.
pub fn extension_for(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/png" => "png",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;

    #[test]
    fn test_extension_for_content_type() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/gif"), "gif");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("IMAGE/PNG; charset=binary"), "png");
        assert_eq!(extension_for(""), "jpg");
        assert_eq!(extension_for("image/webp"), "jpg");
    }

    #[tokio::test]
    async fn test_thumbnail_url_prefers_png() {
        let store = Arc::new(MemoryObjectStore::new());
        let options = PutOptions::new("image/jpeg");
        store
            .put("thumbnails/abc.jpg", vec![1], &options)
            .await
            .unwrap();
        store
            .put("thumbnails/abc.png", vec![1], &options)
            .await
            .unwrap();

        let thumbnails = ThumbnailStore::new(store, "https://cdn.example/thumbnails/").unwrap();
        assert_eq!(
            thumbnails.thumbnail_url("abc").await.unwrap().as_deref(),
            Some("https://cdn.example/thumbnails/abc.png")
        );
        assert!(thumbnails.thumbnail_url("def").await.unwrap().is_none());
    }
}
