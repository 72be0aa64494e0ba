// Post lookups — hydrate AT URIs into author, text and engagement.
//
// Hydration asks for the posts that drove a link's interactions and keeps
// the popular English ones as "recommended posts".

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::client::PublicAtpClient;

/// A post as returned by `app.bsky.feed.getPosts`, reduced to what the
/// report shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PostView {
    pub uri: String,
    pub author: Author,
    pub record: PostRecord,
    #[serde(rename = "likeCount")]
    pub like_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Author {
    pub handle: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PostRecord {
    pub text: String,
    pub langs: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl PostView {
    pub fn is_english(&self) -> bool {
        self.record.langs.iter().any(|lang| lang == "en")
    }

    /// Record key, the last path segment of the AT URI.
    pub fn rkey(&self) -> &str {
        self.uri.rsplit('/').next().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct GetPostsResponse {
    #[serde(default)]
    posts: Vec<PostView>,
}

/// Source of post views. Implemented by the public client and by test fakes.
#[async_trait]
pub trait PostLookup: Send + Sync {
    /// Fetch one post. `Ok(None)` when the post was deleted or is hidden.
    async fn get_post(&self, at_uri: &str) -> Result<Option<PostView>>;
}

#[async_trait]
impl PostLookup for PublicAtpClient {
    async fn get_post(&self, at_uri: &str) -> Result<Option<PostView>> {
        let response: GetPostsResponse = self
            .xrpc_get("app.bsky.feed.getPosts", &[("uris", at_uri)])
            .await
            .with_context(|| format!("Failed to fetch post {at_uri}"))?;
        Ok(response.posts.into_iter().next())
    }
}
