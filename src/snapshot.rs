// Snapshot types — the JSON documents the static site renders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Object key of the links snapshot in the public bucket.
pub const LINKS_SNAPSHOT_KEY: &str = "data/top-links.json";

/// Object key of the sites snapshot in the public bucket.
pub const SITES_SNAPSHOT_KEY: &str = "data/top-sites.json";

/// Shown when no title could be found for a link.
pub const NO_TITLE: &str = "(No Title)";

/// A post recommended alongside a link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub rank: usize,
    pub at_uri: String,
    /// Display name of the author.
    pub username: String,
    pub handle: String,
    pub text: String,
}

impl Post {
    /// Web URL of the post on bsky.app.
    pub fn web_url(&self) -> String {
        let rkey = self.at_uri.rsplit('/').next().unwrap_or_default();
        format!("https://bsky.app/profile/{}/post/{rkey}", self.handle)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub rank: usize,
    pub url: String,
    pub title: String,
    pub thumbnail_url: String,
    pub post_count: u64,
    pub repost_count: u64,
    pub like_count: u64,
    pub recommended_posts: Vec<Post>,
}

impl Link {
    pub fn interactions(&self) -> u64 {
        self.post_count + self.repost_count + self.like_count
    }
}

/// Ranked links for each window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub top_hour: Vec<Link>,
    pub top_day: Vec<Link>,
    pub top_week: Vec<Link>,
    /// Older site builds read this; mirrors `top_day`.
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Snapshot {
    /// The number one link of the day, if there is one with a URL.
    pub fn top_day_link(&self) -> Option<&Link> {
        self.top_day.first().filter(|link| !link.url.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteLink {
    pub rank: usize,
    pub url: String,
    pub title: String,
    pub thumbnail_url: String,
    pub interactions: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub rank: usize,
    pub name: String,
    pub domain: String,
    pub interactions: u64,
    pub links: Vec<SiteLink>,
}

/// Most shared sites over the last 30 days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitesSnapshot {
    pub generated_at: DateTime<Utc>,
    pub sites: Vec<Site>,
}
