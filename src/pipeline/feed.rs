// Feeds — the "top link of the day" as Atom and JSON Feed documents.
//
// Entries live in the feed table. A publish adds at most one entry per
// twelve hours, drops entries older than ninety days, and regenerates both
// documents from what remains.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{Database, FeedEntry, FeedEntryContent};
use crate::hash::fnv1a_64_hex;
use crate::snapshot::{Link, Post};
use crate::urls::rules::hostname;

pub const ATOM_FEED_KEY: &str = "feeds/top-day.xml";
pub const JSON_FEED_KEY: &str = "feeds/top-day.json";
pub const ATOM_CONTENT_TYPE: &str = "application/atom+xml";
pub const JSON_FEED_CONTENT_TYPE: &str = "application/feed+json";

pub const FEED_TITLE: &str = "The Blue Report";
pub const FEED_DESCRIPTION: &str = "The top links on Bluesky over the past day";

/// Minimum time between two feed entries.
pub const FEED_ENTRY_INTERVAL: Duration = Duration::hours(12);

/// Entries older than this are deleted.
pub const FEED_RETENTION: Duration = Duration::days(90);

const JSON_FEED_VERSION: &str = "https://jsonfeed.org/version/1.1";
const ICON_PATH: &str = "/icons/web-app-manifest-512x512.png";

/// Where the feeds and the site they describe are served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedLocation {
    /// Home page, e.g. `https://theblue.report`.
    pub site_url: String,
    /// Public bucket URL the feeds are served from.
    pub data_url: String,
}

impl FeedLocation {
    pub fn new(site_url: &str, data_url: &str) -> Self {
        Self {
            site_url: site_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
        }
    }

    fn atom_url(&self) -> String {
        format!("{}/{ATOM_FEED_KEY}", self.data_url)
    }

    fn json_url(&self) -> String {
        format!("{}/{JSON_FEED_KEY}", self.data_url)
    }

    fn icon_url(&self) -> String {
        format!("{}{ICON_PATH}", self.site_url)
    }
}

/// Add an entry for `top_link` unless one was added in the last twelve
/// hours, then prune old entries. Returns true if an entry was written.
pub async fn update_feed(db: &Arc<dyn Database>, top_link: Option<&Link>, now: DateTime<Utc>) -> Result<bool> {
    let Some(link) = top_link.filter(|link| !link.url.is_empty()) else {
        info!("No top link, skipping feed entry");
        return Ok(false);
    };

    let latest = db
        .latest_feed_timestamp()
        .await
        .context("Failed to read latest feed entry")?;
    if latest.is_some_and(|ts| ts > now - FEED_ENTRY_INTERVAL) {
        info!("Skipping feed entry, one was added recently");
        return Ok(false);
    }

    let entry = FeedEntry {
        url_hash: fnv1a_64_hex(&link.url),
        timestamp: now,
        content: FeedEntryContent {
            title: link.title.clone(),
            url: link.url.clone(),
            recommended_posts: link.recommended_posts.clone(),
        },
        published: false,
    };
    let added = db
        .add_feed_entry(&entry)
        .await
        .context("Failed to add feed entry")?;
    info!(url = %link.url, added = added, "Feed entry");

    match db.delete_feed_entries_before(now - FEED_RETENTION).await {
        Ok(removed) if removed > 0 => info!(removed = removed, "Removed old feed entries"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Failed to clean feed"),
    }
    Ok(added)
}

/// HTML body of a feed entry: the link, then each recommended post.
pub fn entry_html(content: &FeedEntryContent) -> String {
    let mut html = format!(
        "<p>Trending on Bluesky: <a href=\"{}\">{}</a></p>",
        escape(&content.url),
        escape(&content.title)
    );
    for post in &content.recommended_posts {
        html.push_str(&post_html(post));
    }
    html
}

fn post_html(post: &Post) -> String {
    let handle = escape(&post.handle);
    format!(
        "<p>Post by <a href=\"https://bsky.app/profile/{handle}\">@{handle}</a></p>\
         <blockquote>{}</blockquote>\
         <p><a href=\"{}\">View Post</a></p>",
        escape(&post.text),
        escape(&post.web_url())
    )
}

/// Plain text body of a feed entry.
pub fn entry_text(content: &FeedEntryContent) -> String {
    let mut text = format!("Trending on Bluesky: {} ({})", content.title, content.url);
    for post in &content.recommended_posts {
        text.push_str(&format!("\n\n@{}: {}", post.handle, post.text));
    }
    text
}

/// Atom document for `entries`, in the order given.
pub fn atom_feed(entries: &[FeedEntry], location: &FeedLocation, updated: DateTime<Utc>) -> String {
    let self_url = escape(&location.atom_url());
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<feed xmlns=\"http://www.w3.org/2005/Atom\">\n");
    xml.push_str(&format!("  <title>{}</title>\n", escape(FEED_TITLE)));
    xml.push_str(&format!("  <id>{self_url}</id>\n"));
    xml.push_str(&format!("  <link href=\"{self_url}\" rel=\"self\"></link>\n"));
    xml.push_str(&format!("  <icon>{}</icon>\n", escape(&location.icon_url())));
    xml.push_str(&format!("  <updated>{}</updated>\n", rfc3339(updated)));

    for entry in entries {
        let url = escape(&entry.content.url);
        xml.push_str("  <entry>\n");
        xml.push_str(&format!("    <title>{}</title>\n", escape(&entry.content.title)));
        xml.push_str(&format!("    <updated>{}</updated>\n", rfc3339(entry.timestamp)));
        xml.push_str(&format!("    <id>{url}</id>\n"));
        xml.push_str(&format!(
            "    <content type=\"html\">{}</content>\n",
            escape(&entry_html(&entry.content))
        ));
        xml.push_str(&format!("    <link href=\"{url}\" rel=\"alternate\"></link>\n"));
        xml.push_str(&format!(
            "    <author>\n      <name>{}</name>\n    </author>\n",
            escape(&hostname(&entry.content.url))
        ));
        xml.push_str("  </entry>\n");
    }

    xml.push_str("</feed>\n");
    xml
}

#[derive(Debug, Serialize)]
struct JsonFeed<'a> {
    version: &'a str,
    title: &'a str,
    home_page_url: &'a str,
    feed_url: String,
    description: &'a str,
    icon: String,
    language: &'a str,
    items: Vec<JsonFeedItem<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonFeedItem<'a> {
    id: &'a str,
    url: &'a str,
    title: &'a str,
    content_html: String,
    content_text: String,
    date_published: String,
}

/// JSON Feed 1.1 document for `entries`, in the order given.
pub fn json_feed(entries: &[FeedEntry], location: &FeedLocation) -> Result<Vec<u8>> {
    let feed = JsonFeed {
        version: JSON_FEED_VERSION,
        title: FEED_TITLE,
        home_page_url: &location.site_url,
        feed_url: location.json_url(),
        description: FEED_DESCRIPTION,
        icon: location.icon_url(),
        language: "en",
        items: entries
            .iter()
            .map(|entry| JsonFeedItem {
                id: &entry.content.url,
                url: &entry.content.url,
                title: &entry.content.title,
                content_html: entry_html(&entry.content),
                content_text: entry_text(&entry.content),
                date_published: rfc3339(entry.timestamp),
            })
            .collect(),
    };
    serde_json::to_vec(&feed).context("Failed to encode JSON feed")
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Escape text for HTML and XML.
fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn content() -> FeedEntryContent {
        FeedEntryContent {
            title: "Fish & Chips".to_string(),
            url: "https://www.example.com/a".to_string(),
            recommended_posts: vec![Post {
                rank: 1,
                at_uri: "at://did:plc:a/app.bsky.feed.post/3kabc".to_string(),
                username: "Alice".to_string(),
                handle: "alice.bsky.social".to_string(),
                text: "so <good>".to_string(),
            }],
        }
    }

    fn entry() -> FeedEntry {
        FeedEntry {
            url_hash: fnv1a_64_hex("https://www.example.com/a"),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            content: content(),
            published: false,
        }
    }

    #[test]
    fn test_entry_html() {
        let html = entry_html(&content());
        assert!(html.starts_with(
            "<p>Trending on Bluesky: <a href=\"https://www.example.com/a\">Fish &amp; Chips</a></p>"
        ));
        assert!(html.contains("@alice.bsky.social"));
        assert!(html.contains("<blockquote>so &lt;good&gt;</blockquote>"));
        assert!(html.contains("https://bsky.app/profile/alice.bsky.social/post/3kabc"));
    }

    #[test]
    fn test_atom_feed() {
        let location = FeedLocation::new("https://theblue.report", "https://data.theblue.report/");
        let xml = atom_feed(&[entry()], &location, Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
        assert!(xml.contains("<title>The Blue Report</title>"));
        assert!(xml.contains("<id>https://data.theblue.report/feeds/top-day.xml</id>"));
        assert!(xml.contains("<updated>2024-06-02T00:00:00Z</updated>"));
        assert!(xml.contains("<title>Fish &amp; Chips</title>"));
        assert!(xml.contains("<name>example.com</name>"));
        assert_eq!(xml.matches("<entry>").count(), 1);
    }

    #[test]
    fn test_json_feed() {
        let location = FeedLocation::new("https://theblue.report", "https://data.theblue.report");
        let body = json_feed(&[entry()], &location).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["version"], "https://jsonfeed.org/version/1.1");
        assert_eq!(json["language"], "en");
        assert_eq!(json["description"], FEED_DESCRIPTION);
        assert_eq!(json["feed_url"], "https://data.theblue.report/feeds/top-day.json");
        let item = &json["items"][0];
        assert_eq!(item["id"], "https://www.example.com/a");
        assert_eq!(item["date_published"], "2024-06-01T12:00:00Z");
        assert!(item["content_text"].as_str().unwrap().contains("@alice.bsky.social"));
    }
}
