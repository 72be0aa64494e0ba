// Firehose event envelope — serde types for Jetstream JSON frames.
//
// Only the fields intake needs are modeled. Every struct defaults when a
// field is absent, so a like frame (no embed, no facets) and a post frame
// decode into the same shape.

use serde::{Deserialize, Serialize};

use crate::storage::events::EventKind;

pub const POST_COLLECTION: &str = "app.bsky.feed.post";
pub const REPOST_COLLECTION: &str = "app.bsky.feed.repost";
pub const LIKE_COLLECTION: &str = "app.bsky.feed.like";

const EXTERNAL_EMBED: &str = "app.bsky.embed.external";
const RECORD_EMBED: &str = "app.bsky.embed.record";
const LINK_FEATURE: &str = "app.bsky.richtext.facet#link";
const THUMBNAIL_CDN: &str = "https://cdn.bsky.app/img/feed_thumbnail/plain";

/// One frame from the firehose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamEvent {
    pub did: String,
    pub kind: String,
    pub commit: Commit,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commit {
    pub operation: String,
    pub cid: String,
    pub rkey: String,
    pub record: Record,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub langs: Vec<String>,
    pub embed: Embed,
    pub facets: Vec<Facet>,
    pub subject: StrongRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Embed {
    #[serde(rename = "$type")]
    pub embed_type: String,
    pub external: ExternalEmbed,
    pub record: StrongRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalEmbed {
    pub title: String,
    pub description: String,
    pub uri: String,
    pub thumb: Thumb,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thumb {
    #[serde(rename = "$type")]
    pub thumb_type: String,
    #[serde(rename = "ref")]
    pub blob_ref: BlobRef,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobRef {
    #[serde(rename = "$link")]
    pub link: String,
}

/// Reference to another record by CID and AT URI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrongRef {
    pub cid: String,
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Facet {
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Feature {
    #[serde(rename = "$type")]
    pub feature_type: String,
    pub uri: String,
}

/// The link a post carries, with whatever card data came with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostLink {
    pub url: String,
    pub title: String,
    pub image_url: String,
}

impl StreamEvent {
    /// Whether intake should process this event at all.
    ///
    /// Requires a created commit for a post, repost, or like. Posts must
    /// also be tagged English.
    pub fn is_valid(&self) -> bool {
        if self.kind != "commit" || self.commit.operation != "create" {
            return false;
        }
        match self.event_kind() {
            Some(EventKind::Post) => self.is_english(),
            Some(_) => true,
            None => false,
        }
    }

    /// Classify the record by collection.
    pub fn event_kind(&self) -> Option<EventKind> {
        match self.commit.record.record_type.as_str() {
            POST_COLLECTION => Some(EventKind::Post),
            REPOST_COLLECTION => Some(EventKind::Repost),
            LIKE_COLLECTION => Some(EventKind::Like),
            _ => None,
        }
    }

    pub fn is_post(&self) -> bool {
        self.event_kind() == Some(EventKind::Post)
    }

    /// Quote posts are posts whose embed is another record.
    pub fn is_quote_post(&self) -> bool {
        self.is_post() && self.commit.record.embed.embed_type == RECORD_EMBED
    }

    pub fn is_english(&self) -> bool {
        self.commit.record.langs.iter().any(|lang| lang == "en")
    }

    /// AT URI of the post carried by this commit.
    pub fn post_uri(&self) -> String {
        format!("at://{}/{}/{}", self.did, POST_COLLECTION, self.commit.rkey)
    }

    /// Extract the link from a post.
    ///
    /// An external embed with a URI wins and may carry a title and
    /// thumbnail. Otherwise the first link facet is used. Returns `None` for non-posts and posts
    /// without a link.
    pub fn parse_post(&self) -> Option<PostLink> {
        if !self.is_post() {
            return None;
        }

        let embed = &self.commit.record.embed;
        if embed.embed_type == EXTERNAL_EMBED && !embed.external.uri.is_empty() {
            let external = &embed.external;
            let thumb = &external.thumb;
            let image_url = if thumb.thumb_type == "blob" && thumb.mime_type == "image/jpeg" {
                format!("{THUMBNAIL_CDN}/{}/{}", self.did, thumb.blob_ref.link)
            } else {
                String::new()
            };
            return Some(PostLink {
                url: external.uri.clone(),
                title: external.title.clone(),
                image_url,
            });
        }

        self.commit
            .record
            .facets
            .iter()
            .flat_map(|facet| facet.features.iter())
            .find(|feature| feature.feature_type == LINK_FEATURE && !feature.uri.is_empty())
            .map(|feature| PostLink {
                url: feature.uri.clone(),
                ..Default::default()
            })
    }
}
