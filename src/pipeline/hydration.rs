// Hydration — turn ranked URLs into display-ready links.
//
// Titles and thumbnails come from our own stores first and from card
// lookups only when something is missing; whatever a lookup finds is saved
// so the next run doesn't ask again. Recommended posts are the most
// interacted-with posts that carried the link, filtered down to popular
// English posts by distinct authors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::aggregation::{Counts, LinkItem, SiteItem, Window};
use crate::bluesky::PostLookup;
use crate::card::CardSource;
use crate::db::{Database, UrlMetadata};
use crate::format::TextCleaner;
use crate::hash::fnv1a_64_hex;
use crate::snapshot::{Link, Post, Site, SiteLink, NO_TITLE};
use crate::storage::ThumbnailStore;

/// Posts considered per link, most interacted-with first.
pub const CANDIDATE_POSTS: usize = 20;

/// Recommended posts kept per link.
pub const RECOMMENDED_POSTS: usize = 3;

/// A recommended post needs strictly more likes than this.
pub const MIN_POST_LIKES: u64 = 50;

/// Links hydrated at once.
pub const HYDRATION_CONCURRENCY: usize = 4;

/// Title and thumbnail of a URL. Either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDetails {
    pub title: String,
    pub thumbnail_url: String,
}

pub struct Hydrator {
    db: Arc<dyn Database>,
    cards: Arc<dyn CardSource>,
    posts: Arc<dyn PostLookup>,
    thumbnails: Arc<ThumbnailStore>,
    cleaner: TextCleaner,
    details: Mutex<HashMap<String, LinkDetails>>,
    recommended: Mutex<HashMap<String, Vec<Post>>>,
}

impl Hydrator {
    pub fn new(
        db: Arc<dyn Database>,
        cards: Arc<dyn CardSource>,
        posts: Arc<dyn PostLookup>,
        thumbnails: Arc<ThumbnailStore>,
        cleaner: TextCleaner,
    ) -> Self {
        Self {
            db,
            cards,
            posts,
            thumbnails,
            cleaner,
            details: Mutex::new(HashMap::new()),
            recommended: Mutex::new(HashMap::new()),
        }
    }

    /// Title and thumbnail for `url`, looked up once per run.
    pub async fn link_details(&self, url: &str) -> LinkDetails {
        if let Some(details) = self.details.lock().get(url) {
            return details.clone();
        }
        let details = self.lookup_details(url).await;
        self.details
            .lock()
            .insert(url.to_string(), details.clone());
        details
    }

    async fn lookup_details(&self, url: &str) -> LinkDetails {
        let hash = fnv1a_64_hex(url);

        let mut thumbnail_url = match self.thumbnails.thumbnail_url(&hash).await {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                warn!(url = url, error = %e, "Failed to check thumbnail");
                String::new()
            }
        };

        let mut title = match self.db.get_url_metadata(&hash).await {
            Ok(found) => found.map(|metadata| metadata.title).unwrap_or_default(),
            Err(e) => {
                warn!(url = url, error = %e, "Failed to read url metadata");
                String::new()
            }
        };

        if !title.is_empty() && !thumbnail_url.is_empty() {
            return LinkDetails {
                title,
                thumbnail_url,
            };
        }

        let card = self.cards.card_metadata(url).await;

        if title.is_empty() {
            title = self.cleaner.format_title(&card.title);
            if !title.is_empty() {
                let metadata = UrlMetadata {
                    url_hash: hash.clone(),
                    url: url.to_string(),
                    title: title.clone(),
                    updated_at: Utc::now(),
                };
                if let Err(e) = self.db.save_url_metadata(&metadata).await {
                    warn!(url = url, error = %e, "Failed to save url metadata");
                }
            }
        }

        if thumbnail_url.is_empty() && !card.image_url.is_empty() {
            match self.thumbnails.save_thumbnail(&hash, &card.image_url).await {
                Ok(saved) => thumbnail_url = saved,
                Err(e) => warn!(url = url, image = %card.image_url, error = %e, "Failed to save thumbnail"),
            }
        }

        LinkDetails {
            title,
            thumbnail_url,
        }
    }

    /// Up to three popular English posts from distinct authors, taken from
    /// `candidates` in order.
    pub async fn recommended_posts(&self, candidates: &[String]) -> Vec<Post> {
        let mut accepted: Vec<Post> = Vec::new();
        let mut handles: HashSet<String> = HashSet::new();

        for at_uri in candidates {
            if accepted.len() >= RECOMMENDED_POSTS {
                break;
            }

            let view = match self.posts.get_post(at_uri).await {
                Ok(Some(view)) => view,
                Ok(None) => continue,
                Err(e) => {
                    warn!(at_uri = %at_uri, error = %e, "Failed to fetch post");
                    continue;
                }
            };

            let text = self.cleaner.format_post(&view.record.text);
            if text.is_empty()
                || !view.is_english()
                || view.like_count <= MIN_POST_LIKES
                || handles.contains(&view.author.handle)
            {
                continue;
            }

            handles.insert(view.author.handle.clone());
            accepted.push(Post {
                rank: accepted.len() + 1,
                at_uri: at_uri.clone(),
                username: view.author.display_name,
                handle: view.author.handle,
                text,
            });
        }
        accepted
    }

    async fn link_posts(&self, url: &str, item: &LinkItem) -> Vec<Post> {
        if let Some(posts) = self.recommended.lock().get(url) {
            return posts.clone();
        }
        let posts = self.recommended_posts(&item.top_posts(CANDIDATE_POSTS)).await;
        self.recommended
            .lock()
            .insert(url.to_string(), posts.clone());
        posts
    }

    /// Hydrate one ranked link. Counts come from `window`.
    pub async fn hydrate_link(&self, rank: usize, url: &str, item: &LinkItem, window: Window) -> Link {
        let details = self.link_details(url).await;
        let recommended_posts = self.link_posts(url, item).await;
        let Counts {
            posts,
            reposts,
            likes,
        } = item.counts(window);

        debug!(url = url, rank = rank, window = window.label(), "Hydrated link");
        Link {
            rank,
            url: url.to_string(),
            title: if details.title.is_empty() {
                NO_TITLE.to_string()
            } else {
                details.title
            },
            thumbnail_url: details.thumbnail_url,
            post_count: posts,
            repost_count: reposts,
            like_count: likes,
            recommended_posts,
        }
    }

    /// Hydrate a ranked list, keeping its order.
    pub async fn hydrate_links(&self, ranked: &[(String, LinkItem)], window: Window) -> Vec<Link> {
        stream::iter(ranked.iter().enumerate())
            .map(|(i, (url, item))| self.hydrate_link(i + 1, url, item, window))
            .buffered(HYDRATION_CONCURRENCY)
            .collect()
            .await
    }

    /// Hydrate a ranked site and up to `links_per_site` of its links.
    ///
    /// Links without a title are left out and the rest re-ranked.
    pub async fn hydrate_site(
        &self,
        rank: usize,
        domain: &str,
        item: &SiteItem,
        links_per_site: usize,
    ) -> Site {
        let top = item.top_links(links_per_site);
        let hydrated: Vec<(String, Counts, LinkDetails)> = stream::iter(top)
            .map(|(url, counts)| async move {
                let details = self.link_details(&url).await;
                (url, counts, details)
            })
            .buffered(HYDRATION_CONCURRENCY)
            .collect()
            .await;

        let links = hydrated
            .into_iter()
            .filter(|(_, _, details)| !details.title.is_empty())
            .enumerate()
            .map(|(i, (url, counts, details))| SiteLink {
                rank: i + 1,
                url,
                title: details.title,
                thumbnail_url: details.thumbnail_url,
                interactions: counts.interactions(),
            })
            .collect();

        Site {
            rank,
            name: domain.to_string(),
            domain: domain.to_string(),
            interactions: item.interactions(),
            links,
        }
    }
}
