// Card metadata — title and preview image for a link.
//
// The card extractor is tried first. When it leaves the title or image
// empty, the page is rendered and its Open Graph tags are read instead.
// Results are raw; hydration applies title formatting.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::ratelimit::RequestSpacing;
use crate::rendering::BrowserRenderingClient;
use crate::urls::rules::is_apple;

/// Default card extractor endpoint.
pub const DEFAULT_CARDYB_ENDPOINT: &str = "https://cardyb.bsky.app";

/// Minimum spacing between card extractor calls.
pub const CARDYB_SPACING: Duration = Duration::from_secs(1);

const OG_TITLE: &str = r#"meta[property="og:title"]"#;
const OG_IMAGE: &str = r#"meta[property="og:image"]"#;

/// Title and image for a link. Either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CardMetadata {
    pub title: String,
    #[serde(rename = "image")]
    pub image_url: String,
}

impl CardMetadata {
    pub fn is_complete(&self) -> bool {
        !self.title.is_empty() && !self.image_url.is_empty()
    }

    /// Fill empty fields from `other`.
    fn fill_from(&mut self, other: CardMetadata) {
        if self.title.is_empty() {
            self.title = other.title;
        }
        if self.image_url.is_empty() {
            self.image_url = other.image_url;
        }
    }
}

/// Source of card metadata. Implemented by [`CardFetcher`] and test fakes.
#[async_trait]
pub trait CardSource: Send + Sync {
    /// Best-effort metadata for `url`. Failures degrade to empty fields.
    async fn card_metadata(&self, url: &str) -> CardMetadata;
}

pub struct CardFetcher {
    http: reqwest::Client,
    cardyb_endpoint: String,
    spacing: Arc<RequestSpacing>,
    rendering: Option<Arc<BrowserRenderingClient>>,
}

impl CardFetcher {
    pub fn new(cardyb_endpoint: &str, rendering: Option<Arc<BrowserRenderingClient>>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build card HTTP client")?;
        Ok(Self {
            http,
            cardyb_endpoint: cardyb_endpoint.trim_end_matches('/').to_string(),
            spacing: Arc::new(RequestSpacing::new(CARDYB_SPACING)),
            rendering,
        })
    }

    /// Ask the card extractor for `url`.
    pub async fn fetch_cardyb(&self, url: &str) -> Result<CardMetadata> {
        self.spacing.acquire().await;

        let endpoint = format!("{}/v1/extract", self.cardyb_endpoint);
        let response = self
            .http
            .get(&endpoint)
            .query(&[("url", url)])
            .send()
            .await
            .with_context(|| format!("Card extractor request failed for {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("Card extractor returned {} for {url}", response.status());
        }

        response
            .json::<CardMetadata>()
            .await
            .with_context(|| format!("Failed to decode card for {url}"))
    }

    /// Read Open Graph title and image from the rendered page.
    pub async fn fetch_rendered(&self, url: &str) -> Result<CardMetadata> {
        let Some(rendering) = &self.rendering else {
            anyhow::bail!("Browser rendering is not configured");
        };
        let response = rendering.scrape(url, &[OG_TITLE, OG_IMAGE]).await?;
        Ok(CardMetadata {
            title: response.first_attribute(OG_TITLE, "content").unwrap_or_default(),
            image_url: response.first_attribute(OG_IMAGE, "content").unwrap_or_default(),
        })
    }
}

#[async_trait]
impl CardSource for CardFetcher {
    async fn card_metadata(&self, url: &str) -> CardMetadata {
        let mut card = match self.fetch_cardyb(url).await {
            Ok(card) => card,
            Err(e) => {
                warn!(url = url, error = %e, "Card extractor failed");
                CardMetadata::default()
            }
        };

        if !card.is_complete() && self.rendering.is_some() {
            match self.fetch_rendered(url).await {
                Ok(rendered) => card.fill_from(rendered),
                Err(e) => warn!(url = url, error = %e, "Rendered card lookup failed"),
            }
        }

        debug!(url = url, title = %card.title, image = %card.image_url, "Card metadata");
        card
    }
}

/// The publisher link behind an Apple News page: the first anchor that
/// doesn't point back at Apple.
pub async fn apple_news_destination(
    rendering: &BrowserRenderingClient,
    url: &str,
) -> Result<Option<String>> {
    let response = rendering.scrape(url, &["a"]).await?;
    Ok(first_non_apple_link(response.attribute_values("a", "href")))
}

fn first_non_apple_link(hrefs: Vec<String>) -> Option<String> {
    hrefs
        .into_iter()
        .find(|href| href.starts_with("http") && !is_apple(href))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_decodes_extractor_response() {
        let card: CardMetadata = serde_json::from_str(
            r#"{"error":"","likely_type":"html","url":"https://x.com","title":"T","description":"D","image":"https://img"}"#,
        )
        .unwrap();
        assert_eq!(card.title, "T");
        assert_eq!(card.image_url, "https://img");
        assert!(card.is_complete());
    }

    #[test]
    fn test_fill_from_keeps_existing_fields() {
        let mut card = CardMetadata {
            title: "Kept".to_string(),
            image_url: String::new(),
        };
        card.fill_from(CardMetadata {
            title: "Ignored".to_string(),
            image_url: "https://img".to_string(),
        });
        assert_eq!(card.title, "Kept");
        assert_eq!(card.image_url, "https://img");
    }

    #[test]
    fn test_first_non_apple_link() {
        let hrefs = vec![
            "https://www.apple.com/apple-news/".to_string(),
            "/relative".to_string(),
            "https://apple.news/abc".to_string(),
            "https://www.theatlantic.com/story".to_string(),
            "https://example.com/later".to_string(),
        ];
        assert_eq!(
            first_non_apple_link(hrefs).as_deref(),
            Some("https://www.theatlantic.com/story")
        );
        assert!(first_non_apple_link(vec!["https://apple.news/x".to_string()]).is_none());
    }
}
