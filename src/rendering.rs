// Browser rendering client — headless-browser scraping over HTTP.
//
// Used as the fallback when the card extractor can't produce a title or
// image, and to find the publisher link behind Apple News pages. The
// service renders the page and returns the elements matching each selector.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ratelimit::{with_retry, RateLimited, RetryPolicy};

/// Default API base for the rendering service.
pub const DEFAULT_BROWSER_RENDERING_ENDPOINT: &str = "https://api.cloudflare.com/client/v4";

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

/// Up to 3 retries on 429, one second apart.
pub const RENDERING_RETRY_POLICY: RetryPolicy = RetryPolicy::fixed(3, Duration::from_secs(1));

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    elements: Vec<ElementSelector<'a>>,
}

#[derive(Debug, Serialize)]
struct ElementSelector<'a> {
    selector: &'a str,
}

/// Body of a scrape response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScrapeResponse {
    pub success: bool,
    pub result: Vec<SelectorResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SelectorResult {
    pub selector: String,
    pub results: Vec<ScrapedElement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScrapedElement {
    pub attributes: Vec<Attribute>,
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl ScrapedElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.value.as_str())
    }
}

impl ScrapeResponse {
    /// Values of attribute `name` on every element matched by `selector`,
    /// in document order.
    pub fn attribute_values(&self, selector: &str, name: &str) -> Vec<String> {
        self.result
            .iter()
            .filter(|result| result.selector == selector)
            .flat_map(|result| result.results.iter())
            .filter_map(|element| element.attribute(name))
            .map(str::to_string)
            .collect()
    }

    /// First non-empty value of attribute `name` under `selector`.
    pub fn first_attribute(&self, selector: &str, name: &str) -> Option<String> {
        self.attribute_values(selector, name)
            .into_iter()
            .find(|value| !value.is_empty())
    }
}

pub struct BrowserRenderingClient {
    client: reqwest::Client,
    scrape_url: String,
    token: String,
}

impl BrowserRenderingClient {
    pub fn new(base_url: &str, account_id: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SCRAPE_TIMEOUT)
            .build()
            .context("Failed to build browser rendering HTTP client")?;

        Ok(Self {
            client,
            scrape_url: format!(
                "{}/accounts/{account_id}/browser-rendering/scrape",
                base_url.trim_end_matches('/')
            ),
            token: token.to_string(),
        })
    }

    /// Render `url` and return the elements matching each selector.
    ///
    /// 429 responses are retried per [`RENDERING_RETRY_POLICY`].
    pub async fn scrape(&self, url: &str, selectors: &[&str]) -> Result<ScrapeResponse> {
        let response = with_retry(RENDERING_RETRY_POLICY, || {
            self.scrape_once(url, selectors)
        })
        .await
        .with_context(|| format!("Failed to scrape {url}"))?;

        if !response.success {
            anyhow::bail!("Browser rendering reported failure for {url}");
        }
        Ok(response)
    }

    async fn scrape_once(&self, url: &str, selectors: &[&str]) -> Result<ScrapeResponse> {
        let body = ScrapeRequest {
            url,
            elements: selectors
                .iter()
                .map(|selector| ElementSelector { selector })
                .collect(),
        };

        debug!(url = url, "Browser rendering scrape");
        let response = self
            .client
            .post(&self.scrape_url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("Browser rendering request failed")?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RateLimited {
                service: "browser rendering".to_string(),
            }
            .into());
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            anyhow::bail!("Browser rendering returned {status}: {message}");
        }

        response
            .json::<ScrapeResponse>()
            .await
            .context("Failed to decode browser rendering response")
    }
}
