// Redirect resolution — find where a shortened link actually goes.
//
// Redirects are followed by hand, at most two hops, with a short timeout on
// each request. Anything deeper than two hops is treated as the second hop.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header::LOCATION, StatusCode};
use tracing::debug;
use url::Url;

/// Hosts whose redirects bounce through a tracking service and back.
pub const NO_REDIRECT_HOSTS: &[&str] = &["www.nature.com"];

/// Per-hop request timeout.
pub const REDIRECT_TIMEOUT: Duration = Duration::from_secs(1);

const REDIRECT_STATUSES: &[StatusCode] = &[
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// HTTP client that reports redirects instead of following them.
pub struct RedirectResolver {
    client: reqwest::Client,
}

impl RedirectResolver {
    pub fn new() -> Result<Self> {
        Self::with_timeout(REDIRECT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .context("Failed to build redirect HTTP client")?;
        Ok(Self { client })
    }

    /// Find the destination of `input` by following up to two redirects.
    ///
    /// Returns an empty string when the first request does not redirect or
    /// fails. A failure on the second hop returns the first hop.
    pub async fn find_redirect(&self, input: &str) -> String {
        if let Ok(parsed) = Url::parse(input) {
            if parsed
                .host_str()
                .is_some_and(|host| NO_REDIRECT_HOSTS.contains(&host))
            {
                return String::new();
            }
        }

        let first = match self.location_of(input).await {
            Some(location) => resolve_location(input, &location),
            None => return String::new(),
        };

        match self.location_of(&first).await {
            Some(location) => resolve_location(&first, &location),
            None => first,
        }
    }

    /// Issue a GET and return the `Location` header if the response is a redirect.
    async fn location_of(&self, url: &str) -> Option<String> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = url, error = %e, "Redirect check failed");
                return None;
            }
        };

        if !REDIRECT_STATUSES.contains(&response.status()) {
            return None;
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .filter(|location| !location.is_empty())
            .map(str::to_string)
    }
}

/// Combine a URL with the `Location` header of its redirect response.
///
/// - absolute location: returned as-is
/// - location starting with `/`: replaces the path of `original`
/// - anything else: appended to `original`, adding `/` only when needed
pub fn resolve_location(original: &str, location: &str) -> String {
    let Ok(mut base) = Url::parse(original) else {
        return original.to_string();
    };

    match Url::parse(location) {
        Ok(absolute) => return absolute.to_string(),
        Err(url::ParseError::RelativeUrlWithoutBase) => {}
        Err(_) => return original.to_string(),
    }

    if location.starts_with('/') {
        // An absolute path may carry its own query and fragment
        return match base.join(location) {
            Ok(joined) => joined.to_string(),
            Err(_) => {
                base.set_path(location);
                base.to_string()
            }
        };
    }

    if original.ends_with('/') {
        format!("{original}{location}")
    } else {
        format!("{original}/{location}")
    }
}
