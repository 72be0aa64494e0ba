// URL rules — the single source of truth for which links count and how
// they are spelled.
//
// Both intake and aggregation run every URL through `process_url`, so a rule
// change here takes effect on the next aggregation run without rewriting
// the event log. Cleaning works on the original string rather than on a
// re-serialized `Url`, so keys written by older runs stay byte-identical.

use url::Url;

/// Hosts that never count: image hosts, bots, explicit-content link hubs.
const IGNORED_HOSTS: &[&str] = &[
    "media.tenor.com",
    "mesonet.agron.iastate.edu",
    "beacons.ai",
    "yokubo.tv",
    "linktr.ee",
    "allmylinks.com",
    "onlyfans.com",
];

/// The social app's own domains. We only track links that leave the network.
const APP_HOSTS: &[&str] = &["bsky.app", "go.bsky.app"];
const APP_HANDLE_SUFFIX: &str = ".bsky.social";

const IMAGE_SUFFIXES: &[&str] = &[".gif", ".jpg", ".jpeg", ".png"];

/// Hosts whose links are resolved in the background by the normalization service.
pub const SHORTENER_HOSTS: &[&str] = &[
    "bit.ly",
    "buff.ly",
    "ow.ly",
    "t.co",
    "shorturl.at",
    "goo.gl",
    "wapo.st",
    "youtu.be",
    "tinyurl.com",
];

const APPLE_NEWS_HOSTS: &[&str] = &["apple.news", "www.apple.news"];
const APPLE_HOSTS: &[&str] = &["apple.news", "www.apple.news", "apple.com", "www.apple.com"];

/// Query parameters that must survive cleaning, per host, in output order.
const QUERY_ALLOW_LIST: &[(&str, &[&str])] = &[
    ("youtube.com", &["v"]),
    ("m.youtube.com", &["v"]),
    ("www.youtube.com", &["v"]),
    ("abcnews.go.com", &["id"]),
    ("commons.stmarytx.edu", &["article", "context"]),
];

const SUBSTACK_OPEN_PREFIX: &str = "https://open.substack.com/pub/";

/// Outcome of running a raw URL through the rules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessedUrl {
    /// Cleaned URL (empty when ignored).
    pub url: String,
    /// Host of the cleaned URL with any leading `www.` removed (empty when ignored).
    pub host: String,
    /// True when the URL must be excluded from all counts.
    pub ignore: bool,
}

impl ProcessedUrl {
    fn ignored() -> Self {
        Self {
            ignore: true,
            ..Default::default()
        }
    }
}

/// Parse, filter, and clean a URL with a single parse of the input.
pub fn process_url(input: &str) -> ProcessedUrl {
    if input.is_empty() {
        return ProcessedUrl::ignored();
    }

    let stripped = strip_fragment(input);
    let parsed = match Url::parse(stripped) {
        Ok(parsed) => parsed,
        Err(_) => return ProcessedUrl::ignored(),
    };

    if should_ignore(&parsed) {
        return ProcessedUrl::ignored();
    }

    let cleaned = clean_parsed(stripped, &parsed);
    let host = Url::parse(&cleaned)
        .ok()
        .and_then(|u| u.host_str().map(trim_www))
        .unwrap_or_else(|| parsed.host_str().map(trim_www).unwrap_or_default());

    ProcessedUrl {
        url: cleaned,
        host,
        ignore: false,
    }
}

/// Clean a URL without applying the ignore rules.
///
/// Used for redirect destinations, which are persisted as translations even
/// when they point somewhere the aggregator will later skip. Unparseable
/// input comes back with only the fragment removed.
pub fn clean(input: &str) -> String {
    let stripped = strip_fragment(input);
    match Url::parse(stripped) {
        Ok(parsed) => clean_parsed(stripped, &parsed),
        Err(_) => stripped.to_string(),
    }
}

/// Host of a URL for display, with any leading `www.` removed.
/// Returns an empty string when the URL cannot be parsed.
pub fn hostname(input: &str) -> String {
    Url::parse(input)
        .ok()
        .and_then(|u| u.host_str().map(trim_www))
        .unwrap_or_default()
}

/// Whether the URL points at a known link shortener.
pub fn is_shortened(input: &str) -> bool {
    host_in(input, SHORTENER_HOSTS)
}

/// Whether the URL is an Apple News share link.
pub fn is_apple_news(input: &str) -> bool {
    host_in(input, APPLE_NEWS_HOSTS)
}

/// Whether the URL points at any Apple property (apple.com or apple.news).
pub fn is_apple(input: &str) -> bool {
    host_in(input, APPLE_HOSTS)
}

fn host_in(input: &str, hosts: &[&str]) -> bool {
    Url::parse(input)
        .ok()
        .and_then(|u| u.host_str().map(|h| hosts.contains(&h)))
        .unwrap_or(false)
}

fn strip_fragment(input: &str) -> &str {
    input.split('#').next().unwrap_or(input)
}

fn trim_www(host: &str) -> String {
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

fn should_ignore(parsed: &Url) -> bool {
    if parsed.scheme() != "https" {
        return true;
    }

    let host = parsed.host_str().unwrap_or_default();
    if IGNORED_HOSTS.contains(&host) || APP_HOSTS.contains(&host) {
        return true;
    }
    if host.ends_with(APP_HANDLE_SUFFIX) {
        return true;
    }

    let path = parsed.path().to_ascii_lowercase();
    IMAGE_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
}

fn clean_parsed(stripped: &str, parsed: &Url) -> String {
    let host = parsed.host_str().unwrap_or_default();
    let mut result = strip_query_with_exceptions(stripped, parsed, host);

    match host {
        "m.youtube.com" => result = result.replacen("m.youtube.com", "www.youtube.com", 1),
        "youtube.com" => result = result.replacen("youtube.com", "www.youtube.com", 1),
        "youtu.be" => {
            let video_id = result.rsplit('/').next().unwrap_or_default();
            result = format!("https://www.youtube.com/watch?v={video_id}");
        }
        _ => {}
    }

    if let Some(rewritten) = rewrite_substack_open_link(&result) {
        result = rewritten;
    }

    result
}

/// `https://open.substack.com/pub/<sub>/p/<slug>` -> `https://<sub>.substack.com/p/<slug>`
fn rewrite_substack_open_link(input: &str) -> Option<String> {
    let rest = input.strip_prefix(SUBSTACK_OPEN_PREFIX)?;
    let (publication, slug) = rest.split_once("/p/")?;
    if publication.is_empty() || publication.contains('/') || slug.is_empty() {
        return None;
    }
    Some(format!("https://{publication}.substack.com/p/{slug}"))
}

fn strip_query_with_exceptions(stripped: &str, parsed: &Url, host: &str) -> String {
    let mut result = match stripped.find('?') {
        Some(index) => stripped[..index].to_string(),
        None => stripped.to_string(),
    };

    let Some((_, allowed)) = QUERY_ALLOW_LIST.iter().find(|(h, _)| *h == host) else {
        return result;
    };

    let mut separator = '?';
    for key in allowed.iter() {
        let value = parsed
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned());
        if let Some(value) = value {
            result.push(separator);
            result.push_str(key);
            result.push('=');
            result.push_str(&value);
            separator = '&';
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_ignored() {
        assert!(process_url("").ignore);
    }

    #[test]
    fn test_unparseable_input_is_ignored() {
        assert!(process_url("invalid").ignore);
        assert_eq!(clean("invalid"), "invalid");
    }

    #[test]
    fn test_insecure_scheme_is_ignored() {
        assert!(process_url("http://example.com/article").ignore);
    }

    #[test]
    fn test_app_hosts_are_ignored() {
        assert!(process_url("https://bsky.app/profile/x").ignore);
        assert!(process_url("https://go.bsky.app/abc").ignore);
        assert!(process_url("https://someone.bsky.social").ignore);
    }

    #[test]
    fn test_listed_hosts_are_ignored() {
        for host in IGNORED_HOSTS {
            let url = format!("https://{host}/something");
            assert!(process_url(&url).ignore, "{url} should be ignored");
        }
    }

    #[test]
    fn test_image_paths_are_ignored() {
        assert!(process_url("https://example.com/cat.gif").ignore);
        assert!(process_url("https://example.com/cat.JPG").ignore);
        assert!(process_url("https://example.com/cat.jpeg?size=large").ignore);
        assert!(process_url("https://example.com/cat.png#top").ignore);
    }

    #[test]
    fn test_news_urls_are_kept() {
        let result = process_url("https://www.nytimes.com/2024/11/20/us/politics/story.html");
        assert!(!result.ignore);
        assert_eq!(result.host, "nytimes.com");

        let result = process_url("https://www.kxan.com/news/local/austin/story/");
        assert!(!result.ignore);
        assert_eq!(result.host, "kxan.com");
    }

    #[test]
    fn test_substack_rewrite_requires_publication_and_slug() {
        assert_eq!(rewrite_substack_open_link("https://open.substack.com/pub/x/p/"), None);
        assert_eq!(rewrite_substack_open_link("https://open.substack.com/pub//p/a"), None);
        assert_eq!(
            rewrite_substack_open_link("https://open.substack.com/pub/x/p/a"),
            Some("https://x.substack.com/p/a".to_string())
        );
    }

    #[test]
    fn test_shortener_and_apple_detection() {
        assert!(is_shortened("https://bit.ly/abc"));
        assert!(is_shortened("https://youtu.be/abc"));
        assert!(!is_shortened("https://example.com/abc"));
        assert!(is_apple_news("https://apple.news/AbC"));
        assert!(!is_apple_news("https://www.apple.com/newsroom"));
        assert!(is_apple("https://www.apple.com/newsroom"));
        assert!(!is_apple("https://example.com"));
    }

    #[test]
    fn test_hostname_trims_www_and_port() {
        assert_eq!(hostname("https://www.example.com:8443/path"), "example.com");
        assert_eq!(hostname("not a url"), "");
    }
}
