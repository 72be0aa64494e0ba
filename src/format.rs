// Text cleanup for titles and recommended post text.
//
// Headlines shared on Bluesky are often dressed up with siren emoji and
// "BREAKING:"-style prefixes. The prefix list drifts over time, so it is
// injected from configuration; the built-in list is only a default.

use std::sync::LazyLock;

use regex_lite::Regex;

/// Prefixes stripped from the start of titles and posts unless overridden.
pub const DEFAULT_SENSATIONAL_PREFIXES: &[&str] = &[
    "BREAKING:",
    "Breaking:",
    "BREAKING NEWS:",
    "Breaking News:",
    "NEW:",
    "New:",
    "EXCLUSIVE:",
    "Exclusive:",
    "🔴",
    "💥",
];

const SIREN: &str = "🚨";

/// A URL cut short by the client, e.g. `www.example.com/some-artic...`.
static TRUNCATED_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(www\.)?[\w.-]+\.[a-z]{2,}(/[^\s]*)?\w*\.{3}")
        .expect("truncated URL pattern is valid")
});

/// Cleans titles and post text for display.
#[derive(Debug, Clone)]
pub struct TextCleaner {
    prefixes: Vec<String>,
}

impl Default for TextCleaner {
    fn default() -> Self {
        Self::new(
            DEFAULT_SENSATIONAL_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        )
    }
}

impl TextCleaner {
    /// Build a cleaner with a custom prefix list. Empty entries are dropped.
    pub fn new(prefixes: Vec<String>) -> Self {
        let prefixes = prefixes
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Remove siren emoji and leading sensationalist prefixes from a title.
    pub fn format_title(&self, input: &str) -> String {
        let without_siren = input.replace(SIREN, "");
        self.strip_prefixes(&without_siren).trim().to_string()
    }

    /// Flatten post text to a single clean line.
    ///
    /// Control whitespace becomes spaces, siren emoji and leading prefixes
    /// are removed, runs of whitespace collapse, and URLs the client
    /// truncated with `...` are dropped. Applied until the text stops
    /// changing, so the result is stable under repeated formatting.
    pub fn format_post(&self, input: &str) -> String {
        let mut current = input.to_string();
        loop {
            let next = self.format_post_once(&current);
            if next == current {
                return next;
            }
            current = next;
        }
    }

    fn format_post_once(&self, input: &str) -> String {
        let flattened = input.replace(['\n', '\r', '\t'], " ").replace(SIREN, "");
        let stripped = self.strip_prefixes(&flattened);
        let collapsed = collapse_whitespace(stripped);
        let without_urls = TRUNCATED_URL.replace_all(&collapsed, "");
        collapse_whitespace(&without_urls)
    }

    /// Strip any number of leading prefixes, ignoring whitespace between them.
    fn strip_prefixes<'a>(&self, input: &'a str) -> &'a str {
        let mut rest = input.trim_start();
        while let Some(prefix) = self.prefixes.iter().find(|p| rest.starts_with(p.as_str())) {
            rest = rest[prefix.len()..].trim_start();
        }
        rest
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
