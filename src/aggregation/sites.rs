// Per-site tallies: total interactions and a breakdown by link.

use std::collections::HashMap;

use super::{CountedEvent, Counts, Tally, TimeBounds};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteItem {
    pub counts: Counts,
    pub links: HashMap<String, Counts>,
}

impl SiteItem {
    /// Interactions with any link on the site.
    pub fn interactions(&self) -> u64 {
        self.counts.interactions()
    }

    /// Up to `n` links ordered by interactions, highest first.
    pub fn top_links(&self, n: usize) -> Vec<(String, Counts)> {
        let mut links: Vec<(&String, &Counts)> = self.links.iter().collect();
        links.sort_by(|a, b| {
            b.1.interactions()
                .cmp(&a.1.interactions())
                .then_with(|| a.0.cmp(b.0))
        });
        links
            .into_iter()
            .take(n)
            .map(|(url, counts)| (url.clone(), *counts))
            .collect()
    }
}

impl Tally for SiteItem {
    fn count_event(&mut self, event: &CountedEvent<'_>, bounds: &TimeBounds) {
        if !bounds.contains(event.timestamp) {
            return;
        }
        self.counts.add(event.kind);
        self.links
            .entry(event.url.to_string())
            .or_default()
            .add(event.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::events::EventKind;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_site_tracks_links() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let bounds = TimeBounds::with_window(now, Duration::days(30));
        let mut site = SiteItem::default();
        for (kind, url) in [
            (EventKind::Post, "https://nytimes.com/a"),
            (EventKind::Like, "https://nytimes.com/b"),
            (EventKind::Like, "https://nytimes.com/b"),
            (EventKind::Repost, "https://nytimes.com/b"),
        ] {
            site.count_event(
                &CountedEvent {
                    kind,
                    key: "nytimes.com",
                    url,
                    post_uri: "p",
                    actor_id: "d",
                    timestamp: now - Duration::days(20),
                },
                &bounds,
            );
        }
        assert_eq!(site.interactions(), 4);
        let top = site.top_links(6);
        assert_eq!(top[0].0, "https://nytimes.com/b");
        assert_eq!(top[0].1.interactions(), 3);
        assert_eq!(top[1].0, "https://nytimes.com/a");
    }
}
