// Per-link tallies over the hour, day and week windows.

use std::collections::HashMap;

use super::{CountedEvent, Counts, Tally, TimeBounds};

/// Ranking window for links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Hour,
    Day,
    Week,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Hour, Window::Day, Window::Week];

    pub fn label(self) -> &'static str {
        match self {
            Window::Hour => "hour",
            Window::Day => "day",
            Window::Week => "week",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkItem {
    pub hour: Counts,
    pub day: Counts,
    pub week: Counts,
    /// Interactions per post that carried the link.
    pub posts: HashMap<String, u64>,
}

impl LinkItem {
    pub fn counts(&self, window: Window) -> Counts {
        match window {
            Window::Hour => self.hour,
            Window::Day => self.day,
            Window::Week => self.week,
        }
    }

    pub fn score(&self, window: Window) -> u64 {
        self.counts(window).score()
    }

    /// Up to `n` post URIs ordered by interaction count, highest first.
    pub fn top_posts(&self, n: usize) -> Vec<String> {
        let mut posts: Vec<(&String, &u64)> = self.posts.iter().collect();
        posts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        posts.into_iter().take(n).map(|(uri, _)| uri.clone()).collect()
    }
}

impl Tally for LinkItem {
    fn count_event(&mut self, event: &CountedEvent<'_>, bounds: &TimeBounds) {
        if bounds.in_hour(event.timestamp) {
            self.hour.add(event.kind);
        }
        if bounds.in_day(event.timestamp) {
            self.day.add(event.kind);
        }
        if bounds.in_window(event.timestamp) {
            self.week.add(event.kind);
        }
        *self.posts.entry(event.post_uri.to_string()).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::events::EventKind;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_score_and_top_posts() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let bounds = TimeBounds::new(now);
        let mut item = LinkItem::default();
        for (kind, post) in [
            (EventKind::Post, "abc"),
            (EventKind::Repost, "abc"),
            (EventKind::Repost, "abc"),
            (EventKind::Like, "xyz"),
            (EventKind::Like, "xyz"),
        ] {
            item.count_event(
                &CountedEvent {
                    kind,
                    key: "u",
                    url: "u",
                    post_uri: post,
                    actor_id: "d",
                    timestamp: now,
                },
                &bounds,
            );
        }
        assert_eq!(item.score(Window::Hour), 32);
        assert_eq!(item.top_posts(20), vec!["abc", "xyz"]);
        assert_eq!(item.top_posts(1), vec!["abc"]);
    }

    #[test]
    fn test_windows_are_nested() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let bounds = TimeBounds::new(now);
        let mut item = LinkItem::default();
        for age in [Duration::minutes(10), Duration::hours(5), Duration::days(3)] {
            item.count_event(
                &CountedEvent {
                    kind: EventKind::Like,
                    key: "u",
                    url: "u",
                    post_uri: "p",
                    actor_id: "d",
                    timestamp: now - age,
                },
                &bounds,
            );
        }
        assert_eq!(item.hour.likes, 1);
        assert_eq!(item.day.likes, 2);
        assert_eq!(item.week.likes, 3);
    }

    #[test]
    fn test_window_start_is_exclusive() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let bounds = TimeBounds::new(now);
        let mut item = LinkItem::default();
        item.count_event(
            &CountedEvent {
                kind: EventKind::Post,
                key: "u",
                url: "u",
                post_uri: "p",
                actor_id: "d",
                timestamp: bounds.hour_start,
            },
            &bounds,
        );
        assert_eq!(item.hour.posts, 0);
        assert_eq!(item.day.posts, 1);
        assert_eq!(item.week.posts, 1);
    }
}
