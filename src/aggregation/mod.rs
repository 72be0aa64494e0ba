// Aggregation engine — sharded, deduplicated interaction counts.
//
// Workers share one Aggregation by reference. Each event takes two short
// locks: a bloom shard to drop repeats of (url, kind, actor), then a data
// shard to bump the item's counters. Shard indexes come from fnv32, so the
// same key always lands on the same shard.

pub mod bloom;
pub mod links;
pub mod scan;
pub mod sites;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use self::bloom::BloomFilter;
use crate::hash::fnv32;
use crate::storage::events::EventKind;

pub use self::links::{LinkItem, Window};
pub use self::scan::{scan_chunks, KeyBy};
pub use self::sites::SiteItem;

/// Number of bloom filter shards used for deduplication.
pub const NUM_BLOOM_SHARDS: usize = 64;

/// Target false-positive rate of the dedup filters.
pub const BLOOM_FALSE_POSITIVE_RATE: f64 = 0.001;

/// Start instants of each window, fixed for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBounds {
    pub now: DateTime<Utc>,
    pub hour_start: DateTime<Utc>,
    pub day_start: DateTime<Utc>,
    /// Start of the outermost window: a week for links, 30 days for sites.
    pub window_start: DateTime<Utc>,
}

impl TimeBounds {
    /// Hour, day and week windows ending at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_window(now, Duration::days(7))
    }

    /// Hour and day windows plus an outer window of length `window`.
    pub fn with_window(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            now,
            hour_start: now - Duration::hours(1),
            day_start: now - Duration::hours(24),
            window_start: now - window,
        }
    }

    /// Events before the outer window count nowhere.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.window_start
    }

    /// Window membership is strict: an event stamped exactly at a window's
    /// start belongs to the next wider window only.
    pub fn in_hour(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp > self.hour_start
    }

    pub fn in_day(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp > self.day_start
    }

    pub fn in_window(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp > self.window_start
    }
}

/// Per-kind counts over one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub posts: u64,
    pub reposts: u64,
    pub likes: u64,
}

impl Counts {
    pub fn add(&mut self, kind: EventKind) {
        match kind {
            EventKind::Post => self.posts += 1,
            EventKind::Repost => self.reposts += 1,
            EventKind::Like => self.likes += 1,
        }
    }

    /// Ranking score: posts and reposts weigh ten times a like.
    pub fn score(&self) -> u64 {
        self.posts * 10 + self.reposts * 10 + self.likes
    }

    /// Unweighted number of interactions.
    pub fn interactions(&self) -> u64 {
        self.posts + self.reposts + self.likes
    }
}

/// One event as seen by the aggregation.
#[derive(Debug, Clone, Copy)]
pub struct CountedEvent<'a> {
    pub kind: EventKind,
    /// Shard key: the URL for links, the host for sites.
    pub key: &'a str,
    /// Cleaned, translated URL.
    pub url: &'a str,
    pub post_uri: &'a str,
    pub actor_id: &'a str,
    pub timestamp: DateTime<Utc>,
}

/// An item that accumulates events for one key.
pub trait Tally: Default + Send {
    fn count_event(&mut self, event: &CountedEvent<'_>, bounds: &TimeBounds);
}

/// What `count_event` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountOutcome {
    Counted,
    Duplicate,
    OutOfWindow,
}

/// Shape of an aggregation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationConfig {
    pub shards: usize,
    pub bloom_shards: usize,
    /// Expected number of events in the run; sizes the bloom filters.
    pub estimated_events: usize,
    pub false_positive_rate: f64,
}

pub struct Aggregation<T> {
    shards: Vec<Mutex<HashMap<String, T>>>,
    blooms: Vec<Mutex<BloomFilter>>,
    bounds: TimeBounds,
    total: AtomicU64,
    skipped: AtomicU64,
}

impl<T: Tally> Aggregation<T> {
    pub fn new(config: AggregationConfig, bounds: TimeBounds) -> Self {
        let shard_count = config.shards.max(1);
        let bloom_count = config.bloom_shards.max(1);
        let per_bloom = config.estimated_events / bloom_count;

        Self {
            shards: (0..shard_count).map(|_| Mutex::new(HashMap::new())).collect(),
            blooms: (0..bloom_count)
                .map(|_| Mutex::new(BloomFilter::with_rate(per_bloom, config.false_positive_rate)))
                .collect(),
            bounds,
            total: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn bounds(&self) -> &TimeBounds {
        &self.bounds
    }

    /// Count one event unless it is outside the windows or a repeat of
    /// the same (url, kind, actor).
    pub fn count_event(&self, event: &CountedEvent<'_>) -> CountOutcome {
        if !self.bounds.contains(event.timestamp) {
            return CountOutcome::OutOfWindow;
        }

        let fingerprint = format!("{}{}{}", event.url, event.kind.code(), event.actor_id);
        let bloom_index = fnv32(&fingerprint) as usize % self.blooms.len();
        if self.blooms[bloom_index].lock().test_and_add(&fingerprint) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return CountOutcome::Duplicate;
        }

        let shard_index = fnv32(event.key) as usize % self.shards.len();
        {
            let mut shard = self.shards[shard_index].lock();
            shard
                .entry(event.key.to_string())
                .or_default()
                .count_event(event, &self.bounds);
        }

        self.total.fetch_add(1, Ordering::Relaxed);
        CountOutcome::Counted
    }

    /// Events counted.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Events dropped as duplicates.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Tally + Clone> Aggregation<T> {
    pub fn get(&self, key: &str) -> Option<T> {
        let shard_index = fnv32(key) as usize % self.shards.len();
        self.shards[shard_index].lock().get(key).cloned()
    }

    /// The `n` highest-scoring keys with a copy of their items.
    ///
    /// Ties break by key so rankings are reproducible. Keys that score zero
    /// in this window still fill the list after every scored key.
    pub fn top_by<F>(&self, n: usize, score: F) -> Vec<(String, T)>
    where
        F: Fn(&T) -> u64,
    {
        let mut scored: Vec<(u64, String)> = Vec::new();
        for shard in &self.shards {
            let shard = shard.lock();
            scored.extend(
                shard
                    .iter()
                    .map(|(key, item)| (score(item), key.clone())),
            );
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.truncate(n);

        scored
            .into_iter()
            .filter_map(|(_, key)| self.get(&key).map(|item| (key, item)))
            .collect()
    }
}
