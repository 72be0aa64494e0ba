// Link aggregation — one-shot run producing the top links snapshot.
//
// Counts the last week of events per cleaned URL, ranks each window and
// hydrates the winners. Any event-log failure aborts the run.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use super::hydration::Hydrator;
use super::publish::Publisher;
use crate::aggregation::{
    scan_chunks, Aggregation, AggregationConfig, KeyBy, LinkItem, TimeBounds, Window,
    BLOOM_FALSE_POSITIVE_RATE, NUM_BLOOM_SHARDS,
};
use crate::db::{previous_month_start, Database};
use crate::snapshot::Snapshot;
use crate::storage::EventLog;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkAggregationSettings {
    pub workers: usize,
    /// Links per window in the snapshot.
    pub list_size: usize,
    pub aggregation: AggregationConfig,
}

impl Default for LinkAggregationSettings {
    fn default() -> Self {
        Self {
            workers: 6,
            list_size: 10,
            aggregation: AggregationConfig {
                shards: 1024,
                bloom_shards: NUM_BLOOM_SHARDS,
                estimated_events: 25_000_000,
                false_positive_rate: BLOOM_FALSE_POSITIVE_RATE,
            },
        }
    }
}

/// Count a week of events ending at `now`.
pub async fn aggregate(
    log: &EventLog,
    db: &Arc<dyn Database>,
    settings: &LinkAggregationSettings,
    now: DateTime<Utc>,
) -> Result<Arc<Aggregation<LinkItem>>> {
    let bounds = TimeBounds::new(now);

    let translations = db
        .get_translations_since(previous_month_start(now))
        .await
        .context("Failed to load translations")?;
    info!(translations = translations.len(), "Loaded translations");

    let chunks = log.list_event_chunks(bounds.window_start, now).await?;

    let aggregation = Arc::new(Aggregation::new(settings.aggregation, bounds));
    scan_chunks(
        aggregation.clone(),
        log.clone(),
        chunks,
        Arc::new(translations),
        KeyBy::Url,
        settings.workers,
    )
    .await?;
    Ok(aggregation)
}

/// Rank and hydrate each window.
pub async fn build_snapshot(
    aggregation: &Aggregation<LinkItem>,
    hydrator: &Hydrator,
    list_size: usize,
) -> Snapshot {
    let mut lists = Vec::with_capacity(Window::ALL.len());
    for window in Window::ALL {
        let ranked = aggregation.top_by(list_size, |item| item.score(window));
        lists.push(hydrator.hydrate_links(&ranked, window).await);
    }

    let top_week = lists.pop().unwrap_or_default();
    let top_day = lists.pop().unwrap_or_default();
    let top_hour = lists.pop().unwrap_or_default();

    Snapshot {
        generated_at: aggregation.bounds().now,
        links: top_day.clone(),
        top_hour,
        top_day,
        top_week,
    }
}

/// Aggregate, hydrate and publish. Returns the published snapshot.
pub async fn run(
    log: &EventLog,
    db: &Arc<dyn Database>,
    hydrator: &Hydrator,
    publisher: &Publisher,
    settings: &LinkAggregationSettings,
) -> Result<Snapshot> {
    let started = std::time::Instant::now();
    let now = Utc::now();

    let aggregation = aggregate(log, db, settings, now).await?;
    let snapshot = build_snapshot(&aggregation, hydrator, settings.list_size).await;
    publisher.publish_links(&snapshot).await?;

    info!(
        seconds = started.elapsed().as_secs_f64(),
        "Link aggregation complete"
    );
    Ok(snapshot)
}
