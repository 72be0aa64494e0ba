// Site aggregation — one-shot run producing the top sites snapshot.
//
// Same scan as links, keyed by host over thirty days. Each site keeps a
// per-link breakdown so its most shared links can be listed.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use tracing::info;

use super::hydration::Hydrator;
use super::publish::Publisher;
use crate::aggregation::{
    scan_chunks, Aggregation, AggregationConfig, KeyBy, SiteItem, TimeBounds,
    BLOOM_FALSE_POSITIVE_RATE, NUM_BLOOM_SHARDS,
};
use crate::db::{previous_month_start, Database};
use crate::snapshot::SitesSnapshot;
use crate::storage::EventLog;

/// Sites are ranked over this window.
pub const SITES_WINDOW: Duration = Duration::days(30);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteAggregationSettings {
    pub workers: usize,
    pub list_size: usize,
    pub links_per_site: usize,
    pub aggregation: AggregationConfig,
}

impl Default for SiteAggregationSettings {
    fn default() -> Self {
        Self {
            workers: 6,
            list_size: 10,
            links_per_site: 6,
            aggregation: AggregationConfig {
                shards: 512,
                bloom_shards: NUM_BLOOM_SHARDS,
                estimated_events: 110_000_000,
                false_positive_rate: BLOOM_FALSE_POSITIVE_RATE,
            },
        }
    }
}

/// Count thirty days of events ending at `now`, keyed by host.
pub async fn aggregate(
    log: &EventLog,
    db: &Arc<dyn Database>,
    settings: &SiteAggregationSettings,
    now: DateTime<Utc>,
) -> Result<Arc<Aggregation<SiteItem>>> {
    let bounds = TimeBounds::with_window(now, SITES_WINDOW);

    let translations = db
        .get_translations_since(previous_month_start(now))
        .await
        .context("Failed to load translations")?;

    let chunks = log.list_event_chunks(bounds.window_start, now).await?;

    let aggregation = Arc::new(Aggregation::new(settings.aggregation, bounds));
    scan_chunks(
        aggregation.clone(),
        log.clone(),
        chunks,
        Arc::new(translations),
        KeyBy::Host,
        settings.workers,
    )
    .await?;
    Ok(aggregation)
}

pub async fn build_snapshot(
    aggregation: &Aggregation<SiteItem>,
    hydrator: &Hydrator,
    settings: &SiteAggregationSettings,
) -> SitesSnapshot {
    let ranked = aggregation.top_by(settings.list_size, SiteItem::interactions);
    let sites = stream::iter(ranked.iter().enumerate())
        .then(|(i, (domain, item))| {
            hydrator.hydrate_site(i + 1, domain, item, settings.links_per_site)
        })
        .collect()
        .await;

    SitesSnapshot {
        generated_at: aggregation.bounds().now,
        sites,
    }
}

pub async fn run(
    log: &EventLog,
    db: &Arc<dyn Database>,
    hydrator: &Hydrator,
    publisher: &Publisher,
    settings: &SiteAggregationSettings,
) -> Result<SitesSnapshot> {
    let started = std::time::Instant::now();
    let now = Utc::now();

    let aggregation = aggregate(log, db, settings, now).await?;
    let snapshot = build_snapshot(&aggregation, hydrator, settings).await;
    publisher.publish_sites(&snapshot).await?;

    info!(
        seconds = started.elapsed().as_secs_f64(),
        "Site aggregation complete"
    );
    Ok(snapshot)
}
