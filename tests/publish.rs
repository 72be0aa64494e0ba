// Integration tests for publishing snapshots and the daily feed.
//
// Everything lands in an in-memory public bucket backed by an in-memory
// SQLite feed table, so a test can read back exactly what the site would.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};

use blue_report::aggregation::AggregationConfig;
use blue_report::bluesky::{PostLookup, PostView};
use blue_report::card::{CardMetadata, CardSource};
use blue_report::db::{Database, FeedEntry, FeedEntryContent, SqliteDatabase, TableNames};
use blue_report::format::TextCleaner;
use blue_report::hash::fnv1a_64_hex;
use blue_report::pipeline::feed::{update_feed, FeedLocation, ATOM_FEED_KEY, JSON_FEED_KEY};
use blue_report::pipeline::hydration::Hydrator;
use blue_report::pipeline::link_aggregation::{self, LinkAggregationSettings};
use blue_report::pipeline::publish::{Publisher, PUBLIC_CACHE_CONTROL};
use blue_report::pipeline::site_aggregation::{self, SiteAggregationSettings};
use blue_report::snapshot::{
    Link, Site, SitesSnapshot, Snapshot, LINKS_SNAPSHOT_KEY, SITES_SNAPSHOT_KEY,
};
use blue_report::storage::{
    EventKind, EventLog, EventRecord, MemoryObjectStore, ObjectStore, ThumbnailStore,
};

fn db() -> Arc<dyn Database> {
    Arc::new(SqliteDatabase::open_in_memory(TableNames::default()).unwrap())
}

fn location() -> FeedLocation {
    FeedLocation::new("https://theblue.report", "https://data.theblue.report")
}

fn link(url: &str, title: &str) -> Link {
    Link {
        rank: 1,
        url: url.to_string(),
        title: title.to_string(),
        ..Default::default()
    }
}

fn snapshot(top: Vec<Link>) -> Snapshot {
    Snapshot {
        generated_at: Utc::now(),
        top_hour: vec![],
        top_day: top.clone(),
        top_week: vec![],
        links: top,
    }
}

async fn read_json(store: &MemoryObjectStore, key: &str) -> serde_json::Value {
    let body = store.get(key).await.unwrap().unwrap();
    serde_json::from_slice(&body).unwrap()
}

// ============================================================
// Feed entries
// ============================================================

#[tokio::test]
async fn feed_entry_is_added_at_most_every_twelve_hours() {
    let db = db();
    let now = Utc::now();
    let first = link("https://example.com/first", "First");
    let second = link("https://example.com/second", "Second");

    assert!(update_feed(&db, Some(&first), now).await.unwrap());
    assert!(!update_feed(&db, Some(&second), now + Duration::hours(6))
        .await
        .unwrap());
    assert!(update_feed(&db, Some(&second), now + Duration::hours(13))
        .await
        .unwrap());

    let entries = db.list_feed_entries().await.unwrap();
    let titles: Vec<&str> = entries.iter().map(|e| e.content.title.as_str()).collect();
    assert_eq!(titles, vec!["Second", "First"]);
    assert_eq!(entries[1].url_hash, fnv1a_64_hex("https://example.com/first"));
}

#[tokio::test]
async fn no_top_link_means_no_entry() {
    let db = db();
    assert!(!update_feed(&db, None, Utc::now()).await.unwrap());
    assert!(!update_feed(&db, Some(&link("", "Empty")), Utc::now())
        .await
        .unwrap());
    assert!(db.list_feed_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn old_entries_are_pruned_after_an_insert() {
    let db = db();
    let now = Utc::now();
    db.add_feed_entry(&FeedEntry {
        url_hash: fnv1a_64_hex("https://example.com/ancient"),
        timestamp: now - Duration::days(91),
        content: FeedEntryContent {
            title: "Ancient".to_string(),
            url: "https://example.com/ancient".to_string(),
            recommended_posts: vec![],
        },
        published: false,
    })
    .await
    .unwrap();

    update_feed(&db, Some(&link("https://example.com/today", "Today")), now)
        .await
        .unwrap();

    let entries = db.list_feed_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content.title, "Today");
}

// ============================================================
// Publisher
// ============================================================

#[tokio::test]
async fn links_snapshot_and_feeds_are_published() {
    let store = Arc::new(MemoryObjectStore::new());
    let db = db();
    let publisher = Publisher::new(store.clone(), db.clone(), location());

    let snap = snapshot(vec![link("https://example.com/a", "Fish & Chips")]);
    publisher.publish_links(&snap).await.unwrap();

    let meta = store.head(LINKS_SNAPSHOT_KEY).await.unwrap().unwrap();
    assert_eq!(meta.options.content_type, "application/json");
    assert_eq!(meta.options.cache_control.as_deref(), Some(PUBLIC_CACHE_CONTROL));

    let json = read_json(&store, LINKS_SNAPSHOT_KEY).await;
    assert_eq!(json["top_day"][0]["title"], "Fish & Chips");
    assert_eq!(json["links"], json["top_day"]);

    let atom = String::from_utf8(store.get(ATOM_FEED_KEY).await.unwrap().unwrap()).unwrap();
    assert!(atom.contains("<title>Fish &amp; Chips</title>"));
    let atom_meta = store.head(ATOM_FEED_KEY).await.unwrap().unwrap();
    assert_eq!(atom_meta.options.content_type, "application/atom+xml");

    let feed = read_json(&store, JSON_FEED_KEY).await;
    assert_eq!(feed["items"].as_array().unwrap().len(), 1);
    assert_eq!(feed["items"][0]["url"], "https://example.com/a");
    let feed_meta = store.head(JSON_FEED_KEY).await.unwrap().unwrap();
    assert_eq!(feed_meta.options.content_type, "application/feed+json");
}

#[tokio::test]
async fn feeds_are_republished_even_when_no_entry_is_added() {
    let store = Arc::new(MemoryObjectStore::new());
    let publisher = Publisher::new(store.clone(), db(), location());

    publisher.publish_links(&snapshot(vec![])).await.unwrap();

    let feed = read_json(&store, JSON_FEED_KEY).await;
    assert!(feed["items"].as_array().unwrap().is_empty());
    assert!(store.exists(ATOM_FEED_KEY).await.unwrap());
}

#[tokio::test]
async fn sites_snapshot_is_published_with_a_local_copy() {
    let store = Arc::new(MemoryObjectStore::new());
    let dir = tempfile::tempdir().unwrap();
    let publisher =
        Publisher::new(store.clone(), db(), location()).with_local_copy(dir.path().join("dist"));

    let snap = SitesSnapshot {
        generated_at: Utc::now(),
        sites: vec![Site {
            rank: 1,
            name: "nytimes.com".to_string(),
            domain: "nytimes.com".to_string(),
            interactions: 42,
            links: vec![],
        }],
    };
    publisher.publish_sites(&snap).await.unwrap();

    let json = read_json(&store, SITES_SNAPSHOT_KEY).await;
    assert_eq!(json["sites"][0]["domain"], "nytimes.com");
    assert_eq!(json["sites"][0]["interactions"], 42);

    let local = std::fs::read(dir.path().join("dist").join("sites.json")).unwrap();
    let local: SitesSnapshot = serde_json::from_slice(&local).unwrap();
    assert_eq!(local, snap);
}

// ============================================================
// Full runs
// ============================================================

struct TitledCards;

#[async_trait]
impl CardSource for TitledCards {
    async fn card_metadata(&self, url: &str) -> CardMetadata {
        if url.ends_with("/untitled") {
            return CardMetadata::default();
        }
        CardMetadata {
            title: format!("Title of {url}"),
            image_url: String::new(),
        }
    }
}

struct NoPosts;

#[async_trait]
impl PostLookup for NoPosts {
    async fn get_post(&self, _at_uri: &str) -> Result<Option<PostView>> {
        Ok(None)
    }
}

fn small() -> AggregationConfig {
    AggregationConfig {
        shards: 8,
        bloom_shards: 2,
        estimated_events: 1_000,
        false_positive_rate: 0.001,
    }
}

async fn seeded_log() -> EventLog {
    let log = EventLog::new(Arc::new(MemoryObjectStore::new()));
    let start = Utc::now() - Duration::minutes(20);
    let mut records = Vec::new();
    for (url, actors) in [
        ("https://www.example.com/hot", 4),
        ("https://www.example.com/warm", 2),
        ("https://www.example.com/untitled", 3),
        ("https://other.example.org/cool", 1),
    ] {
        for n in 0..actors {
            records.push(EventRecord {
                kind: EventKind::Post,
                url: url.to_string(),
                actor_id: format!("did:plc:{n}"),
                timestamp: start,
                post_uri: format!("at://did:plc:{n}/app.bsky.feed.post/{n}"),
            });
        }
    }
    log.flush_events(start, &records).await.unwrap();
    log
}

fn hydrator(db: Arc<dyn Database>, public: Arc<MemoryObjectStore>) -> Hydrator {
    Hydrator::new(
        db,
        Arc::new(TitledCards),
        Arc::new(NoPosts),
        Arc::new(ThumbnailStore::new(public, "https://data.theblue.report/thumbnails").unwrap()),
        TextCleaner::default(),
    )
}

#[tokio::test]
async fn link_aggregation_run_publishes_ranked_snapshot() {
    let log = seeded_log().await;
    let db = db();
    let public = Arc::new(MemoryObjectStore::new());
    let publisher = Publisher::new(public.clone(), db.clone(), location());
    let settings = LinkAggregationSettings {
        workers: 2,
        aggregation: small(),
        ..LinkAggregationSettings::default()
    };

    let hydrator = hydrator(db.clone(), public.clone());
    let snap = link_aggregation::run(&log, &db, &hydrator, &publisher, &settings)
        .await
        .unwrap();

    let urls: Vec<&str> = snap.top_hour.iter().map(|l| l.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://www.example.com/hot",
            "https://www.example.com/untitled",
            "https://www.example.com/warm",
            "https://other.example.org/cool",
        ]
    );
    assert_eq!(snap.top_day, snap.links);
    assert_eq!(snap.top_hour[0].post_count, 4);
    assert_eq!(snap.top_hour[1].title, "(No Title)");

    let published = read_json(&public, LINKS_SNAPSHOT_KEY).await;
    assert_eq!(published["top_week"][0]["url"], "https://www.example.com/hot");

    let entries = db.list_feed_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content.url, "https://www.example.com/hot");
}

#[tokio::test]
async fn site_aggregation_run_publishes_titled_links_per_site() {
    let log = seeded_log().await;
    let db = db();
    let public = Arc::new(MemoryObjectStore::new());
    let publisher = Publisher::new(public.clone(), db.clone(), location());
    let settings = SiteAggregationSettings {
        workers: 2,
        aggregation: small(),
        ..SiteAggregationSettings::default()
    };

    let hydrator = hydrator(db.clone(), public.clone());
    let snap = site_aggregation::run(&log, &db, &hydrator, &publisher, &settings)
        .await
        .unwrap();

    assert_eq!(snap.sites.len(), 2);
    let top = &snap.sites[0];
    assert_eq!(top.domain, "example.com");
    assert_eq!(top.interactions, 9);
    let links: Vec<&str> = top.links.iter().map(|l| l.url.as_str()).collect();
    assert_eq!(
        links,
        vec!["https://www.example.com/hot", "https://www.example.com/warm"]
    );
    assert_eq!(top.links[1].rank, 2);

    let published = read_json(&public, SITES_SNAPSHOT_KEY).await;
    assert_eq!(published["sites"][1]["domain"], "other.example.org");
}
