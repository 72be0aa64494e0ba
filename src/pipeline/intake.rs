// Intake — firehose events in, event log chunks out.
//
// One producer reads frames from the firehose and hands decoded events to a
// pool of workers over a bounded channel. Each worker:
// 1. Classifies the event (post, quote post, like/repost)
// 2. Joins likes, reposts and quotes back to a URL through the hot cache
// 3. Updates the URL's cached metadata and tallies
// 4. Queues shortened URLs for redirect resolution
// 5. Buffers the event record and flushes full buffers in the background

use std::mem;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::{HotCache, PostRecord};
use crate::hash::fnv1a_64_hex;
use crate::queue::{Message, WorkQueue};
use crate::storage::events::{EventKind, EventLog, EventRecord};
use crate::stream::event::StrongRef;
use crate::stream::{FrameSource, StreamEvent};
use crate::urls::rules::{is_apple_news, is_shortened};
use crate::urls::process_url;

use super::wait_for_shutdown;

/// Sizing and failure limits for the intake pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeSettings {
    pub worker_pool_size: usize,
    /// Capacity of the producer -> worker channel.
    pub stream_buffer: usize,
    /// Records a worker buffers before flushing a chunk.
    pub event_buffer: usize,
    /// Consecutive frame errors tolerated before giving up.
    pub error_threshold: usize,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: 1,
            stream_buffer: 10_000,
            event_buffer: 10_000,
            error_threshold: 10,
        }
    }
}

/// Per-worker counters, reset at every flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub start: DateTime<Utc>,
    pub invalid: u64,
    pub skipped: u64,
    pub errors: u64,
    pub posts: u64,
    pub likes: u64,
    pub reposts: u64,
}

impl Stats {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            invalid: 0,
            skipped: 0,
            errors: 0,
            posts: 0,
            likes: 0,
            reposts: 0,
        }
    }

    fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::Post => self.posts += 1,
            EventKind::Repost => self.reposts += 1,
            EventKind::Like => self.likes += 1,
        }
    }
}

/// What happened to one stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not a created post/repost/like, or a non-English post.
    Invalid,
    /// Valid but carries no usable link, or references an unknown post.
    Skipped,
    Recorded(EventRecord),
}

/// Turns stream events into event records, updating the hot cache and
/// work queue along the way. Shared by all workers.
#[derive(Clone)]
pub struct EventHandler {
    cache: Arc<dyn HotCache>,
    queue: Arc<dyn WorkQueue>,
}

impl EventHandler {
    pub fn new(cache: Arc<dyn HotCache>, queue: Arc<dyn WorkQueue>) -> Self {
        Self { cache, queue }
    }

    /// Process one event observed at `now`.
    ///
    /// Errors are hot cache read failures; cache writes and queue sends
    /// only log.
    pub async fn handle_event(&self, event: &StreamEvent, now: DateTime<Utc>) -> Result<Outcome> {
        if !event.is_valid() {
            return Ok(Outcome::Invalid);
        }
        let Some(kind) = event.event_kind() else {
            return Ok(Outcome::Invalid);
        };

        let handled = match kind {
            EventKind::Post if event.is_quote_post() => {
                self.handle_reference(event, &event.commit.record.embed.record, kind, now)
                    .await?
                    .map(|record| (record, String::new(), String::new()))
            }
            EventKind::Post => self.handle_post(event, now).await,
            EventKind::Like | EventKind::Repost => self
                .handle_reference(event, &event.commit.record.subject, kind, now)
                .await?
                .map(|record| (record, String::new(), String::new())),
        };

        let Some((record, title, image_url)) = handled else {
            return Ok(Outcome::Skipped);
        };

        self.update_url_record(&record, &title, &image_url).await?;
        Ok(Outcome::Recorded(record))
    }

    /// A post with a link: remember `post -> url` so later references can
    /// be credited.
    async fn handle_post(
        &self,
        event: &StreamEvent,
        now: DateTime<Utc>,
    ) -> Option<(EventRecord, String, String)> {
        let link = event.parse_post()?;
        let processed = process_url(&link.url);
        if processed.ignore {
            return None;
        }

        let post = PostRecord {
            url: processed.url.clone(),
        };
        if let Err(e) = self
            .cache
            .save_post(&fnv1a_64_hex(&event.commit.cid), &post)
            .await
        {
            warn!(cid = %event.commit.cid, error = %e, "Failed to save post record");
        }

        let record = EventRecord {
            kind: EventKind::Post,
            url: processed.url,
            actor_id: event.did.clone(),
            timestamp: now,
            post_uri: event.post_uri(),
        };
        Some((record, link.title, link.image_url))
    }

    /// A quote, like or repost: look up the referenced post's URL.
    async fn handle_reference(
        &self,
        event: &StreamEvent,
        target: &StrongRef,
        kind: EventKind,
        now: DateTime<Utc>,
    ) -> Result<Option<EventRecord>> {
        let post_hash = fnv1a_64_hex(&target.cid);
        let post = self
            .cache
            .read_post(&post_hash)
            .await
            .with_context(|| format!("Failed to read post record for {}", target.cid))?;
        if !post.is_valid() {
            return Ok(None);
        }

        // Popular posts stay cached while they keep getting referenced
        if let Err(e) = self.cache.refresh_post(&post_hash).await {
            warn!(cid = %target.cid, error = %e, "Failed to refresh post TTL");
        }

        Ok(Some(EventRecord {
            kind,
            url: post.url,
            actor_id: event.did.clone(),
            timestamp: now,
            post_uri: target.uri.clone(),
        }))
    }

    async fn update_url_record(&self, record: &EventRecord, title: &str, image_url: &str) -> Result<()> {
        let url_hash = fnv1a_64_hex(&record.url);
        let mut url_record = self
            .cache
            .read_url(&url_hash)
            .await
            .with_context(|| format!("Failed to read url record for {}", record.url))?;

        url_record.merge_fill(title, image_url);
        match record.kind {
            EventKind::Post => url_record.totals.posts += 1,
            EventKind::Repost => url_record.totals.reposts += 1,
            EventKind::Like => url_record.totals.likes += 1,
        }

        let needs_resolution = is_shortened(&record.url) || is_apple_news(&record.url);
        if needs_resolution && !url_record.normalized {
            let message = Message {
                url: record.url.clone(),
            };
            match self.queue.send(&message).await {
                Ok(()) => {
                    debug!(url = %record.url, "Queued for normalization");
                    url_record.normalized = true;
                }
                Err(e) => warn!(url = %record.url, error = %e, "Failed to queue for normalization"),
            }
        }

        if let Err(e) = self.cache.save_url(&url_hash, &url_record).await {
            warn!(url = %record.url, error = %e, "Failed to save url record");
        }
        Ok(())
    }
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<StreamEvent>>>;

/// One consumer of the stream channel with its own buffer and stats.
struct Worker {
    id: usize,
    stream: SharedReceiver,
    handler: EventHandler,
    events: EventLog,
    capacity: usize,
    buffer: Vec<EventRecord>,
    stats: Stats,
    flushes: JoinSet<()>,
}

impl Worker {
    fn new(
        id: usize,
        stream: SharedReceiver,
        handler: EventHandler,
        events: EventLog,
        capacity: usize,
    ) -> Self {
        Self {
            id,
            stream,
            handler,
            events,
            capacity,
            buffer: Vec::with_capacity(capacity),
            stats: Stats::new(Utc::now()),
            flushes: JoinSet::new(),
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let stream = self.stream.clone();
        info!(worker = self.id, "Starting intake worker");

        loop {
            let event = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!(worker = self.id, "Shutting down intake worker");
                    break;
                }
                event = async { stream.lock().await.recv().await } => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.process(&event).await;
        }

        if !self.buffer.is_empty() {
            self.flush();
        }
        while let Some(result) = self.flushes.join_next().await {
            if let Err(e) = result {
                error!(worker = self.id, error = %e, "Flush task failed");
            }
        }
    }

    async fn process(&mut self, event: &StreamEvent) {
        match self.handler.handle_event(event, Utc::now()).await {
            Ok(Outcome::Invalid) => self.stats.invalid += 1,
            Ok(Outcome::Skipped) => self.stats.skipped += 1,
            Ok(Outcome::Recorded(record)) => {
                self.stats.record(record.kind);
                self.buffer.push(record);
                if self.buffer.len() >= self.capacity {
                    self.flush();
                }
            }
            Err(e) => {
                warn!(worker = self.id, did = %event.did, error = %e, "Failed to handle event");
                self.stats.errors += 1;
            }
        }
    }

    /// Hand the buffer to a background write and start a fresh one.
    fn flush(&mut self) {
        let backlog = self
            .stream
            .try_lock()
            .map(|rx| rx.len())
            .unwrap_or_default();
        let records = mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        let stats = mem::replace(&mut self.stats, Stats::new(Utc::now()));
        let events = self.events.clone();
        let worker = self.id;

        self.flushes.spawn(async move {
            match events.flush_events(stats.start, &records).await {
                Ok(key) => info!(
                    worker = worker,
                    key = %key,
                    posts = stats.posts,
                    reposts = stats.reposts,
                    likes = stats.likes,
                    skipped = stats.skipped,
                    invalid = stats.invalid,
                    errors = stats.errors,
                    queue = backlog,
                    "Flushed events to storage"
                ),
                Err(e) => warn!(worker = worker, error = %e, records = records.len(), "Failed to write events"),
            }
        });

        // Reap finished flushes so the set doesn't grow without bound
        while let Some(result) = self.flushes.try_join_next() {
            if let Err(e) = result {
                error!(worker = self.id, error = %e, "Flush task failed");
            }
        }
    }
}

/// Read frames until the source ends or errors pile up.
///
/// Frames that fail to read or decode count toward `error_threshold`
/// consecutive failures; a good frame resets the count.
pub async fn run_producer<S: FrameSource + ?Sized>(
    source: &mut S,
    tx: mpsc::Sender<StreamEvent>,
    error_threshold: usize,
) -> Result<()> {
    let mut errors = 0usize;

    while let Some(frame) = source.next_frame().await {
        let decoded = frame.and_then(|text| {
            serde_json::from_str::<StreamEvent>(&text).context("Failed to decode firehose frame")
        });

        match decoded {
            Ok(event) => {
                errors = 0;
                if tx.send(event).await.is_err() {
                    info!("All intake workers stopped, closing producer");
                    return Ok(());
                }
            }
            Err(e) => {
                errors += 1;
                warn!(error = %e, consecutive = errors, "Failed to read from firehose");
                if errors > error_threshold {
                    anyhow::bail!("Encountered {errors} consecutive errors reading from the firehose");
                }
            }
        }
    }

    info!("Firehose stream ended");
    Ok(())
}

/// The intake service: a producer and a pool of workers.
pub struct Intake {
    handler: EventHandler,
    events: EventLog,
    settings: IntakeSettings,
}

impl Intake {
    pub fn new(
        cache: Arc<dyn HotCache>,
        queue: Arc<dyn WorkQueue>,
        events: EventLog,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            handler: EventHandler::new(cache, queue),
            events,
            settings,
        }
    }

    /// Run until the source ends, the error threshold trips, or `shutdown`
    /// fires. Buffered records are flushed before returning.
    pub async fn run<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(
            workers = self.settings.worker_pool_size,
            stream_buffer = self.settings.stream_buffer,
            event_buffer = self.settings.event_buffer,
            "Starting intake"
        );

        let (tx, rx) = mpsc::channel(self.settings.stream_buffer.max(1));
        let rx: SharedReceiver = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for id in 1..=self.settings.worker_pool_size.max(1) {
            let worker = Worker::new(
                id,
                rx.clone(),
                self.handler.clone(),
                self.events.clone(),
                self.settings.event_buffer.max(1),
            );
            workers.spawn(worker.run(shutdown.clone()));
        }

        let mut producer_shutdown = shutdown.clone();
        let result = tokio::select! {
            result = run_producer(source, tx, self.settings.error_threshold) => result,
            _ = wait_for_shutdown(&mut producer_shutdown) => Ok(()),
        };

        // The sender is gone now; workers drain what's left and exit
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Intake worker panicked");
            }
        }

        result
    }
}
