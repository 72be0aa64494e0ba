// Chunk scan — feed event-log chunks through an aggregation in parallel.
//
// Chunks are split into contiguous segments, one per worker. A worker
// starts reading its next chunk before counting the current one, so object
// store reads overlap with counting.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

use super::{Aggregation, CountedEvent, Tally};
use crate::storage::events::{EventLog, EventRecord};
use crate::urls::rules::process_url;

/// Records per chunk, used to presize read buffers.
const CHUNK_CAPACITY_HINT: usize = 10_000;

/// What an aggregation is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBy {
    Url,
    Host,
}

/// Split `chunks` into `workers` contiguous segments. The last segment
/// takes the remainder.
pub fn segments(chunks: &[String], workers: usize) -> Vec<Vec<String>> {
    let workers = workers.max(1);
    let size = chunks.len() / workers;
    (0..workers)
        .map(|i| {
            let start = i * size;
            let end = if i == workers - 1 {
                chunks.len()
            } else {
                start + size
            };
            chunks[start..end].to_vec()
        })
        .collect()
}

/// Count one stored record, applying URL rules and translations first.
pub fn count_record<T: Tally>(
    aggregation: &Aggregation<T>,
    record: &EventRecord,
    translations: &HashMap<String, String>,
    key_by: KeyBy,
) {
    let mut processed = process_url(&record.url);
    if processed.ignore {
        return;
    }
    if let Some(destination) = translations.get(&processed.url) {
        processed = process_url(destination);
        if processed.ignore {
            return;
        }
    }

    let key = match key_by {
        KeyBy::Url => processed.url.as_str(),
        KeyBy::Host => processed.host.as_str(),
    };
    if key.is_empty() {
        return;
    }

    aggregation.count_event(&CountedEvent {
        kind: record.kind,
        key,
        url: &processed.url,
        post_uri: &record.post_uri,
        actor_id: &record.actor_id,
        timestamp: record.timestamp,
    });
}

/// Read every chunk in `chunks` into `aggregation` using `workers` tasks.
///
/// Any read or decode failure aborts the scan.
pub async fn scan_chunks<T>(
    aggregation: Arc<Aggregation<T>>,
    log: EventLog,
    chunks: Vec<String>,
    translations: Arc<HashMap<String, String>>,
    key_by: KeyBy,
    workers: usize,
) -> Result<()>
where
    T: Tally + 'static,
{
    info!(chunks = chunks.len(), workers = workers, "Scanning event chunks");

    let pb = ProgressBar::new(chunks.len() as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("  Chunks [{bar:30}] {pos}/{len} ({eta})")
    {
        pb.set_style(style);
    }

    let mut tasks = JoinSet::new();
    for (id, segment) in segments(&chunks, workers).into_iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        let aggregation = aggregation.clone();
        let log = log.clone();
        let translations = translations.clone();
        let pb = pb.clone();
        tasks.spawn(async move {
            scan_segment(id, &aggregation, log, segment, &translations, key_by, &pb).await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        joined.context("Aggregation worker panicked")??;
    }
    pb.finish_and_clear();

    info!(
        total = aggregation.total(),
        skipped = aggregation.skipped(),
        keys = aggregation.len(),
        "Finished aggregation"
    );
    Ok(())
}

async fn scan_segment<T: Tally>(
    id: usize,
    aggregation: &Aggregation<T>,
    log: EventLog,
    segment: Vec<String>,
    translations: &HashMap<String, String>,
    key_by: KeyBy,
    pb: &ProgressBar,
) -> Result<()> {
    let read = |key: String| -> JoinHandle<Result<Vec<EventRecord>>> {
        let log = log.clone();
        tokio::spawn(async move { log.read_events(&key, CHUNK_CAPACITY_HINT).await })
    };

    let mut keys = segment.into_iter();
    let mut next = keys.next().map(&read);
    while let Some(pending) = next.take() {
        let records = pending.await.context("Chunk read task panicked")??;
        next = keys.next().map(&read);

        for record in &records {
            count_record(aggregation, record, translations, key_by);
        }
        debug!(worker = id, records = records.len(), "Counted chunk");
        pb.inc(1);
    }
    Ok(())
}
