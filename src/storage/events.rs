// Event log — append-only NDJSON chunks keyed by their creation second.
//
// Each intake flush writes exactly one chunk. Chunk keys sort
// lexicographically in time order (`events/YYYY-MM-DD-HH-MM-SS.json`), which
// is what lets `list_event_chunks` filter by plain string comparison.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Days, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ObjectStore, PutOptions};

const EVENTS_PREFIX: &str = "events/";
const CHUNK_TIME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
const DAY_FORMAT: &str = "%Y-%m-%d";

/// What kind of interaction an event records. The integer codes are on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EventKind {
    Post,
    Repost,
    Like,
}

impl EventKind {
    pub fn code(self) -> u8 {
        match self {
            EventKind::Post => 0,
            EventKind::Repost => 1,
            EventKind::Like => 2,
        }
    }
}

impl From<EventKind> for u8 {
    fn from(kind: EventKind) -> Self {
        kind.code()
    }
}

impl TryFrom<u8> for EventKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(EventKind::Post),
            1 => Ok(EventKind::Repost),
            2 => Ok(EventKind::Like),
            other => Err(format!("unknown event type {other}")),
        }
    }
}

/// One persisted interaction with a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub url: String,
    #[serde(rename = "did")]
    pub actor_id: String,
    pub timestamp: DateTime<Utc>,
    /// AT URI of the post the event pertains to.
    #[serde(rename = "post")]
    pub post_uri: String,
}

/// Reader/writer for event chunks in a bucket.
#[derive(Clone)]
pub struct EventLog {
    store: Arc<dyn ObjectStore>,
}

impl EventLog {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Object key for a chunk started at `start`.
    pub fn chunk_key(start: DateTime<Utc>) -> String {
        format!("{EVENTS_PREFIX}{}.json", start.format(CHUNK_TIME_FORMAT))
    }

    /// Serialize `records` as NDJSON and write them as a single chunk.
    ///
    /// Returns the key written.
    pub async fn flush_events(
        &self,
        start: DateTime<Utc>,
        records: &[EventRecord],
    ) -> Result<String> {
        let mut body = Vec::with_capacity(records.len() * 160);
        for record in records {
            serde_json::to_writer(&mut body, record).context("Failed to encode event")?;
            body.push(b'\n');
        }

        let key = Self::chunk_key(start);
        let options = PutOptions::new("application/json").encrypted();
        self.store
            .put(&key, body, &options)
            .await
            .with_context(|| format!("Failed to write event chunk {key}"))?;

        debug!(key = %key, records = records.len(), "Wrote event chunk");
        Ok(key)
    }

    /// Keys of chunks created strictly between `start` and `end`, sorted.
    ///
    /// Issues one listing per UTC day covered by the range.
    pub async fn list_event_chunks(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let start_key = Self::chunk_key(start);
        let end_key = Self::chunk_key(end);

        let mut keys = Vec::new();
        let mut day = start.date_naive();
        let last_day = end.date_naive();
        while day <= last_day {
            let prefix = format!("{EVENTS_PREFIX}{}", day.format(DAY_FORMAT));
            let listed = self
                .store
                .list(&prefix)
                .await
                .with_context(|| format!("Failed to list event chunks under {prefix}"))?;
            keys.extend(
                listed
                    .into_iter()
                    .filter(|key| key.as_str() > start_key.as_str() && key.as_str() < end_key.as_str()),
            );

            day = match day.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
        }

        keys.sort();
        keys.dedup();
        info!(
            count = keys.len(),
            first = keys.first().map(String::as_str).unwrap_or(""),
            last = keys.last().map(String::as_str).unwrap_or(""),
            "Discovered event chunks"
        );
        Ok(keys)
    }

    /// Read and decode every record in a chunk.
    ///
    /// Lines that don't decode are skipped and counted in a warning; a chunk
    /// that can't be fetched is an error.
    pub async fn read_events(&self, key: &str, hint_capacity: usize) -> Result<Vec<EventRecord>> {
        let body = self
            .store
            .get(key)
            .await
            .with_context(|| format!("Failed to read event chunk {key}"))?
            .with_context(|| format!("Event chunk {key} does not exist"))?;

        let mut records = Vec::with_capacity(hint_capacity);
        let mut skipped = 0usize;
        for line in body.split(|&b| b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<EventRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    debug!(key = %key, error = %e, "Skipping undecodable event line");
                }
            }
        }
        if skipped > 0 {
            warn!(key = %key, skipped = skipped, decoded = records.len(), "Skipped bad event lines");
        }
        Ok(records)
    }
}
