// Database queries — CRUD operations for the document tables.
//
// Every database interaction goes through this module. Timestamps are stored
// as fixed-width RFC 3339 UTC strings so text comparison orders them.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{FeedEntry, FeedEntryContent, TableNames, UrlMetadata, UrlTranslation};
use crate::hash::fnv1a_64_hex;

fn to_db_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db_time(text: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("Bad timestamp in database: {text}"))?
        .with_timezone(&Utc))
}

// --- URL metadata ---

/// Saved title for a URL hash.
pub fn get_url_metadata(
    conn: &Connection,
    tables: &TableNames,
    url_hash: &str,
) -> Result<Option<UrlMetadata>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT url_hash, url, title, updated_at FROM {} WHERE url_hash = ?1",
        tables.url_metadata
    ))?;
    let row: Option<(String, String, String, String)> = stmt
        .query_row(params![url_hash], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .optional()?;

    row.map(|(url_hash, url, title, updated_at)| {
        Ok(UrlMetadata {
            url_hash,
            url,
            title,
            updated_at: from_db_time(&updated_at)?,
        })
    })
    .transpose()
}

/// Save or replace the title for a URL.
pub fn save_url_metadata(
    conn: &Connection,
    tables: &TableNames,
    metadata: &UrlMetadata,
) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {} (url_hash, url, title, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url_hash) DO UPDATE SET
                url = ?2,
                title = ?3,
                updated_at = ?4",
            tables.url_metadata
        ),
        params![
            metadata.url_hash,
            metadata.url,
            metadata.title,
            to_db_time(metadata.updated_at)
        ],
    )?;
    Ok(())
}

// --- Translations ---

/// Upsert a translation, keyed by the hash of the source URL.
pub fn save_translation(
    conn: &Connection,
    tables: &TableNames,
    translation: &UrlTranslation,
) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {} (url_hash, source_url, destination_url, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url_hash) DO UPDATE SET
                source_url = ?2,
                destination_url = ?3,
                updated_at = ?4",
            tables.url_translations
        ),
        params![
            fnv1a_64_hex(&translation.source),
            translation.source,
            translation.destination,
            to_db_time(translation.updated_at)
        ],
    )?;
    Ok(())
}

/// Translations updated at or after `since`, as a `source -> destination` map.
pub fn get_translations_since(
    conn: &Connection,
    tables: &TableNames,
    since: DateTime<Utc>,
) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT source_url, destination_url FROM {} WHERE updated_at >= ?1",
        tables.url_translations
    ))?;
    let rows = stmt.query_map(params![to_db_time(since)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut translations = HashMap::new();
    for row in rows {
        let (source, destination) = row?;
        translations.insert(source, destination);
    }
    Ok(translations)
}

// --- Feed ---

/// Timestamp of the newest feed entry.
pub fn latest_feed_timestamp(conn: &Connection, tables: &TableNames) -> Result<Option<DateTime<Utc>>> {
    let latest: Option<String> = conn.query_row(
        &format!("SELECT MAX(timestamp) FROM {}", tables.feed),
        [],
        |row| row.get(0),
    )?;
    latest.as_deref().map(from_db_time).transpose()
}

/// Insert a feed entry unless its URL hash is already present.
pub fn add_feed_entry(conn: &Connection, tables: &TableNames, entry: &FeedEntry) -> Result<bool> {
    let content = serde_json::to_string(&entry.content)?;
    let inserted = conn.execute(
        &format!(
            "INSERT OR IGNORE INTO {} (url_hash, timestamp, content, published)
             VALUES (?1, ?2, ?3, ?4)",
            tables.feed
        ),
        params![
            entry.url_hash,
            to_db_time(entry.timestamp),
            content,
            entry.published
        ],
    )?;
    Ok(inserted > 0)
}

/// Delete feed entries older than `cutoff`.
pub fn delete_feed_entries_before(
    conn: &Connection,
    tables: &TableNames,
    cutoff: DateTime<Utc>,
) -> Result<usize> {
    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE timestamp < ?1", tables.feed),
        params![to_db_time(cutoff)],
    )?;
    Ok(removed)
}

/// All feed entries, newest first.
pub fn list_feed_entries(conn: &Connection, tables: &TableNames) -> Result<Vec<FeedEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT url_hash, timestamp, content, published FROM {} ORDER BY timestamp DESC",
        tables.feed
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, bool>(3)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (url_hash, timestamp, content, published) = row?;
        let content: FeedEntryContent = serde_json::from_str(&content)
            .with_context(|| format!("Bad feed content for {url_hash}"))?;
        entries.push(FeedEntry {
            url_hash,
            timestamp: from_db_time(&timestamp)?,
            content,
            published,
        });
    }
    Ok(entries)
}
