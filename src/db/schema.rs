// Database schema — document tables for metadata, translations and the feed.
//
// Table names come from configuration, so the DDL is formatted at runtime.
// Names are validated by `TableNames::validate` before they get here.

use anyhow::{Context, Result};
use rusqlite::Connection;

use super::models::TableNames;

/// Create all tables if they don't exist yet.
///
/// Idempotent, safe to call on every startup.
pub fn create_tables(conn: &Connection, tables: &TableNames) -> Result<()> {
    tables.validate()?;
    let TableNames {
        url_metadata,
        url_translations,
        feed,
    } = tables;

    conn.execute_batch(&format!(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Titles fetched during hydration, keyed by fnv1a hash of the URL
        CREATE TABLE IF NOT EXISTS {url_metadata} (
            url_hash TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL
        );

        -- Shortener resolutions, keyed by fnv1a hash of the source URL
        CREATE TABLE IF NOT EXISTS {url_translations} (
            url_hash TEXT PRIMARY KEY,
            source_url TEXT NOT NULL,
            destination_url TEXT NOT NULL,
            updated_at TEXT NOT NULL       -- RFC 3339 UTC, sorts as text
        );

        -- Top link of the day entries, one per URL
        CREATE TABLE IF NOT EXISTS {feed} (
            url_hash TEXT PRIMARY KEY,
            timestamp TEXT NOT NULL,
            content TEXT NOT NULL,         -- JSON {{title, url, recommended_posts}}
            published INTEGER NOT NULL DEFAULT 0
        );

        -- Aggregation reads translations by month
        CREATE INDEX IF NOT EXISTS idx_{url_translations}_updated
            ON {url_translations}(updated_at);

        -- Feed recency checks and garbage collection
        CREATE INDEX IF NOT EXISTS idx_{feed}_timestamp
            ON {feed}(timestamp);
        "
    ))
    .context("Failed to create database tables")?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    Ok(())
}
