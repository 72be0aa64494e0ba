// Database layer — SQLite document tables for URL metadata, shortener
// translations and the daily feed.
//
// We use rusqlite with the "bundled" feature so there's no system SQLite
// dependency. The database file lives wherever DATABASE_PATH points
// (defaults to ./blue-report.db).

pub mod models;
pub mod queries;
pub mod schema;
pub mod sqlite;
pub mod traits;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use rusqlite::Connection;

pub use models::{FeedEntry, FeedEntryContent, TableNames, UrlMetadata, UrlTranslation};
pub use sqlite::SqliteDatabase;
pub use traits::Database;

/// Open (or create) the database and create the tables.
pub fn initialize(db_path: &str, tables: &TableNames) -> Result<Connection> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    // WAL lets intake, normalization and aggregation share the file
    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::create_tables(&conn, tables)?;

    Ok(conn)
}

/// Open the database at `db_path` behind the async trait.
pub fn open_database(db_path: &str, tables: TableNames) -> Result<Arc<dyn Database>> {
    let conn = initialize(db_path, &tables)?;
    Ok(Arc::new(SqliteDatabase::new(conn, tables)))
}

/// Start of the calendar month before the one containing `now`.
///
/// Aggregation only trusts translations written since then.
pub fn previous_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 1 {
        (now.year() - 1, 12)
    } else {
        (now.year(), now.month() - 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_previous_month_start() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        assert_eq!(
            previous_month_start(now),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        );
        let january = Utc.with_ymd_and_hms(2025, 1, 3, 0, 0, 0).unwrap();
        assert_eq!(
            previous_month_start(january),
            Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_initialize_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.db");
        let conn = initialize(path.to_str().unwrap(), &TableNames::default()).unwrap();
        assert_eq!(schema::tests::table_count(&conn), 4);
    }
}
