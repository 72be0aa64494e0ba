// SqliteDatabase — rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{FeedEntry, TableNames, UrlMetadata, UrlTranslation};
use super::traits::Database;
use super::{queries, schema};

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
    tables: TableNames,
}

impl SqliteDatabase {
    /// Wrap an already-initialized rusqlite Connection.
    pub fn new(conn: Connection, tables: TableNames) -> Self {
        Self {
            conn: Mutex::new(conn),
            tables,
        }
    }

    /// A fresh in-memory database with all tables created.
    pub fn open_in_memory(tables: TableNames) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create_tables(&conn, &tables)?;
        Ok(Self::new(conn, tables))
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn get_url_metadata(&self, url_hash: &str) -> Result<Option<UrlMetadata>> {
        let conn = self.conn.lock().await;
        queries::get_url_metadata(&conn, &self.tables, url_hash)
    }

    async fn save_url_metadata(&self, metadata: &UrlMetadata) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::save_url_metadata(&conn, &self.tables, metadata)
    }

    async fn save_translation(&self, translation: &UrlTranslation) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::save_translation(&conn, &self.tables, translation)
    }

    async fn get_translations_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, String>> {
        let conn = self.conn.lock().await;
        queries::get_translations_since(&conn, &self.tables, since)
    }

    async fn latest_feed_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        queries::latest_feed_timestamp(&conn, &self.tables)
    }

    async fn add_feed_entry(&self, entry: &FeedEntry) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::add_feed_entry(&conn, &self.tables, entry)
    }

    async fn delete_feed_entries_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().await;
        queries::delete_feed_entries_before(&conn, &self.tables, cutoff)
    }

    async fn list_feed_entries(&self) -> Result<Vec<FeedEntry>> {
        let conn = self.conn.lock().await;
        queries::list_feed_entries(&conn, &self.tables)
    }
}
