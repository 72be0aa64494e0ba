use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::bluesky::client::DEFAULT_PUBLIC_API_URL;
use crate::card::DEFAULT_CARDYB_ENDPOINT;
use crate::db::TableNames;
use crate::format::DEFAULT_SENSATIONAL_PREFIXES;
use crate::pipeline::intake::IntakeSettings;
use crate::pipeline::normalization::NormalizationSettings;
use crate::queue::DEFAULT_QUEUE_NAME;
use crate::rendering::DEFAULT_BROWSER_RENDERING_ENDPOINT;
use crate::storage::thumbnails::DEFAULT_THUMBNAIL_BASE_URL;
use crate::stream::source::DEFAULT_JETSTREAM_URL;

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Verbose logging, and local copies of published snapshots under `dist/`.
    pub debug: bool,
    /// Public AT Protocol API endpoint (defaults to https://public.api.bsky.app).
    pub public_api_url: String,
    pub jetstream_url: String,
    /// Buckets are directories under this root.
    pub storage_root: PathBuf,
    pub public_bucket: String,
    pub read_events_bucket: String,
    pub write_events_bucket: String,
    pub db_path: String,
    pub tables: TableNames,
    pub valkey_address: String,
    pub valkey_tls: bool,
    pub queue_name: String,
    pub cloudflare_api_token: String,
    pub cloudflare_account_id: String,
    pub cardyb_endpoint: String,
    pub browser_rendering_endpoint: String,
    pub thumbnail_base_url: String,
    pub site_url: String,
    /// Public URL of the public bucket; feeds link to themselves under it.
    pub data_url: String,
    pub sensational_prefixes: Vec<String>,
    pub intake: IntakeSettings,
    pub normalization: NormalizationSettings,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from any variable lookup. Unset and empty
    /// variables fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let string = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());
        let flag = |name: &str| {
            get(name)
                .map(|value| matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(false)
        };
        let number = |name: &str, default: usize| -> Result<usize> {
            match get(name) {
                Some(value) => value
                    .parse::<usize>()
                    .with_context(|| format!("{name} must be a positive integer, got {value:?}")),
                None => Ok(default),
            }
        };

        let tables = TableNames {
            url_metadata: string("URL_METADATA_TABLE", "url_metadata"),
            url_translations: string("URL_TRANSLATIONS_TABLE", "url_translations"),
            feed: string("FEED_TABLE", "feed"),
        };
        tables.validate()?;

        let sensational_prefixes = match get("SENSATIONAL_PREFIXES") {
            Some(list) => list.split('|').map(str::to_string).collect(),
            None => DEFAULT_SENSATIONAL_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        };

        let intake_defaults = IntakeSettings::default();
        let intake = IntakeSettings {
            worker_pool_size: number("WORKER_POOL_SIZE", intake_defaults.worker_pool_size)?,
            stream_buffer: number("STREAM_BUFFER_SIZE", intake_defaults.stream_buffer)?,
            event_buffer: number("EVENT_BUFFER_SIZE", intake_defaults.event_buffer)?,
            error_threshold: intake_defaults.error_threshold,
        };

        let normalization_defaults = NormalizationSettings::default();
        let normalization = NormalizationSettings {
            worker_pool_size: number(
                "NORMALIZE_WORKER_POOL_SIZE",
                normalization_defaults.worker_pool_size,
            )?,
            ..normalization_defaults
        };

        Ok(Self {
            debug: flag("DEBUG"),
            public_api_url: string("BLUESKY_API_ENDPOINT", DEFAULT_PUBLIC_API_URL),
            jetstream_url: string("JETSTREAM_URL", DEFAULT_JETSTREAM_URL),
            storage_root: PathBuf::from(string("STORAGE_ROOT", "./data")),
            public_bucket: string("PUBLIC_BUCKET", "blue-report-public"),
            read_events_bucket: string("READ_EVENTS_BUCKET", "blue-report-events"),
            write_events_bucket: string("WRITE_EVENTS_BUCKET", "blue-report-events"),
            db_path: string("DATABASE_PATH", "./blue-report.db"),
            tables,
            valkey_address: string("VALKEY_ADDRESS", "127.0.0.1:6379"),
            valkey_tls: flag("VALKEY_TLS_ENABLED"),
            queue_name: string("NORMALIZATION_QUEUE_NAME", DEFAULT_QUEUE_NAME),
            cloudflare_api_token: string("CLOUDFLARE_API_TOKEN", ""),
            cloudflare_account_id: string("CLOUDFLARE_ACCOUNT_ID", ""),
            cardyb_endpoint: string("CARDYB_ENDPOINT", DEFAULT_CARDYB_ENDPOINT),
            browser_rendering_endpoint: string(
                "BROWSER_RENDERING_ENDPOINT",
                DEFAULT_BROWSER_RENDERING_ENDPOINT,
            ),
            thumbnail_base_url: string("THUMBNAIL_BASE_URL", DEFAULT_THUMBNAIL_BASE_URL),
            site_url: string("SITE_URL", "https://theblue.report"),
            data_url: string("DATA_URL", "https://data.theblue.report"),
            sensational_prefixes,
            intake,
            normalization,
        })
    }

    /// Directory backing a bucket.
    pub fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.storage_root.join(bucket)
    }

    /// Check that browser rendering credentials are configured.
    /// Without them, card lookups use the card extractor only and Apple
    /// News links are not resolved.
    pub fn require_browser_rendering(&self) -> Result<()> {
        if self.cloudflare_api_token.is_empty() || self.cloudflare_account_id.is_empty() {
            anyhow::bail!(
                "CLOUDFLARE_API_TOKEN and CLOUDFLARE_ACCOUNT_ID must both be set \
                 to use browser rendering."
            );
        }
        Ok(())
    }
}
