use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use blue_report::bluesky::PublicAtpClient;
use blue_report::cache::ValkeyCache;
use blue_report::card::{CardFetcher, CardSource};
use blue_report::config::Config;
use blue_report::db::{open_database, Database};
use blue_report::format::TextCleaner;
use blue_report::hash::fnv1a_64_hex;
use blue_report::output::terminal;
use blue_report::pipeline::feed::FeedLocation;
use blue_report::pipeline::hydration::Hydrator;
use blue_report::pipeline::intake::Intake;
use blue_report::pipeline::link_aggregation::{self, LinkAggregationSettings};
use blue_report::pipeline::normalization::{self, Normalizer};
use blue_report::pipeline::publish::Publisher;
use blue_report::pipeline::site_aggregation::{self, SiteAggregationSettings};
use blue_report::pipeline::spawn_signal_handler;
use blue_report::queue::valkey::ValkeyQueue;
use blue_report::rendering::BrowserRenderingClient;
use blue_report::storage::{EventLog, FsObjectStore, ObjectStore, ThumbnailStore};
use blue_report::stream::JetstreamSource;
use blue_report::urls::redirect::RedirectResolver;

/// The Blue Report: the most shared links on Bluesky.
///
/// Each subcommand is one service. `intake` and `link_normalization` run
/// until stopped; the aggregations run once and publish a snapshot.
#[derive(Parser)]
#[command(name = "blue-report", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream the firehose into the hot cache and the event log
    #[command(name = "intake")]
    Intake,

    /// Rank links over the past hour, day and week and publish the snapshot
    #[command(name = "link_aggregation")]
    LinkAggregation,

    /// Rank sites over the past 30 days and publish the snapshot
    #[command(name = "site_aggregation")]
    SiteAggregation,

    /// Resolve shortened and Apple News links from the work queue
    #[command(name = "link_normalization")]
    LinkNormalization,

    /// Print the hash used for cache keys and object names
    #[command(name = "hash")]
    Hash {
        /// The string to hash (usually a URL)
        input: String,
    },

    /// Look up card metadata for one URL
    #[command(name = "card")]
    Card {
        /// The URL to look up
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    let default_filter = if std::env::var("DEBUG").is_ok_and(|v| v == "true") {
        "blue_report=debug"
    } else {
        "blue_report=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Intake => {
            let config = Config::load()?;

            let cache = Arc::new(ValkeyCache::connect(&config.valkey_address, config.valkey_tls).await?);
            let queue = Arc::new(
                ValkeyQueue::connect(&config.valkey_address, config.valkey_tls, &config.queue_name)
                    .await?,
            );
            let events = EventLog::new(bucket(&config, &config.write_events_bucket));

            let intake = Intake::new(cache, queue, events, config.intake);
            let mut source = JetstreamSource::connect(&config.jetstream_url).await?;

            let shutdown = spawn_signal_handler();
            intake.run(&mut source, shutdown.clone()).await?;

            if !*shutdown.borrow() {
                // Let the supervisor restart us with a fresh connection
                anyhow::bail!("Firehose stream ended unexpectedly");
            }
            info!("Intake stopped");
        }

        Commands::LinkAggregation => {
            let config = Config::load()?;
            let db = open_database(&config.db_path, config.tables.clone())?;
            let events = EventLog::new(bucket(&config, &config.read_events_bucket));
            let public = bucket(&config, &config.public_bucket);

            let hydrator = build_hydrator(&config, db.clone(), public.clone())?;
            let publisher = build_publisher(&config, db.clone(), public);

            println!("Aggregating links...");
            let snapshot = link_aggregation::run(
                &events,
                &db,
                &hydrator,
                &publisher,
                &LinkAggregationSettings::default(),
            )
            .await?;

            terminal::display_snapshot(&snapshot);
            println!("\n{}", "Links snapshot published.".bold());
        }

        Commands::SiteAggregation => {
            let config = Config::load()?;
            let db = open_database(&config.db_path, config.tables.clone())?;
            let events = EventLog::new(bucket(&config, &config.read_events_bucket));
            let public = bucket(&config, &config.public_bucket);

            let hydrator = build_hydrator(&config, db.clone(), public.clone())?;
            let publisher = build_publisher(&config, db.clone(), public);

            println!("Aggregating sites...");
            let snapshot = site_aggregation::run(
                &events,
                &db,
                &hydrator,
                &publisher,
                &SiteAggregationSettings::default(),
            )
            .await?;

            terminal::display_sites(&snapshot);
            println!("\n{}", "Sites snapshot published.".bold());
        }

        Commands::LinkNormalization => {
            let config = Config::load()?;
            let db = open_database(&config.db_path, config.tables.clone())?;
            let queue = Arc::new(
                ValkeyQueue::connect(&config.valkey_address, config.valkey_tls, &config.queue_name)
                    .await?,
            );

            let normalizer = Arc::new(Normalizer::new(
                RedirectResolver::new()?,
                rendering_client(&config)?,
                db,
                config.normalization.visited_capacity,
            ));

            let shutdown = spawn_signal_handler();
            normalization::run(normalizer, queue, config.normalization, shutdown).await?;
        }

        Commands::Hash { input } => {
            println!("{}", fnv1a_64_hex(&input));
        }

        Commands::Card { url } => {
            let config = Config::load()?;
            let cards = CardFetcher::new(&config.cardyb_endpoint, rendering_client(&config)?)?;
            let card = cards.card_metadata(&url).await;
            let cleaner = TextCleaner::new(config.sensational_prefixes.clone());
            terminal::display_card(&url, &card, &cleaner.format_title(&card.title));
        }
    }

    Ok(())
}

/// Object store for a bucket under the storage root.
fn bucket(config: &Config, name: &str) -> Arc<dyn ObjectStore> {
    Arc::new(FsObjectStore::new(config.bucket_path(name)))
}

/// Browser rendering client, or `None` when credentials are missing.
fn rendering_client(config: &Config) -> Result<Option<Arc<BrowserRenderingClient>>> {
    if let Err(e) = config.require_browser_rendering() {
        warn!(error = %e, "Browser rendering disabled");
        return Ok(None);
    }
    let client = BrowserRenderingClient::new(
        &config.browser_rendering_endpoint,
        &config.cloudflare_account_id,
        &config.cloudflare_api_token,
    )?;
    Ok(Some(Arc::new(client)))
}

fn build_hydrator(
    config: &Config,
    db: Arc<dyn Database>,
    public: Arc<dyn ObjectStore>,
) -> Result<Hydrator> {
    let cards = CardFetcher::new(&config.cardyb_endpoint, rendering_client(config)?)?;
    let posts = PublicAtpClient::new(&config.public_api_url)?;
    let thumbnails = ThumbnailStore::new(public, &config.thumbnail_base_url)?;
    Ok(Hydrator::new(
        db,
        Arc::new(cards),
        Arc::new(posts),
        Arc::new(thumbnails),
        TextCleaner::new(config.sensational_prefixes.clone()),
    ))
}

fn build_publisher(config: &Config, db: Arc<dyn Database>, public: Arc<dyn ObjectStore>) -> Publisher {
    let location = FeedLocation::new(&config.site_url, &config.data_url);
    let publisher = Publisher::new(public, db, location);
    if config.debug {
        publisher.with_local_copy("dist")
    } else {
        publisher
    }
}
