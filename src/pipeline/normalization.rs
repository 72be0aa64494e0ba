// Link normalization — resolve shortened links into translations.
//
// A controller long-polls the work queue and fans messages out to a small
// pool of workers over a bounded channel. Each worker resolves the link
// (redirects, or a rendered page for Apple News), cleans the destination
// and upserts a translation that the next aggregation run will apply.
//
// Shutdown: the controller finishes the receive in flight, stops polling
// and drops the channel sender; workers finish what's buffered, then the
// service returns.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::card::apple_news_destination;
use crate::db::{Database, UrlTranslation};
use crate::queue::{Message, WorkQueue};
use crate::rendering::BrowserRenderingClient;
use crate::urls::redirect::RedirectResolver;
use crate::urls::rules::{clean, is_apple_news};

use super::wait_for_shutdown;

/// Pause after a failed queue receive before polling again.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationSettings {
    pub worker_pool_size: usize,
    /// Capacity of the controller -> worker channel.
    pub channel_capacity: usize,
    /// URLs remembered to avoid resolving the same link twice.
    pub visited_capacity: usize,
}

impl Default for NormalizationSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: 2,
            channel_capacity: 10,
            visited_capacity: 1000,
        }
    }
}

/// Bounded set of recently seen URLs. The oldest entry is evicted first.
pub struct VisitedSet {
    inner: Mutex<(HashSet<String>, VecDeque<String>)>,
    capacity: usize,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new((HashSet::new(), VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.inner.lock().0.contains(url)
    }

    /// Record `url`; false if it was already present.
    pub fn insert(&self, url: &str) -> bool {
        let mut guard = self.inner.lock();
        let (set, order) = &mut *guard;
        if set.contains(url) {
            return false;
        }
        if order.len() >= self.capacity {
            if let Some(oldest) = order.pop_front() {
                set.remove(&oldest);
            }
        }
        set.insert(url.to_string());
        order.push_back(url.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of normalizing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// A translation was written.
    Translated(UrlTranslation),
    /// The link didn't lead anywhere new.
    NoDestination,
    /// Resolved, but the translation couldn't be written.
    SaveFailed,
    /// Translated recently; not resolved again.
    AlreadyVisited,
}

pub struct Normalizer {
    resolver: RedirectResolver,
    rendering: Option<Arc<BrowserRenderingClient>>,
    db: Arc<dyn Database>,
    visited: VisitedSet,
}

impl Normalizer {
    pub fn new(
        resolver: RedirectResolver,
        rendering: Option<Arc<BrowserRenderingClient>>,
        db: Arc<dyn Database>,
        visited_capacity: usize,
    ) -> Self {
        Self {
            resolver,
            rendering,
            db,
            visited: VisitedSet::new(visited_capacity),
        }
    }

    /// Where `url` leads, or empty when it doesn't redirect.
    pub async fn destination(&self, url: &str) -> String {
        if !is_apple_news(url) {
            return self.resolver.find_redirect(url).await;
        }

        let Some(rendering) = &self.rendering else {
            debug!(url = url, "Skipping Apple News link, browser rendering not configured");
            return String::new();
        };
        match apple_news_destination(rendering, url).await {
            Ok(Some(destination)) => destination,
            Ok(None) => String::new(),
            Err(e) => {
                warn!(url = url, error = %e, "Failed to resolve Apple News link");
                String::new()
            }
        }
    }

    /// Resolve one link and persist its translation.
    ///
    /// A link is only remembered once its translation is saved, so a link
    /// that failed to resolve or save is tried again when it comes back.
    pub async fn normalize(&self, message: &Message) -> Normalized {
        if self.visited.contains(&message.url) {
            return Normalized::AlreadyVisited;
        }

        let destination = self.destination(&message.url).await;
        if destination.is_empty() {
            debug!(url = %message.url, "No redirect found");
            return Normalized::NoDestination;
        }

        let translation = UrlTranslation {
            source: message.url.clone(),
            destination: clean(&destination),
            updated_at: Utc::now(),
        };
        if let Err(e) = self.db.save_translation(&translation).await {
            error!(url = %message.url, error = %e, "Failed to save translation");
            return Normalized::SaveFailed;
        }
        self.visited.insert(&message.url);

        info!(
            source = %translation.source,
            destination = %translation.destination,
            "Saved translation"
        );
        Normalized::Translated(translation)
    }
}

/// Run the normalization service until `shutdown` fires.
pub async fn run(
    normalizer: Arc<Normalizer>,
    queue: Arc<dyn WorkQueue>,
    settings: NormalizationSettings,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!(workers = settings.worker_pool_size, "Starting link normalization");

    let (tx, rx) = mpsc::channel::<Message>(settings.channel_capacity.max(1));
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut workers = JoinSet::new();
    for id in 1..=settings.worker_pool_size.max(1) {
        let rx = rx.clone();
        let normalizer = normalizer.clone();
        workers.spawn(async move {
            loop {
                let message = rx.lock().await.recv().await;
                let Some(message) = message else {
                    break;
                };
                normalizer.normalize(&message).await;
            }
            debug!(worker = id, "Normalization worker drained");
        });
    }

    // A receive in flight may already hold popped messages, so shutdown is
    // only checked between batches.
    while !*shutdown.borrow_and_update() {
        match queue.receive().await {
            Ok(messages) => {
                for message in messages {
                    if tx.send(message).await.is_err() {
                        anyhow::bail!("Normalization workers exited unexpectedly");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to receive from queue");
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => {}
                    _ = tokio::time::sleep(RECEIVE_RETRY_DELAY) => {}
                }
            }
        }
    }

    info!("Draining normalization workers");
    drop(tx);
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Normalization worker panicked");
        }
    }
    info!("Link normalization stopped");
    Ok(())
}
