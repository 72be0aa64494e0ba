// Outbound pacing — request spacing for the card extractor and 429 retries
// for the browser rendering API.
//
// CardyB asks for at least one second between requests; hydration tasks
// share one `RequestSpacing` through the card fetcher. The rendering API
// answers 429 when pushed, which `with_retry` waits out a fixed number of
// times.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// At most one request every `min_delay`, across all callers.
pub struct RequestSpacing {
    min_delay: Duration,
    /// Start time reserved by the most recent caller.
    last_slot: Mutex<Option<Instant>>,
}

impl RequestSpacing {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_slot: Mutex::new(None),
        }
    }

    /// Wait for the next free slot.
    ///
    /// Concurrent callers reserve consecutive slots, so N callers sharing a
    /// 1s spacing finish acquiring after roughly N-1 seconds.
    pub async fn acquire(&self) {
        // Reserve under the lock, sleep after dropping it
        let wait = {
            let mut last = self.last_slot.lock();
            let now = Instant::now();
            let slot = match *last {
                Some(previous) if previous + self.min_delay > now => previous + self.min_delay,
                _ => now,
            };
            *last = Some(slot);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Returned by clients when a service answers HTTP 429.
#[derive(Debug, Clone)]
pub struct RateLimited {
    pub service: String,
}

impl fmt::Display for RateLimited {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} returned 429 Too Many Requests", self.service)
    }
}

impl std::error::Error for RateLimited {}

/// How many times `with_retry` retries a 429, and how long it waits first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn fixed(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }
}

/// Whether an error chain carries a [`RateLimited`].
pub fn is_rate_limit_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<RateLimited>())
}

/// Retry an async operation on rate-limit errors. Other errors are returned
/// immediately.
pub async fn with_retry<F, Fut, T>(policy: RetryPolicy, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_rate_limit_error(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }

                attempt += 1;
                warn!(
                    attempt = attempt,
                    max_retries = policy.max_retries,
                    backoff_ms = policy.backoff.as_millis() as u64,
                    "Rate limited (429), retrying"
                );
                tokio::time::sleep(policy.backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn limited() -> anyhow::Error {
        anyhow::Error::new(RateLimited {
            service: "test".to_string(),
        })
    }

    const POLICY: RetryPolicy = RetryPolicy::fixed(3, Duration::from_secs(1));

    // ── RequestSpacing ──────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_spacing_delays_consecutive_requests() {
        let spacing = RequestSpacing::new(Duration::from_secs(1));
        let start = Instant::now();
        spacing.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(1));
        for _ in 0..3 {
            spacing.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_reserve_distinct_slots() {
        let spacing = Arc::new(RequestSpacing::new(Duration::from_secs(1)));
        let start = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let spacing = spacing.clone();
                tokio::spawn(async move {
                    spacing.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap().duration_since(start).as_secs());
        }
        finished.sort();
        assert_eq!(finished, vec![0, 1, 2]);
    }

    // ── with_retry ──────────────────────────────────────────────────

    #[test]
    fn test_rate_limit_detected_through_context() {
        let err = limited().context("Failed to scrape");
        assert!(is_rate_limit_error(&err));
        assert!(!is_rate_limit_error(&anyhow::anyhow!("status 500")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_429_then_succeeds() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = with_retry(POLICY, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(limited())
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed().as_secs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(POLICY, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(limited())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_retry(POLICY, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("status 500")
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
