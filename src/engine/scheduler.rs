//! Fair rotation of feed updates across a fixed global tick.
//!
//! Each tick walks the feeds once, starting at the rotation cursor, and stops
//! at the first feed that produced new content. The cursor then points one past
//! that feed, so the next tick starts with its neighbour. Feeds that were
//! skipped, unchanged or failing are cheap and do not end the lap.

use crate::engine::feed::{Feed, Outcome};
use crate::feed::FetchClient;
use crate::notify::Notifier;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Shortest tick period the run loop accepts.
const MIN_PERIOD: Duration = Duration::from_millis(100);

/// What one [`Scheduler::tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Feeds whose `update` ran this tick.
    pub visited: usize,
    /// Feed that produced new content and ended the lap, if any.
    pub updated: Option<String>,
    /// Feeds that failed (including panics).
    pub failed: usize,
    /// The lap was cut short by shutdown.
    pub cancelled: bool,
}

struct Rotation {
    feeds: Vec<Feed>,
    next: usize,
    flushed: bool,
}

/// Owns every feed. The mutex serializes ticks with each other and with shutdown.
pub struct Scheduler {
    inner: Mutex<Rotation>,
}

impl Scheduler {
    pub fn new(feeds: Vec<Feed>) -> Self {
        Self {
            inner: Mutex::new(Rotation {
                feeds,
                next: 0,
                flushed: false,
            }),
        }
    }

    /// Index of the feed the next tick starts with.
    pub async fn cursor(&self) -> usize {
        self.inner.lock().await.next
    }

    /// Runs `f` against the named feed under the rotation lock.
    pub async fn with_feed<R>(&self, name: &str, f: impl FnOnce(&Feed) -> R) -> Option<R> {
        let rotation = self.inner.lock().await;
        rotation.feeds.iter().find(|feed| feed.name() == name).map(f)
    }

    /// One rotation step. `elapsed` is the time since the previous tick.
    ///
    /// A panic inside a feed's update is caught, logged, and counted as a
    /// failure; the remaining feeds still run. Cancellation is honoured only
    /// between feeds so an update in flight always finishes.
    pub async fn tick(
        &self,
        elapsed: Duration,
        client: &dyn FetchClient,
        notifier: &dyn Notifier,
        shutdown: &CancellationToken,
    ) -> TickReport {
        let mut guard = self.inner.lock().await;
        let rotation = &mut *guard;
        let mut report = TickReport::default();

        let count = rotation.feeds.len();
        if count == 0 || rotation.flushed {
            return report;
        }

        let start = rotation.next % count;
        for offset in 0..count {
            if shutdown.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let index = (start + offset) % count;
            let feed = &mut rotation.feeds[index];
            let name = feed.name().to_owned();

            let outcome = match catch_panic(feed.update(elapsed, client, notifier)).await {
                Ok(outcome) => outcome,
                Err(panic_msg) => {
                    tracing::error!(feed = %name, error = %panic_msg, "Feed update panicked");
                    Outcome::Disabled
                }
            };
            report.visited += 1;

            match outcome {
                Outcome::Updated(update) => {
                    tracing::debug!(
                        feed = %name,
                        announced = update.announced,
                        suppressed = update.suppressed,
                        seeded = update.seeded,
                        "Feed updated, ending lap"
                    );
                    rotation.next = (index + 1) % count;
                    report.updated = Some(name);
                    break;
                }
                Outcome::Disabled => report.failed += 1,
                Outcome::Skipped | Outcome::Unchanged => {}
            }
        }

        report
    }

    /// Persists every feed's state. Only the first call does anything; ticks
    /// after a flush are no-ops.
    ///
    /// Returns how many feeds failed to save.
    pub async fn flush(&self) -> usize {
        let mut rotation = self.inner.lock().await;
        if rotation.flushed {
            return 0;
        }
        rotation.flushed = true;

        let mut failures = 0;
        for feed in rotation.feeds.iter_mut() {
            if let Err(e) = feed.flush() {
                failures += 1;
                tracing::warn!(feed = %feed.name(), error = %e, "Failed to save feed state on shutdown");
            }
        }
        tracing::info!(feeds = rotation.feeds.len(), failures, "Flushed feed state");
        failures
    }
}

/// Drives `scheduler` every `period` until `shutdown` fires, then flushes once.
///
/// Ticks that run long delay the following ones instead of bursting to catch up;
/// the measured gap is what each feed's clock advances by.
pub async fn run(
    scheduler: &Scheduler,
    client: &dyn FetchClient,
    notifier: &dyn Notifier,
    period: Duration,
    shutdown: CancellationToken,
) {
    let period = period.max(MIN_PERIOD);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Shutdown requested, stopping scheduler");
                break;
            }
            _ = ticker.tick() => {
                let now = Instant::now();
                let elapsed = now.duration_since(last);
                last = now;

                let report = scheduler.tick(elapsed, client, notifier, &shutdown).await;
                tracing::trace!(
                    visited = report.visited,
                    updated = ?report.updated,
                    failed = report.failed,
                    "Tick finished"
                );
            }
        }
    }

    scheduler.flush().await;
}

/// Awaits `future`, turning a panic into its message.
async fn catch_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future).catch_unwind().await.map_err(|panic| {
        if let Some(s) = panic.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;
    use crate::feed::{FetchError, FetchOutcome, FetchRequest};
    use crate::notify::NotifyError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Panicking;

    #[async_trait]
    impl FetchClient for Panicking {
        async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchOutcome, FetchError> {
            if request.url.contains("boom") {
                panic!("parser exploded");
            }
            Ok(FetchOutcome::NotModified)
        }
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl FetchClient for Counting {
        async fn fetch(&self, _request: FetchRequest<'_>) -> Result<FetchOutcome, FetchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(FetchOutcome::NotModified)
        }
    }

    struct Silent;

    #[async_trait]
    impl Notifier for Silent {
        fn destinations(&self) -> Vec<String> {
            Vec::new()
        }

        async fn send(&self, _destination: &str, _text: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn feed(dir: &std::path::Path, name: &str, url: &str) -> Feed {
        let mut config = FeedConfig::new(name, url);
        config.state_dir = dir.to_path_buf();
        Feed::new(config)
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(vec![
            feed(dir.path(), "bad", "https://boom.example/feed"),
            feed(dir.path(), "good", "https://ok.example/feed"),
        ]);

        let report = scheduler
            .tick(
                Duration::from_secs(1),
                &Panicking,
                &Silent,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.visited, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, None);
    }

    #[tokio::test]
    async fn test_cancelled_token_visits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(vec![feed(dir.path(), "a", "https://a.example/")]);
        let token = CancellationToken::new();
        token.cancel();

        let client = Counting::default();
        let report = scheduler
            .tick(Duration::from_secs(1), &client, &Silent, &token)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.visited, 0);
        assert_eq!(client.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_scheduler_ticks() {
        let scheduler = Scheduler::new(Vec::new());
        let report = scheduler
            .tick(
                Duration::from_secs(1),
                &Counting::default(),
                &Silent,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(report, TickReport::default());
    }

    #[tokio::test]
    async fn test_ticks_after_flush_do_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(vec![feed(dir.path(), "a", "https://a.example/")]);
        assert_eq!(scheduler.flush().await, 0);
        assert_eq!(scheduler.flush().await, 0);

        let client = Counting::default();
        let report = scheduler
            .tick(
                Duration::from_secs(1),
                &client,
                &Silent,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(report.visited, 0);
        assert_eq!(client.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(vec![feed(dir.path(), "a", "https://a.example/")]);
        let client = Counting::default();
        let token = CancellationToken::new();

        let stopper = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            stopper.cancel();
        });

        run(&scheduler, &client, &Silent, Duration::from_secs(1), token).await;

        // interval 0 polls on every tick: at 1s, 2s and 3s
        assert_eq!(client.0.load(Ordering::SeqCst), 3);
    }
}
