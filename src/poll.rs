//! Fixed-interval re-fetching for views that show remote lists

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// How the next poll is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollMode {
    /// Every `interval` measured from the start of polling. A fetch slower
    /// than the interval overlaps the next one.
    #[default]
    FixedRate,
    /// `interval` after the previous fetch completes. Never overlaps.
    FixedDelay,
}

/// Shortest period a poller runs at; shorter intervals are raised to it
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Stops a running poller.
///
/// Dropping the handle cancels as well, so a poller lives exactly as long
/// as the view that owns the handle.
#[derive(Debug)]
#[must_use = "dropping the handle stops polling"]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl CancelHandle {
    /// Stop scheduling fetches. Idempotent.
    ///
    /// A request already in flight is not aborted, but its result is
    /// discarded instead of reaching `on_update`.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.task.abort();
            log::debug!("Polling cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Poller configuration
#[derive(Debug, Clone, Copy)]
pub struct PollingFetcher {
    interval: Duration,
    mode: PollMode,
}

impl PollingFetcher {
    /// Fixed-rate poller. An interval below [`MIN_INTERVAL`] is clamped.
    pub fn new(interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            log::warn!("Poll interval {:?} raised to {:?}", interval, MIN_INTERVAL);
        }
        Self {
            interval: interval.max(MIN_INTERVAL),
            mode: PollMode::FixedRate,
        }
    }

    pub fn with_mode(mut self, mode: PollMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn mode(&self) -> PollMode {
        self.mode
    }

    /// Start polling on the current tokio runtime.
    ///
    /// `fetch_once` runs immediately and its result is published before the
    /// schedule starts. Every result, success or failure, goes to
    /// `on_update`; failures do not stop the loop.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start<F, Fut, T, E, U>(&self, fetch_once: F, on_update: U) -> CancelHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
        U: Fn(Result<T, E>) + Send + Sync + 'static,
    {
        let cycle = Cycle {
            fetch_once: Arc::new(fetch_once),
            on_update: Arc::new(on_update),
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        let cancelled = cycle.cancelled.clone();
        let interval = self.interval;

        let task = match self.mode {
            PollMode::FixedRate => tokio::spawn(async move {
                let start = Instant::now();
                if let Err(err) = cycle.spawn().await {
                    log::error!("Poll cycle failed: {}", err);
                }

                let mut ticker = time::interval_at(start + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if cycle.is_cancelled() {
                        break;
                    }
                    // Not awaited: a slow fetch may overlap the next tick.
                    drop(cycle.spawn());
                }
            }),
            PollMode::FixedDelay => tokio::spawn(async move {
                loop {
                    if let Err(err) = cycle.spawn().await {
                        log::error!("Poll cycle failed: {}", err);
                    }
                    time::sleep(interval).await;
                    if cycle.is_cancelled() {
                        break;
                    }
                }
            }),
        };

        log::debug!(
            "Polling started every {:?} ({:?})",
            self.interval,
            self.mode
        );

        CancelHandle { cancelled, task }
    }
}

struct Cycle<F, U> {
    fetch_once: Arc<F>,
    on_update: Arc<U>,
    cancelled: Arc<AtomicBool>,
}

impl<F, Fut, T, E, U> Cycle<F, U>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
    U: Fn(Result<T, E>) + Send + Sync + 'static,
{
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run one fetch on its own task so cancelling the scheduler never
    /// aborts a request mid-flight.
    fn spawn(&self) -> JoinHandle<()> {
        let fetch = (self.fetch_once)();
        let on_update = self.on_update.clone();
        let cancelled = self.cancelled.clone();

        tokio::spawn(async move {
            let result = fetch.await;
            if cancelled.load(Ordering::SeqCst) {
                log::trace!("Dropping poll result after cancel");
                return;
            }
            if let Err(err) = &result {
                log::warn!("Poll failed: {}", err);
            }
            on_update(result);
        })
    }
}

/// Start a fixed-rate poller. See [`PollingFetcher::start`].
pub fn start_polling<F, Fut, T, E, U>(fetch_once: F, interval: Duration, on_update: U) -> CancelHandle
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
    U: Fn(Result<T, E>) + Send + Sync + 'static,
{
    PollingFetcher::new(interval).start(fetch_once, on_update)
}
