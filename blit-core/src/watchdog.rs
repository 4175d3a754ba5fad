//! Liveness watchdog for the render loop.
//!
//! The consumer refreshes the watchdog once per item. An idle consumer
//! blocked on an empty queue is healthy, so a stall is only reported
//! when items have been waiting for longer than the timeout without a
//! refresh.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::render::Liveness;

// ── Watchdog ─────────────────────────────────────────────────────

/// What to do when the render loop stalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallAction {
    /// Log at `error` and keep going.
    Warn,
    /// Log and terminate the process.
    Abort,
}

#[derive(Debug)]
struct Inner {
    epoch: Instant,
    /// Milliseconds since `epoch` at the last refresh.
    last_refresh_ms: AtomicU64,
}

/// Shared keepalive timestamp. Clones refer to the same watchdog.
#[derive(Debug, Clone)]
pub struct Watchdog {
    inner: Arc<Inner>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                epoch: Instant::now(),
                last_refresh_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Instant of the most recent refresh (creation if never refreshed).
    pub fn last_refresh(&self) -> Instant {
        let ms = self.inner.last_refresh_ms.load(Ordering::Acquire);
        self.inner.epoch + Duration::from_millis(ms)
    }

    /// Time elapsed since the last refresh.
    pub fn since_refresh(&self) -> Duration {
        self.last_refresh().elapsed()
    }

    /// Spawn a task that polls `backlog` and applies `action` when the
    /// consumer has been silent for `timeout` while items are waiting.
    pub fn monitor<F>(&self, timeout: Duration, backlog: F, action: StallAction) -> JoinHandle<()>
    where
        F: Fn() -> usize + Send + 'static,
    {
        let watchdog = self.clone();
        let period = (timeout / 4).max(Duration::from_millis(100));
        tokio::spawn(async move {
            let mut detector = StallDetector::new(timeout);
            let mut interval = tokio::time::interval(period);
            info!("watchdog armed: timeout {timeout:?}, action {action:?}");
            loop {
                interval.tick().await;
                let pending = backlog();
                if !detector.observe(Instant::now(), pending, watchdog.last_refresh()) {
                    continue;
                }
                error!(
                    "render loop stalled: {pending} item(s) waiting, no progress for {:?}",
                    watchdog.since_refresh()
                );
                if action == StallAction::Abort {
                    std::process::abort();
                }
            }
        })
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness for Watchdog {
    fn refresh(&self) {
        let ms = u64::try_from(self.inner.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.inner.last_refresh_ms.store(ms, Ordering::Release);
    }
}

// ── StallDetector ────────────────────────────────────────────────

/// Decides, sample by sample, whether the consumer is stuck.
///
/// Reports each stall episode once; a refresh or an empty queue ends
/// the episode.
#[derive(Debug)]
pub struct StallDetector {
    timeout: Duration,
    backlog_since: Option<Instant>,
    reported: bool,
}

impl StallDetector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            backlog_since: None,
            reported: false,
        }
    }

    /// Feed one sample; returns `true` when a new stall is detected.
    pub fn observe(&mut self, now: Instant, backlog: usize, last_refresh: Instant) -> bool {
        if backlog == 0 {
            self.backlog_since = None;
            self.reported = false;
            return false;
        }

        let since = *self.backlog_since.get_or_insert(now);
        let progress = since.max(last_refresh);
        if progress > since {
            // The consumer made progress while items were waiting.
            self.backlog_since = Some(progress);
            self.reported = false;
        }

        let stalled = now.saturating_duration_since(progress) >= self.timeout;
        if stalled && !self.reported {
            self.reported = true;
            return true;
        }
        false
    }
}

// ── Tests ────────────────────────────────────────────────────────
