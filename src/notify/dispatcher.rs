//! Notification Dispatcher
//!
//! Fire-and-forget delivery of [`ChangeEvent`]s. Each event is delivered on
//! its own task with a bounded number of attempts and exponential backoff
//! between them. Callers never wait on delivery and never see its errors;
//! final failures are logged and dropped.

use super::events::{ChangeEvent, ChangeSubject};
use super::sinks::LogNotifier;
use crate::domain::ports::ChangeNotifierRef;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Delivery settings for change notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Total delivery attempts per event, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay
    pub max_backoff_ms: u64,
    /// Webhook to post events to; events are only logged when unset
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            webhook_url: None,
            webhook_timeout_secs: 10,
        }
    }
}

impl NotifierConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct DispatchStats {
    dispatched: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    retries: AtomicU64,
}

/// Snapshot of dispatcher counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    pub dispatched: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub retries: u64,
}

// =============================================================================
// Dispatcher
// =============================================================================

struct DispatcherInner {
    sink: ChangeNotifierRef,
    config: NotifierConfig,
    tracker: TaskTracker,
    stats: DispatchStats,
}

/// Cheaply cloneable handle that hands events to a [`ChangeNotifier`]
/// sink in the background.
///
/// [`ChangeNotifier`]: crate::domain::ports::ChangeNotifier
#[derive(Clone)]
pub struct NotificationDispatcher {
    inner: Arc<DispatcherInner>,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("sink", &self.inner.sink.sink_name())
            .field("in_flight", &self.inner.tracker.len())
            .finish()
    }
}

impl NotificationDispatcher {
    pub fn new(sink: ChangeNotifierRef, config: NotifierConfig) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                sink,
                config,
                tracker: TaskTracker::new(),
                stats: DispatchStats::default(),
            }),
        }
    }

    /// Dispatcher that only logs events
    pub fn logging() -> Self {
        Self::new(Arc::new(LogNotifier), NotifierConfig::default())
    }

    /// Report changes to a record. Never blocks and never fails.
    pub fn notify(&self, subject: ChangeSubject, changes: Vec<String>, created: bool) {
        self.dispatch(ChangeEvent::new(subject, changes, created));
    }

    /// Hand a prepared event to the sink in the background.
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, event: ChangeEvent) {
        self.inner.stats.dispatched.fetch_add(1, Ordering::Relaxed);

        let inner = self.inner.clone();
        self.inner.tracker.spawn(async move {
            deliver(&inner, event).await;
        });
    }

    /// Wait until every event dispatched so far has been delivered or dropped
    pub async fn flush(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        let stats = &self.inner.stats;
        DispatchStatsSnapshot {
            dispatched: stats.dispatched.load(Ordering::Relaxed),
            delivered: stats.delivered.load(Ordering::Relaxed),
            dropped: stats.dropped.load(Ordering::Relaxed),
            retries: stats.retries.load(Ordering::Relaxed),
        }
    }
}

async fn deliver(inner: &DispatcherInner, event: ChangeEvent) {
    let config = &inner.config;
    let max_attempts = config.max_attempts.max(1);
    let mut schedule = ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_backoff())
        .with_max_interval(config.max_backoff())
        .with_max_elapsed_time(None)
        .build();

    let mut attempt = 0;
    loop {
        attempt += 1;
        match inner.sink.notify(&event).await {
            Ok(()) => {
                debug!(
                    subject = %event.subject,
                    attempt,
                    "Delivered change notification via {}",
                    inner.sink.sink_name()
                );
                inner.stats.delivered.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(e) if attempt >= max_attempts => {
                error!(
                    subject = %event.subject,
                    attempts = attempt,
                    "Dropping change notification: {}",
                    e
                );
                inner.stats.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(e) => {
                let delay = schedule.next_backoff().unwrap_or_else(|| config.max_backoff());
                warn!(
                    subject = %event.subject,
                    attempt,
                    "Change notification failed, retrying in {:?}: {}",
                    delay,
                    e
                );
                inner.stats.retries.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
