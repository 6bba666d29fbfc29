//! Fixed-interval notification polling.
//!
//! Badge freshness does not depend on the socket: the poller hits
//! `GET /api/notifications` on its own timer whether or not the relay
//! connection is up.

use std::sync::Arc;
use std::time::Duration;

use circle_core::logging::targets;
use circle_core::{NotificationFeed, Signal};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::NetworkError;
use crate::http::CircleApi;

const TARGET: &str = targets::NOTIFICATIONS;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

struct PollerSignals {
    updated: Signal<NotificationFeed>,
    unread_count_changed: Signal<u64>,
    failed: Signal<NetworkError>,
    last_unread: Mutex<Option<u64>>,
}

impl PollerSignals {
    fn publish(&self, feed: NotificationFeed) {
        let unread = feed.unread_count;
        let changed = {
            let mut last = self.last_unread.lock();
            let changed = *last != Some(unread);
            *last = Some(unread);
            changed
        };

        self.updated.emit(feed);
        if changed {
            debug!(target: TARGET, unread, "unread count changed");
            self.unread_count_changed.emit(unread);
        }
    }
}

/// Polls the notification endpoint on a fixed interval.
///
/// # Signals
///
/// - [`updated`](Self::updated): every successful poll
/// - [`unread_count_changed`](Self::unread_count_changed): only when the badge count differs from the previous poll
/// - [`failed`](Self::failed): a poll failed; polling continues
pub struct NotificationPoller {
    api: CircleApi,
    interval: Duration,
    signals: Arc<PollerSignals>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationPoller {
    pub fn new(api: CircleApi) -> Self {
        Self {
            api,
            interval: DEFAULT_POLL_INTERVAL,
            signals: Arc::new(PollerSignals {
                updated: Signal::new(),
                unread_count_changed: Signal::new(),
                failed: Signal::new(),
                last_unread: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Override the polling interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.interval
    }

    pub fn updated(&self) -> &Signal<NotificationFeed> {
        &self.signals.updated
    }

    pub fn unread_count_changed(&self) -> &Signal<u64> {
        &self.signals.unread_count_changed
    }

    pub fn failed(&self) -> &Signal<NetworkError> {
        &self.signals.failed
    }

    /// Badge count from the last successful poll.
    pub fn last_unread_count(&self) -> Option<u64> {
        *self.signals.last_unread.lock()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Start polling: once immediately, then every interval.
    ///
    /// Does nothing if already running or when called outside a Tokio
    /// runtime (logged).
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(target: TARGET, error = %e, "cannot poll outside a Tokio runtime");
                return;
            }
        };

        let api = self.api.clone();
        let signals = self.signals.clone();
        let period = self.interval;

        info!(target: TARGET, interval_ms = period.as_millis() as u64, "starting notification poller");
        *task = Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match api.notifications().await {
                    Ok(feed) => signals.publish(feed),
                    Err(e) => {
                        warn!(target: TARGET, error = %e, "notification poll failed");
                        signals.failed.emit(e);
                    }
                }
            }
        }));
    }

    /// Poll once right now, outside the timer.
    pub async fn poll_now(&self) -> Result<NotificationFeed, NetworkError> {
        let feed = self.api.notifications().await?;
        self.signals.publish(feed.clone());
        Ok(feed)
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!(target: TARGET, "notification poller stopped");
        }
    }
}

impl Drop for NotificationPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for NotificationPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationPoller")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}
