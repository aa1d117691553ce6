//! Periodic location refresh while the app is in the foreground.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::LocationProvider;

/// Default interval between background refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Location settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Seconds between background refreshes. Zero disables the watcher.
    pub refresh_interval_secs: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL.as_secs(),
        }
    }
}

impl LocationConfig {
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

/// Keeps the provider's snapshot fresh on a fixed interval.
///
/// Each `start()` uses a fresh cancellation token, so `stop()` + `start()`
/// works.
pub struct LocationWatcher {
    running: AtomicBool,
    cancel_token: Mutex<CancellationToken>,
}

impl LocationWatcher {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            cancel_token: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the refresh task. Refreshes immediately, then every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, provider: Arc<LocationProvider>, interval: Duration) {
        if self.is_running() {
            tracing::warn!("LocationWatcher already running");
            return;
        }

        let token = CancellationToken::new();
        let child = token.child_token();
        *self.cancel_token.lock().unwrap_or_else(PoisonError::into_inner) = token;
        self.running.store(true, Ordering::Release);

        tokio::spawn(async move {
            tracing::info!("LocationWatcher started with interval {:?}", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                // Failures are already logged by the provider.
                let _ = provider.update_location().await;
            }

            tracing::info!("LocationWatcher stopped");
        });
    }

    pub fn stop(&self) {
        self.cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        self.running.store(false, Ordering::Release);
    }
}

impl Default for LocationWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LocationWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
