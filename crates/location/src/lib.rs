//! Location acquisition for emergency alerts.
//!
//! Wraps the device geolocation API behind the [`Geolocator`] trait and keeps
//! the latest successful fix as a snapshot. A missing fix is a degraded state,
//! never an error that stops an alert.
//!
//! ```text
//! Geolocator (device) ──► LocationProvider (snapshot + permission)
//!                               ▲
//!                               └── LocationWatcher (periodic refresh)
//! ```

mod provider;
mod watcher;

pub use provider::{Geolocator, GeolocatorRef, LocationProvider};
pub use watcher::{LocationConfig, LocationWatcher, DEFAULT_REFRESH_INTERVAL};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single position fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters.
    #[serde(default)]
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.accuracy = Some(meters);
        self
    }

    /// Time elapsed since the fix was taken. Zero for fixes in the future.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.timestamp).to_std().unwrap_or_default()
    }

    pub fn is_older_than(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }
}

/// Why a position request produced no fix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("no position fix available")]
    NoFix,

    #[error("location permission denied")]
    PermissionDenied,

    #[error("position request timed out")]
    Timeout,

    #[error("location unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, LocationError>;
