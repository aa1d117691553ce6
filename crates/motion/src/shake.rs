//! Threshold + refractory shake recognition.
//!
//! Pure logic: the clock comes from the samples, so the detector behaves the
//! same in tests and on a device.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::AccelerationSample;

/// Magnitude (m/s²) a sample must exceed to count as a peak.
pub const DEFAULT_THRESHOLD: f64 = 15.0;

/// Peaks needed inside the peak window to recognize a shake. One peak means a
/// single sharp jolt is enough.
pub const DEFAULT_REQUIRED_PEAKS: usize = 1;

/// Window for consecutive peaks when more than one is required.
pub const DEFAULT_PEAK_WINDOW: Duration = Duration::from_millis(1000);

/// Quiet period after a recognized shake.
pub const DEFAULT_REFRACTORY: Duration = Duration::from_millis(2000);

/// Shake detection settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShakeConfig {
    /// Peak threshold in m/s².
    pub threshold: f64,
    pub required_peaks: usize,
    pub peak_window_ms: u64,
    pub refractory_ms: u64,
    /// Sample bus capacity.
    pub buffer_capacity: usize,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            required_peaks: DEFAULT_REQUIRED_PEAKS,
            peak_window_ms: DEFAULT_PEAK_WINDOW.as_millis() as u64,
            refractory_ms: DEFAULT_REFRACTORY.as_millis() as u64,
            buffer_capacity: crate::bus::DEFAULT_CAPACITY,
        }
    }
}

impl ShakeConfig {
    pub fn peak_window(&self) -> Duration {
        Duration::from_millis(self.peak_window_ms)
    }

    pub fn refractory(&self) -> Duration {
        Duration::from_millis(self.refractory_ms)
    }
}

/// A recognized shake gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShakeEvent {
    /// Strongest magnitude among the peaks.
    pub magnitude: f64,
    pub peaks: usize,
    /// Time of the sample that completed the gesture.
    pub at: Instant,
}

/// Turns a stream of samples into discrete shake events.
#[derive(Debug)]
pub struct ShakeDetector {
    config: ShakeConfig,
    peaks: Vec<(Instant, f64)>,
    last_shake: Option<Instant>,
}

impl ShakeDetector {
    pub fn new(config: ShakeConfig) -> Self {
        Self {
            config,
            peaks: Vec::with_capacity(config.required_peaks.max(1)),
            last_shake: None,
        }
    }

    pub fn config(&self) -> &ShakeConfig {
        &self.config
    }

    /// Feed one sample. Returns an event when it completes a gesture.
    pub fn process(&mut self, sample: &AccelerationSample) -> Option<ShakeEvent> {
        let now = sample.at;

        if let Some(last) = self.last_shake {
            if now.saturating_duration_since(last) < self.config.refractory() {
                return None;
            }
        }

        let magnitude = sample.magnitude();
        if magnitude <= self.config.threshold {
            return None;
        }

        // Remove old peaks outside the window
        let window = self.config.peak_window();
        self.peaks
            .retain(|&(t, _)| now.saturating_duration_since(t) < window);
        self.peaks.push((now, magnitude));

        tracing::trace!(
            magnitude,
            count = self.peaks.len(),
            "acceleration peak, tracking for shake"
        );

        if self.peaks.len() < self.config.required_peaks.max(1) {
            return None;
        }

        let event = ShakeEvent {
            magnitude: self
                .peaks
                .iter()
                .map(|&(_, m)| m)
                .fold(f64::MIN, f64::max),
            peaks: self.peaks.len(),
            at: now,
        };
        self.peaks.clear();
        self.last_shake = Some(now);

        tracing::debug!(
            magnitude = event.magnitude,
            peaks = event.peaks,
            "shake recognized"
        );
        Some(event)
    }

    /// Forget buffered peaks and the refractory window.
    pub fn reset(&mut self) {
        self.peaks.clear();
        self.last_shake = None;
    }
}

impl Default for ShakeDetector {
    fn default() -> Self {
        Self::new(ShakeConfig::default())
    }
}
