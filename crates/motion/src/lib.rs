//! Motion signal detection for the SOS trigger.
//!
//! Raw acceleration samples flow from the platform sensor driver through a
//! bounded [`SampleBus`] into a background task that runs the
//! [`ShakeDetector`] algorithm. Each recognized gesture is delivered once to
//! the registered [`ShakeCallback`].
//!
//! # Example
//!
//! ```ignore
//! use sos_motion::{new_callback, MotionSignalDetector, ShakeConfig};
//!
//! let detector = MotionSignalDetector::new(sensor, ShakeConfig::default());
//! detector.on_shake(new_callback(|event| println!("shake {:.1}", event.magnitude)));
//! detector.request_motion_permission().await;
//! detector.enable();
//! ```

mod bus;
mod detector;
mod shake;

pub use bus::{SampleBus, SampleBusConfig, SampleFrame, SampleReceiver, SampleSender};
pub use detector::{new_callback, MotionSignalDetector, ShakeCallback};
pub use shake::{ShakeConfig, ShakeDetector, ShakeEvent};

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

/// One accelerometer reading in m/s².
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelerationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Monotonic capture time.
    pub at: Instant,
}

impl AccelerationSample {
    pub fn new(x: f64, y: f64, z: f64, at: Instant) -> Self {
        Self { x, y, z, at }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Errors raised by the sensor boundary.
#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("motion sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("failed to subscribe to motion sensor: {0}")]
    SubscribeFailed(String),
}

/// Sensor boundary implemented by the platform driver.
#[async_trait]
pub trait MotionSensor: Send + Sync {
    /// Ask the user for motion access. May suspend until they answer.
    async fn request_permission(&self) -> bool;

    /// Begin pushing samples into `sender` until [`MotionSensor::stop`].
    fn start(&self, sender: SampleSender) -> Result<(), MotionError>;

    /// Stop pushing samples.
    fn stop(&self);
}

/// Type alias for shared sensor reference.
pub type MotionSensorRef = Arc<dyn MotionSensor>;
