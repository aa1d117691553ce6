//! Shared event contracts for the SOS core.
//!
//! This crate defines the DTOs that flow from the detector, the activation
//! engine and the session to whatever presents them (UI, logs, tests), plus
//! the `EventBus` and `Notifier` traits used to publish them.

mod bus;
mod notification;

pub use bus::{EventBus, EventBusRef, RecordedEvent, RecordingEventBus, TracingEventBus};
pub use notification::{BusNotifier, Notification, Notifier, NotifierRef, Severity};

use serde::{Deserialize, Serialize};

/// Outcome of a device permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// Not requested yet.
    #[default]
    Prompt,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn from_granted(granted: bool) -> Self {
        if granted {
            Self::Granted
        } else {
            Self::Denied
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Event emitted when the activation state machine transitions.
///
/// Producers: activation engine
/// Consumers: UI, session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangedEvent {
    /// Activation the transition belongs to (0 before the first countdown).
    pub activation: u64,
    /// New state label ("idle", "counting", ...).
    pub state: String,
    /// Seconds left when counting.
    #[serde(default)]
    pub remaining_secs: Option<u32>,
}

/// Event emitted on every countdown step.
///
/// Producers: activation engine
/// Consumers: UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownTickEvent {
    pub activation: u64,
    pub remaining_secs: u32,
}

/// Event emitted when the motion detector recognizes a shake.
///
/// Producers: motion detector
/// Consumers: UI, diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShakeDetectedEvent {
    /// Peak magnitude in m/s².
    pub magnitude: f64,
    /// Number of above-threshold samples that formed the gesture.
    pub peaks: usize,
    /// Timestamp in milliseconds since epoch.
    pub timestamp_ms: i64,
}

/// Event emitted after an alert fan-out finishes.
///
/// Producers: activation engine
/// Consumers: UI, history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDispatchedEvent {
    pub activation: u64,
    pub alert_id: String,
    pub delivered: usize,
    pub failed: usize,
    pub has_location: bool,
}

/// Event names as constants to prevent typos.
pub mod event_names {
    /// Activation state transition.
    pub const STATE_CHANGED: &str = "sos:state_changed";
    /// Countdown step.
    pub const COUNTDOWN_TICK: &str = "sos:countdown_tick";
    /// Shake recognized by the motion detector.
    pub const SHAKE_DETECTED: &str = "sos:shake_detected";
    /// Alert fan-out finished.
    pub const ALERT_DISPATCHED: &str = "sos:alert_dispatched";
    /// User-facing notification.
    pub const NOTIFICATION: &str = "sos:notification";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_changed_deserialize_minimal() {
        let json = r#"{"activation": 2, "state": "idle"}"#;
        let event: StateChangedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.activation, 2);
        assert_eq!(event.state, "idle");
        assert_eq!(event.remaining_secs, None);
    }

    #[test]
    fn test_permission_state() {
        assert_eq!(PermissionState::default(), PermissionState::Prompt);
        assert!(PermissionState::from_granted(true).is_granted());
        assert_eq!(PermissionState::from_granted(false), PermissionState::Denied);
        assert_eq!(
            serde_json::to_string(&PermissionState::Denied).unwrap(),
            "\"denied\""
        );
    }
}
