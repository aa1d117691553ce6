//! Fire-and-forget user feedback (toasts).
//!
//! Notifications never influence control flow. A notifier that fails to
//! present a message simply drops it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bus::EventBusRef;
use crate::event_names;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

/// Short status message with optional detail line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Timestamp in milliseconds since epoch.
    pub timestamp_ms: i64,
}

impl Notification {
    pub fn new(severity: Severity, title: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            description: None,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(Severity::Success, title)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(Severity::Info, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(Severity::Warning, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(Severity::Error, title)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Presentation side-channel for notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Type alias for shared notifier reference.
pub type NotifierRef = Arc<dyn Notifier>;

/// Notifier that publishes on the event bus under `sos:notification`.
pub struct BusNotifier {
    bus: EventBusRef,
}

impl BusNotifier {
    pub fn new(bus: EventBusRef) -> Self {
        Self { bus }
    }
}

impl Notifier for BusNotifier {
    fn notify(&self, notification: Notification) {
        tracing::debug!(
            severity = ?notification.severity,
            title = %notification.title,
            "notification"
        );
        match serde_json::to_value(&notification) {
            Ok(payload) => self.bus.emit(event_names::NOTIFICATION, payload),
            Err(e) => tracing::warn!("failed to encode notification: {}", e),
        }
    }
}
