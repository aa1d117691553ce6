//! Emergency activation: countdown, cancellation and alert fan-out.

mod alert;
mod engine;
mod machine;

pub use alert::{Alert, AlertReport, RecipientOutcome};
pub use engine::{ActivationEngine, EngineDeps, TriggerOutcome, TriggerSource};
pub use machine::{ActivationId, ActivationMachine, ActivationState, StartOutcome, TickOutcome};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sos_contacts::EmergencyContact;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_COUNTDOWN_SECS: u32 = 5;
pub const DEFAULT_TICK_MS: u64 = 1000;

/// Countdown timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountdownConfig {
    /// Seconds between trigger and dispatch.
    pub duration_secs: u32,
    /// Length of one countdown step in milliseconds.
    pub tick_ms: u64,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_COUNTDOWN_SECS,
            tick_ms: DEFAULT_TICK_MS,
        }
    }
}

impl CountdownConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

/// Why a single delivery failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("recipient unreachable: {0}")]
    Unreachable(String),
    #[error("channel unavailable: {0}")]
    ChannelUnavailable(String),
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// Delivers an alert to one recipient (SMS gateway, push, call bridge...).
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        alert: &Alert,
        recipient: &EmergencyContact,
    ) -> Result<(), DispatchError>;
}

pub type AlertDispatcherRef = Arc<dyn AlertDispatcher>;

/// Dispatcher that only writes the alert to the log.
///
/// Used when no delivery channel is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn dispatch(
        &self,
        alert: &Alert,
        recipient: &EmergencyContact,
    ) -> Result<(), DispatchError> {
        tracing::warn!(
            alert_id = %alert.id,
            recipient = %recipient.name,
            phone = %recipient.phone,
            "{}",
            alert.message_body()
        );
        Ok(())
    }
}

/// Supplies the sender name placed in alerts.
pub trait IdentitySource: Send + Sync {
    fn user_name(&self) -> String;
}

pub type IdentitySourceRef = Arc<dyn IdentitySource>;

/// Fixed sender name.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(pub String);

impl IdentitySource for StaticIdentity {
    fn user_name(&self) -> String {
        self.0.clone()
    }
}

/// Repository trait for alert history persistence.
pub trait AlertRepository: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn save_alert(&self, report: &AlertReport) -> Result<(), Self::Error>;
    /// Most recent reports first.
    fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertReport>, Self::Error>;
}

/// Object-safe sink for finished alerts.
pub trait AlertRecorder: Send + Sync {
    fn record(&self, report: &AlertReport);
}

pub type AlertRecorderRef = Arc<dyn AlertRecorder>;

impl<R: AlertRepository> AlertRecorder for R {
    fn record(&self, report: &AlertReport) {
        if let Err(e) = self.save_alert(report) {
            tracing::warn!(alert_id = %report.alert.id, "failed to record alert: {}", e);
        }
    }
}
