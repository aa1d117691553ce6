//! Countdown driver and alert fan-out.
//!
//! All transitions go through one [`ActivationMachine`] behind a mutex. The
//! countdown task only sleeps; every decision it acts on is made while holding
//! that lock, so a cancel and the final tick can never both take effect.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sos_contacts::ContactRegistry;
use sos_events::{
    event_names, AlertDispatchedEvent, CountdownTickEvent, EventBusRef, Notification, NotifierRef,
    StateChangedEvent,
};
use sos_location::LocationProvider;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    Alert, AlertDispatcherRef, AlertRecorderRef, AlertReport, ActivationId, ActivationMachine,
    ActivationState, CountdownConfig, IdentitySourceRef, RecipientOutcome, StartOutcome,
    TickOutcome,
};

const NO_CONTACTS: &str = "No emergency contacts configured";

/// What asked for the emergency flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Manual,
    Shake,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Shake => "shake",
        }
    }
}

/// Result of [`ActivationEngine::trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started(ActivationId),
    AlreadyActive(ActivationId),
    /// Refused before any state change.
    NoContacts,
}

impl From<StartOutcome> for TriggerOutcome {
    fn from(outcome: StartOutcome) -> Self {
        match outcome {
            StartOutcome::Started(id) => Self::Started(id),
            StartOutcome::AlreadyActive(id) => Self::AlreadyActive(id),
        }
    }
}

/// Collaborators the engine reads from and reports to.
pub struct EngineDeps {
    pub contacts: Arc<ContactRegistry>,
    pub location: Arc<LocationProvider>,
    pub identity: IdentitySourceRef,
    pub dispatcher: AlertDispatcherRef,
    pub notifier: NotifierRef,
    pub event_bus: EventBusRef,
    pub recorder: Option<AlertRecorderRef>,
}

struct Slot {
    machine: ActivationMachine,
    countdown: Option<CancellationToken>,
    last_report: Option<AlertReport>,
}

struct Inner {
    config: CountdownConfig,
    deps: EngineDeps,
    slot: Mutex<Slot>,
    state_tx: watch::Sender<ActivationState>,
}

/// Owns the activation state of one session.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ActivationEngine {
    inner: Arc<Inner>,
}

impl ActivationEngine {
    pub fn new(config: CountdownConfig, deps: EngineDeps) -> Self {
        let (state_tx, _) = watch::channel(ActivationState::Idle);
        Self {
            inner: Arc::new(Inner {
                config,
                deps,
                slot: Mutex::new(Slot {
                    machine: ActivationMachine::new(),
                    countdown: None,
                    last_report: None,
                }),
                state_tx,
            }),
        }
    }

    pub fn config(&self) -> &CountdownConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ActivationState {
        self.slot().machine.state()
    }

    pub fn remaining_seconds(&self) -> Option<u32> {
        self.state().remaining_secs()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Latest activation id (zero before the first countdown).
    pub fn current_activation(&self) -> ActivationId {
        self.slot().machine.current()
    }

    /// Report of the most recent dispatch.
    pub fn last_report(&self) -> Option<AlertReport> {
        self.slot().last_report.clone()
    }

    /// Watch state transitions. Fast transitions may coalesce; use the
    /// event bus for the full sequence.
    pub fn subscribe(&self) -> watch::Receiver<ActivationState> {
        self.inner.state_tx.subscribe()
    }

    /// Entry point for manual and shake triggers.
    ///
    /// Refuses with an error notification when no contacts are configured.
    pub fn trigger(&self, source: TriggerSource) -> TriggerOutcome {
        if self.inner.deps.contacts.is_empty() {
            tracing::warn!(source = source.as_str(), "trigger refused, no contacts");
            self.inner.deps.notifier.notify(
                Notification::error("Cannot activate emergency SOS").with_description(NO_CONTACTS),
            );
            return TriggerOutcome::NoContacts;
        }

        let outcome = self.start_countdown();
        tracing::info!(source = source.as_str(), ?outcome, "emergency triggered");
        outcome.into()
    }

    /// `Idle → Counting`. No-op while counting or dispatching.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_countdown(&self) -> StartOutcome {
        let token = CancellationToken::new();
        let outcome = {
            let mut slot = self.slot();
            let outcome = slot.machine.start(self.inner.config.duration_secs);
            if let StartOutcome::Started(id) = outcome {
                slot.countdown = Some(token.clone());
                self.publish_state(id, slot.machine.state());
            }
            outcome
        };

        match outcome {
            StartOutcome::Started(id) => {
                tracing::warn!(
                    activation = id.0,
                    duration_secs = self.inner.config.duration_secs,
                    "emergency countdown started"
                );
                let engine = self.clone();
                tokio::spawn(async move { engine.run_countdown(id, token).await });
            }
            StartOutcome::AlreadyActive(id) => {
                tracing::debug!(activation = id.0, "countdown already active");
            }
        }
        outcome
    }

    /// `Counting → Cancelled → Idle`.
    ///
    /// Returns false when nothing was counting, including when the countdown
    /// already expired and dispatch is underway.
    pub fn cancel_countdown(&self) -> bool {
        let cancelled = {
            let mut slot = self.slot();
            let Some(id) = slot.machine.cancel() else {
                return false;
            };
            if let Some(token) = slot.countdown.take() {
                token.cancel();
            }
            self.publish_state(id, ActivationState::Cancelled);
            self.publish_state(id, slot.machine.state());
            id
        };

        tracing::info!(activation = cancelled.0, "emergency countdown cancelled");
        self.inner
            .deps
            .notifier
            .notify(Notification::info("Emergency cancelled"));
        true
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Caller holds the slot lock so bus order matches transition order.
    fn publish_state(&self, id: ActivationId, state: ActivationState) {
        self.inner.state_tx.send_replace(state);
        let payload = StateChangedEvent {
            activation: id.0,
            state: state.label().to_string(),
            remaining_secs: state.remaining_secs(),
        };
        self.emit(event_names::STATE_CHANGED, &payload);
    }

    fn emit<T: serde::Serialize>(&self, topic: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.inner.deps.event_bus.emit(topic, value),
            Err(e) => tracing::warn!(topic, "failed to serialize event: {}", e),
        }
    }

    async fn run_countdown(&self, id: ActivationId, token: CancellationToken) {
        let tick = self.inner.config.tick();
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(activation = id.0, "countdown task stopped");
                    return;
                }
                _ = tokio::time::sleep(tick) => {}
            }

            match self.step(id) {
                TickOutcome::Counting(_) => continue,
                TickOutcome::Expired => break,
                TickOutcome::Stale => return,
            }
        }

        self.dispatch(id).await;
    }

    fn step(&self, id: ActivationId) -> TickOutcome {
        let mut slot = self.slot();
        let outcome = slot.machine.tick(id);
        let remaining_secs = match outcome {
            TickOutcome::Counting(remaining) => remaining,
            TickOutcome::Expired => {
                slot.countdown = None;
                0
            }
            TickOutcome::Stale => return outcome,
        };

        self.emit(
            event_names::COUNTDOWN_TICK,
            &CountdownTickEvent {
                activation: id.0,
                remaining_secs,
            },
        );
        self.publish_state(id, slot.machine.state());
        outcome
    }

    fn build_alert(&self, id: ActivationId) -> Alert {
        let deps = &self.inner.deps;
        Alert::new(
            id,
            deps.location.location(),
            deps.identity.user_name(),
            deps.contacts.recipients(),
        )
    }

    async fn dispatch(&self, id: ActivationId) {
        let alert = self.build_alert(id);
        tracing::warn!(
            activation = id.0,
            alert_id = %alert.id,
            recipients = alert.recipients.len(),
            has_location = alert.has_location(),
            "dispatching emergency alert"
        );

        let mut outcomes = Vec::with_capacity(alert.recipients.len());
        for recipient in &alert.recipients {
            match self.inner.deps.dispatcher.dispatch(&alert, recipient).await {
                Ok(()) => {
                    tracing::info!(recipient = %recipient.name, "alert delivered");
                    outcomes.push(RecipientOutcome::delivered(recipient));
                }
                Err(e) => {
                    tracing::error!(recipient = %recipient.name, "alert delivery failed: {}", e);
                    outcomes.push(RecipientOutcome::failed(recipient, e.to_string()));
                }
            }
        }

        let report = AlertReport { alert, outcomes };
        self.finish(id, report);
    }

    fn finish(&self, id: ActivationId, report: AlertReport) {
        {
            let mut slot = self.slot();
            if slot.machine.complete(id) {
                self.publish_state(id, ActivationState::Completed);
                self.publish_state(id, slot.machine.state());
            }
            slot.last_report = Some(report.clone());
        }

        self.emit(
            event_names::ALERT_DISPATCHED,
            &AlertDispatchedEvent {
                activation: id.0,
                alert_id: report.alert.id.to_string(),
                delivered: report.delivered(),
                failed: report.failed(),
                has_location: report.alert.has_location(),
            },
        );
        self.inner.deps.notifier.notify(summarize(&report));

        if let Some(recorder) = &self.inner.deps.recorder {
            recorder.record(&report);
        }
    }
}

impl std::fmt::Debug for ActivationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationEngine")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn summarize(report: &AlertReport) -> Notification {
    if report.outcomes.is_empty() {
        return Notification::error("Alert could not be sent").with_description(NO_CONTACTS);
    }

    if report.all_delivered() {
        let mut description = format!("Notified {} contact(s)", report.delivered());
        if !report.alert.has_location() {
            description.push_str(", location unavailable");
        }
        return Notification::success("Emergency alert sent").with_description(description);
    }

    let unreachable = format!("Could not reach: {}", report.failed_names().join(", "));
    if report.delivered() == 0 {
        Notification::error("Alert could not be sent").with_description(unreachable)
    } else {
        Notification::warning("Alert partially sent").with_description(unreachable)
    }
}
