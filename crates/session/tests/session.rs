//! End-to-end tests for the emergency session with fake platform boundaries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sos_activation::{
    ActivationState, Alert, AlertDispatcher, DispatchError, TriggerOutcome,
};
use sos_contacts::{EmergencyContact, NewContact};
use sos_events::{event_names, Notification, PermissionState, RecordingEventBus, Severity};
use sos_location::{Geolocator, Location, LocationError};
use sos_motion::{AccelerationSample, MotionError, MotionSensor, SampleSender};
use sos_storage::{keys, Database, MemoryStore, PreferenceStore};
use sos_session::{SessionDeps, SosConfig, SosSession};

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct FakeSensor {
    deny: bool,
    sender: Mutex<Option<SampleSender>>,
    starts: AtomicUsize,
}

impl FakeSensor {
    fn shake(&self, t0: Instant) {
        let sender = self.sender.lock().unwrap();
        let Some(sender) = sender.as_ref() else {
            return;
        };
        for i in 0..10 {
            sender.send(AccelerationSample::new(
                25.0,
                0.0,
                9.8,
                t0 + Duration::from_millis(i * 16),
            ));
        }
    }

    fn is_streaming(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }
}

#[async_trait]
impl MotionSensor for FakeSensor {
    async fn request_permission(&self) -> bool {
        !self.deny
    }

    fn start(&self, sender: SampleSender) -> Result<(), MotionError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.sender.lock().unwrap() = Some(sender);
        Ok(())
    }

    fn stop(&self) {
        self.sender.lock().unwrap().take();
    }
}

struct FakeGeolocator {
    granted: bool,
    fix: Location,
    calls: AtomicUsize,
}

impl FakeGeolocator {
    fn new(granted: bool) -> Self {
        Self {
            granted,
            fix: Location::new(52.52, 13.405).with_accuracy(10.0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Geolocator for FakeGeolocator {
    async fn request_permission(&self) -> bool {
        self.granted
    }

    async fn current_position(&self) -> Result<Location, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.granted {
            Ok(self.fix.clone())
        } else {
            Err(LocationError::PermissionDenied)
        }
    }
}

#[derive(Default)]
struct OutboxDispatcher {
    sent: Mutex<Vec<(Alert, EmergencyContact)>>,
}

impl OutboxDispatcher {
    fn sent(&self) -> Vec<(Alert, EmergencyContact)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertDispatcher for OutboxDispatcher {
    async fn dispatch(&self, alert: &Alert, recipient: &EmergencyContact) -> Result<(), DispatchError> {
        self.sent
            .lock()
            .unwrap()
            .push((alert.clone(), recipient.clone()));
        Ok(())
    }
}

struct Harness {
    session: SosSession,
    store: Arc<MemoryStore>,
    sensor: Arc<FakeSensor>,
    geolocator: Arc<FakeGeolocator>,
    dispatcher: Arc<OutboxDispatcher>,
    bus: Arc<RecordingEventBus>,
    db: Arc<Database>,
}

impl Harness {
    fn new() -> Self {
        Self::build(Arc::new(MemoryStore::new()), FakeSensor::default(), true)
    }

    fn build(store: Arc<MemoryStore>, sensor: FakeSensor, location_granted: bool) -> Self {
        let sensor = Arc::new(sensor);
        let geolocator = Arc::new(FakeGeolocator::new(location_granted));
        let dispatcher = Arc::new(OutboxDispatcher::default());
        let bus = Arc::new(RecordingEventBus::new());
        let db = Arc::new(Database::open_in_memory().unwrap());

        let session = SosSession::new(SessionDeps {
            store: store.clone(),
            geolocator: geolocator.clone(),
            sensor: sensor.clone(),
            dispatcher: dispatcher.clone(),
            event_bus: bus.clone(),
            alert_repository: Some(db.clone()),
        })
        .unwrap();

        Self {
            session,
            store,
            sensor,
            geolocator,
            dispatcher,
            bus,
            db,
        }
    }

    fn notifications(&self) -> Vec<Notification> {
        self.bus
            .events_for(event_names::NOTIFICATION)
            .into_iter()
            .map(|e| serde_json::from_value(e.payload).unwrap())
            .collect()
    }

    fn titles(&self) -> Vec<String> {
        self.notifications().into_iter().map(|n| n.title).collect()
    }

    fn onboarded_with_contact(self) -> Self {
        self.session.complete_onboarding("Ana").unwrap();
        self.session
            .add_contact(NewContact::new("Mom", "555-0001"))
            .unwrap();
        self.session.start();
        self
    }
}

async fn settle(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

// =============================================================================
// Onboarding and contacts
// =============================================================================

mod setup {
    use super::*;

    #[tokio::test]
    async fn test_onboarding_persists_and_welcomes() {
        let h = Harness::new();
        assert!(!h.session.is_onboarded());

        h.session.complete_onboarding("  Ana ").unwrap();

        assert!(h.session.is_onboarded());
        assert_eq!(h.session.user_name(), "Ana");
        assert_eq!(
            h.store.get_raw(keys::ONBOARDING).unwrap().as_deref(),
            Some("true")
        );
        let welcome = &h.notifications()[0];
        assert_eq!(welcome.severity, Severity::Success);
        assert_eq!(welcome.title, "Welcome to Emergency SOS");
        assert_eq!(
            welcome.description.as_deref(),
            Some("Add your emergency contacts to get started.")
        );
    }

    #[tokio::test]
    async fn test_contact_changes_notify_and_persist() {
        let h = Harness::new();
        let mom = h.session.add_contact(NewContact::new("Mom", "555-0001")).unwrap();
        let dad = h.session.add_contact(NewContact::new("Dad", "555-0002")).unwrap();

        assert!(h.session.set_primary(&dad.id).unwrap());
        assert!(!h.session.set_primary("missing").unwrap());
        assert_eq!(h.session.remove_contact(&dad.id).unwrap().map(|c| c.name), Some("Dad".into()));
        assert_eq!(h.session.remove_contact("missing").unwrap(), None);

        assert_eq!(
            h.titles(),
            vec![
                "Contact added",
                "Contact added",
                "Primary contact updated",
                "Contact removed"
            ]
        );
        assert_eq!(
            h.notifications()[0].description.as_deref(),
            Some("Mom has been added.")
        );

        let reopened = Harness::build(h.store.clone(), FakeSensor::default(), true);
        let contacts = reopened.session.contacts();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].id, mom.id);
        assert!(contacts[0].is_primary);
    }

    #[tokio::test]
    async fn test_invalid_contact_reports_error() {
        let h = Harness::new();
        let result = h.session.add_contact(NewContact::new("  ", "555"));

        assert!(result.is_err());
        assert!(h.session.contacts().is_empty());
        let note = &h.notifications()[0];
        assert_eq!(note.severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_config_loaded_from_preferences() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_raw(keys::CONFIG, r#"{"countdown": {"duration_secs": 2}}"#)
            .unwrap();

        let h = Harness::build(store, FakeSensor::default(), true);
        let expected = SosConfig {
            countdown: sos_activation::CountdownConfig {
                duration_secs: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(h.session.config(), &expected);
    }
}

// =============================================================================
// Shake trigger
// =============================================================================

mod shake {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_shake_runs_full_emergency_flow() {
        let h = Harness::new().onboarded_with_contact();
        assert!(h.session.is_listening());

        h.sensor.shake(Instant::now());
        settle(10).await;

        assert!(matches!(h.session.state(), ActivationState::Counting { .. }));
        let shake_note = h
            .notifications()
            .into_iter()
            .find(|n| n.title == "Shake detected!")
            .unwrap();
        assert_eq!(shake_note.severity, Severity::Warning);
        assert_eq!(
            shake_note.description.as_deref(),
            Some("Initiating emergency SOS...")
        );
        assert_eq!(h.bus.events_for(event_names::SHAKE_DETECTED).len(), 1);

        settle(6_000).await;

        let sent = h.dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.user_name, "Ana");
        assert_eq!(sent[0].1.name, "Mom");
        assert_eq!(h.session.state(), ActivationState::Idle);
        assert_eq!(h.session.alert_history(10).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shake_while_active_is_dropped() {
        let h = Harness::new().onboarded_with_contact();
        let t0 = Instant::now();

        h.sensor.shake(t0);
        settle(10).await;
        h.sensor.shake(t0 + Duration::from_secs(3));
        settle(10).await;

        assert_eq!(h.bus.events_for(event_names::SHAKE_DETECTED).len(), 2);
        let warnings = h
            .titles()
            .into_iter()
            .filter(|t| t == "Shake detected!")
            .count();
        assert_eq!(warnings, 1);

        settle(6_000).await;
        assert_eq!(h.dispatcher.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shake_without_contacts_only_reports_error() {
        let h = Harness::new();
        h.session.complete_onboarding("Ana").unwrap();
        h.session.start();
        h.bus.clear();

        h.sensor.shake(Instant::now());
        settle(6_000).await;

        let notes = h.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Error);
        assert!(h.bus.events_for(event_names::STATE_CHANGED).is_empty());
        assert!(h.dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_not_listening_before_onboarding() {
        let h = Harness::new();
        h.session.start();

        assert!(!h.session.is_listening());
        assert_eq!(h.sensor.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shake_toggle_starts_and_stops_sensor() {
        let h = Harness::new().onboarded_with_contact();
        assert!(h.sensor.is_streaming());

        h.session.set_shake_enabled(false).unwrap();
        assert!(!h.session.is_listening());
        assert!(!h.sensor.is_streaming());
        assert!(!h.session.shake_enabled());

        h.session.set_shake_enabled(true).unwrap();
        assert!(h.session.is_listening());
        assert!(h.sensor.is_streaming());
    }

    #[tokio::test]
    async fn test_motion_permission_denied_keeps_detector_off() {
        let h = Harness::build(
            Arc::new(MemoryStore::new()),
            FakeSensor {
                deny: true,
                ..Default::default()
            },
            true,
        )
        .onboarded_with_contact();

        assert!(!h.session.request_motion_permission().await);
        assert_eq!(h.session.motion_permission(), PermissionState::Denied);
        assert!(!h.session.is_listening());

        h.session.set_shake_enabled(true).unwrap();
        assert!(!h.session.is_listening());
    }

    #[tokio::test]
    async fn test_shutdown_stops_sensor() {
        let h = Harness::new().onboarded_with_contact();
        h.session.shutdown();
        assert!(!h.session.is_listening());
        assert!(!h.sensor.is_streaming());
    }
}

// =============================================================================
// Manual trigger and location
// =============================================================================

mod manual {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_with_location() {
        let h = Harness::new().onboarded_with_contact();
        assert!(h.session.request_location_permission().await);
        assert!(h.session.location().is_some());

        assert!(matches!(h.session.trigger_manual(), TriggerOutcome::Started(_)));
        settle(6_000).await;

        let report = h.session.last_report().unwrap();
        let location = report.alert.location.as_ref().unwrap();
        assert_eq!(location.latitude, 52.52);
        assert!(report.alert.message_body().contains("https://maps.google.com/?q=52.520000,13.405000"));

        let stored = h.db.get_alert(&report.alert.id).unwrap();
        assert_eq!(stored, report);
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_denied_alert_still_sent() {
        let h = Harness::build(Arc::new(MemoryStore::new()), FakeSensor::default(), false)
            .onboarded_with_contact();
        assert!(!h.session.request_location_permission().await);
        assert_eq!(h.session.location_permission(), PermissionState::Denied);
        assert!(h.session.refresh_location().await.is_err());

        h.session.trigger_manual();
        settle(6_000).await;

        let report = h.session.last_report().unwrap();
        assert!(report.alert.location.is_none());
        assert!(report.alert.message_body().contains("location is unavailable"));
        assert_eq!(
            h.notifications().last().unwrap().description.as_deref(),
            Some("Notified 1 contact(s), location unavailable")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_manual_trigger() {
        let h = Harness::new().onboarded_with_contact();
        h.session.trigger_manual();
        settle(2_500).await;

        assert_eq!(h.session.remaining_seconds(), Some(3));
        assert!(h.session.cancel());
        settle(6_000).await;

        assert!(h.dispatcher.sent().is_empty());
        assert!(h.session.alert_history(10).unwrap().is_empty());
        assert_eq!(h.session.state(), ActivationState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_watcher_refreshes() {
        let h = Harness::new().onboarded_with_contact();
        h.session.request_location_permission().await;
        settle(10).await;
        let after_grant = h.geolocator.calls.load(Ordering::SeqCst);

        settle(61_000).await;

        assert!(h.geolocator.calls.load(Ordering::SeqCst) >= after_grant + 2);
    }
}
