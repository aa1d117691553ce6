use std::sync::Arc;

use sos_activation::{
    ActivationEngine, ActivationState, AlertDispatcherRef, AlertRecorderRef, AlertReport,
    AlertRepository, EngineDeps, TriggerOutcome, TriggerSource,
};
use sos_contacts::{ContactRegistry, EmergencyContact, NewContact};
use sos_events::{BusNotifier, EventBusRef, Notification, NotifierRef, PermissionState};
use sos_location::{GeolocatorRef, Location, LocationError, LocationProvider, LocationWatcher};
use sos_motion::{new_callback, MotionSensorRef, MotionSignalDetector, ShakeEvent};
use sos_storage::{Database, PreferenceStoreRef, Preferences};
use tokio::sync::watch;

use crate::{Result, SosConfig};

/// Platform boundaries and storage a session is built from.
pub struct SessionDeps {
    pub store: PreferenceStoreRef,
    pub geolocator: GeolocatorRef,
    pub sensor: MotionSensorRef,
    pub dispatcher: AlertDispatcherRef,
    pub event_bus: EventBusRef,
    /// Alert history. `None` keeps no history.
    pub alert_repository: Option<Arc<Database>>,
}

pub struct SosSession {
    preferences: Preferences,
    config: SosConfig,
    contacts: Arc<ContactRegistry>,
    location: Arc<LocationProvider>,
    watcher: LocationWatcher,
    detector: MotionSignalDetector,
    engine: ActivationEngine,
    notifier: NotifierRef,
    alerts: Option<Arc<Database>>,
}

impl SosSession {
    /// Build a session from stored preferences and contacts.
    ///
    /// Nothing listens until [`SosSession::start`].
    pub fn new(deps: SessionDeps) -> Result<Self> {
        let preferences = Preferences::new(deps.store);
        let config: SosConfig = preferences.config();
        let contacts = Arc::new(ContactRegistry::load(Arc::new(preferences.clone()))?);
        let location = Arc::new(LocationProvider::new(deps.geolocator));
        let notifier: NotifierRef = Arc::new(BusNotifier::new(deps.event_bus.clone()));

        let detector = MotionSignalDetector::new(deps.sensor, config.shake)
            .with_event_bus(deps.event_bus.clone());

        let recorder = deps
            .alert_repository
            .clone()
            .map(|db| db as AlertRecorderRef);
        let engine = ActivationEngine::new(
            config.countdown.clone(),
            EngineDeps {
                contacts: contacts.clone(),
                location: location.clone(),
                identity: Arc::new(preferences.clone()),
                dispatcher: deps.dispatcher,
                notifier: notifier.clone(),
                event_bus: deps.event_bus,
                recorder,
            },
        );

        tracing::info!(
            contacts = contacts.len(),
            onboarded = preferences.onboarding_complete(),
            countdown_secs = config.countdown.duration_secs,
            "emergency session created"
        );

        Ok(Self {
            preferences,
            config,
            contacts,
            location,
            watcher: LocationWatcher::new(),
            detector,
            engine,
            notifier,
            alerts: deps.alert_repository,
        })
    }

    /// Register the shake consumer and start whatever the preferences allow.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let engine = self.engine.clone();
        let contacts = self.contacts.clone();
        let notifier = self.notifier.clone();
        self.detector.on_shake(new_callback(move |event| {
            handle_shake(&engine, &contacts, &notifier, event);
        }));

        self.apply_shake_setting();
        self.sync_location_watcher();
    }

    /// Stop listening to the sensor and stop refreshing location.
    ///
    /// A countdown or dispatch already underway runs to completion.
    pub fn shutdown(&self) {
        self.detector.clear_callback();
        self.detector.disable();
        self.watcher.stop();
        tracing::info!("emergency session stopped");
    }

    pub fn config(&self) -> &SosConfig {
        &self.config
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    // Onboarding

    pub fn is_onboarded(&self) -> bool {
        self.preferences.onboarding_complete()
    }

    pub fn user_name(&self) -> String {
        self.preferences.user_name()
    }

    pub fn complete_onboarding(&self, name: &str) -> Result<()> {
        self.preferences.set_user_name(name.trim())?;
        self.preferences.set_onboarding_complete(true)?;
        tracing::info!("onboarding complete");

        self.notifier.notify(
            Notification::success("Welcome to Emergency SOS")
                .with_description("Add your emergency contacts to get started."),
        );
        self.apply_shake_setting();
        Ok(())
    }

    // Contacts

    pub fn contacts(&self) -> Vec<EmergencyContact> {
        self.contacts.contacts()
    }

    pub fn primary_contact(&self) -> Option<EmergencyContact> {
        self.contacts.primary()
    }

    pub fn add_contact(&self, contact: NewContact) -> Result<EmergencyContact> {
        let added = self
            .contacts
            .add_contact(contact)
            .inspect_err(|e| self.report_contact_error(e))?;

        self.notifier.notify(
            Notification::success("Contact added")
                .with_description(format!("{} has been added.", added.name)),
        );
        Ok(added)
    }

    /// Returns false when `id` is unknown.
    pub fn set_primary(&self, id: &str) -> Result<bool> {
        let changed = self
            .contacts
            .set_primary(id)
            .inspect_err(|e| self.report_contact_error(e))?;

        if let (true, Some(primary)) = (changed, self.contacts.get(id)) {
            self.notifier.notify(
                Notification::success("Primary contact updated")
                    .with_description(format!("{} is now your primary contact.", primary.name)),
            );
        }
        Ok(changed)
    }

    pub fn remove_contact(&self, id: &str) -> Result<Option<EmergencyContact>> {
        let removed = self
            .contacts
            .remove_contact(id)
            .inspect_err(|e| self.report_contact_error(e))?;

        if let Some(contact) = &removed {
            self.notifier.notify(
                Notification::success("Contact removed")
                    .with_description(format!("{} has been removed.", contact.name)),
            );
        }
        Ok(removed)
    }

    fn report_contact_error(&self, error: &sos_contacts::ContactError) {
        tracing::warn!("contact update failed: {}", error);
        self.notifier.notify(
            Notification::error("Could not update contacts").with_description(error.to_string()),
        );
    }

    // Shake

    pub fn shake_enabled(&self) -> bool {
        self.preferences.shake_enabled()
    }

    pub fn set_shake_enabled(&self, enabled: bool) -> Result<()> {
        self.preferences.set_shake_enabled(enabled)?;
        tracing::info!(enabled, "shake trigger toggled");
        self.apply_shake_setting();
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.detector.is_enabled()
    }

    pub fn motion_permission(&self) -> PermissionState {
        self.detector.permission()
    }

    pub async fn request_motion_permission(&self) -> bool {
        let granted = self.detector.request_motion_permission().await;
        if granted {
            self.apply_shake_setting();
        }
        granted
    }

    fn apply_shake_setting(&self) {
        let wanted = self.is_onboarded() && self.shake_enabled();
        if wanted {
            if !self.detector.enable() {
                tracing::debug!("shake trigger wanted but detector could not start");
            }
        } else {
            self.detector.disable();
        }
    }

    // Activation

    pub fn trigger_manual(&self) -> TriggerOutcome {
        self.engine.trigger(TriggerSource::Manual)
    }

    pub fn cancel(&self) -> bool {
        self.engine.cancel_countdown()
    }

    pub fn state(&self) -> ActivationState {
        self.engine.state()
    }

    pub fn remaining_seconds(&self) -> Option<u32> {
        self.engine.remaining_seconds()
    }

    pub fn subscribe(&self) -> watch::Receiver<ActivationState> {
        self.engine.subscribe()
    }

    pub fn last_report(&self) -> Option<AlertReport> {
        self.engine.last_report()
    }

    /// Most recent alerts first. Empty when the session keeps no history.
    pub fn alert_history(&self, limit: usize) -> Result<Vec<AlertReport>> {
        match &self.alerts {
            Some(db) => Ok(db.recent_alerts(limit)?),
            None => Ok(Vec::new()),
        }
    }

    // Location

    pub fn location(&self) -> Option<Location> {
        self.location.location()
    }

    pub fn location_permission(&self) -> PermissionState {
        self.location.permission()
    }

    pub async fn refresh_location(&self) -> std::result::Result<Location, LocationError> {
        self.location.update_location().await
    }

    pub async fn request_location_permission(&self) -> bool {
        let granted = self.location.request_permission().await;
        self.sync_location_watcher();
        granted
    }

    fn sync_location_watcher(&self) {
        match self.config.location.refresh_interval() {
            Some(interval) if self.location.permission_granted() => {
                if !self.watcher.is_running() {
                    self.watcher.start(self.location.clone(), interval);
                }
            }
            _ => self.watcher.stop(),
        }
    }
}

impl std::fmt::Debug for SosSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SosSession")
            .field("config", &self.config)
            .field("contacts", &self.contacts.len())
            .field("engine", &self.engine)
            .field("detector", &self.detector)
            .finish_non_exhaustive()
    }
}

fn handle_shake(
    engine: &ActivationEngine,
    contacts: &ContactRegistry,
    notifier: &NotifierRef,
    event: ShakeEvent,
) {
    if engine.is_active() {
        tracing::debug!(magnitude = event.magnitude, "shake ignored, emergency already active");
        return;
    }

    if !contacts.is_empty() {
        notifier.notify(
            Notification::warning("Shake detected!")
                .with_description("Initiating emergency SOS..."),
        );
    }
    engine.trigger(TriggerSource::Shake);
}
