//! Sensor subscription lifecycle and shake delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use sos_events::{event_names, EventBusRef, PermissionState, ShakeDetectedEvent};
use tokio_util::sync::CancellationToken;

use crate::bus::{SampleBus, SampleBusConfig, SampleSender};
use crate::shake::{ShakeConfig, ShakeDetector, ShakeEvent};
use crate::MotionSensorRef;

/// Consumer of recognized shakes.
pub type ShakeCallback = Arc<dyn Fn(ShakeEvent) + Send + Sync + 'static>;

pub fn new_callback<F>(f: F) -> ShakeCallback
where
    F: Fn(ShakeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

type CallbackSlot = Arc<RwLock<Option<ShakeCallback>>>;

/// Owns the sensor subscription and the detection task.
pub struct MotionSignalDetector {
    sensor: MotionSensorRef,
    config: ShakeConfig,
    permission: RwLock<PermissionState>,
    callback: CallbackSlot,
    event_bus: Option<EventBusRef>,
    running: AtomicBool,
    cancel_token: Mutex<CancellationToken>,
    sender: Mutex<Option<SampleSender>>,
}

impl MotionSignalDetector {
    pub fn new(sensor: MotionSensorRef, config: ShakeConfig) -> Self {
        Self {
            sensor,
            config,
            permission: RwLock::new(PermissionState::Prompt),
            callback: Arc::new(RwLock::new(None)),
            event_bus: None,
            running: AtomicBool::new(false),
            cancel_token: Mutex::new(CancellationToken::new()),
            sender: Mutex::new(None),
        }
    }

    /// Also publish each shake on the event bus.
    pub fn with_event_bus(mut self, bus: EventBusRef) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Register the consumer, replacing any previous one.
    pub fn on_shake(&self, callback: ShakeCallback) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub fn clear_callback(&self) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn permission(&self) -> PermissionState {
        *self.permission.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the sensor boundary for motion access.
    ///
    /// A refusal is an expected answer: the detector stays disabled and no
    /// error is raised.
    pub async fn request_motion_permission(&self) -> bool {
        let granted = self.sensor.request_permission().await;
        *self.permission.write().unwrap_or_else(PoisonError::into_inner) =
            PermissionState::from_granted(granted);
        tracing::info!(granted, "motion permission answered");

        if !granted {
            self.disable();
        }
        granted
    }

    pub fn is_enabled(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Samples dropped by the current subscription because the bus was full.
    pub fn dropped_samples(&self) -> u64 {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(SampleSender::dropped_samples)
            .unwrap_or(0)
    }

    /// Subscribe to the sensor and start recognizing shakes.
    ///
    /// Returns whether the detector is listening afterwards. Must be called
    /// from within a tokio runtime.
    pub fn enable(&self) -> bool {
        if self.permission() == PermissionState::Denied {
            tracing::debug!("motion permission denied, detector stays disabled");
            return false;
        }
        if self.is_enabled() {
            return true;
        }

        let mut bus = SampleBus::with_config(SampleBusConfig {
            capacity: self.config.buffer_capacity,
        });
        let Some(mut receiver) = bus.take_receiver() else {
            return false;
        };
        let sender = bus.sender();

        if let Err(e) = self.sensor.start(sender.clone()) {
            tracing::warn!("motion sensor failed to start: {}", e);
            return false;
        }
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);

        let token = CancellationToken::new();
        let child = token.child_token();
        *self.cancel_token.lock().unwrap_or_else(PoisonError::into_inner) = token;
        self.running.store(true, Ordering::Release);

        let callback = Arc::clone(&self.callback);
        let event_bus = self.event_bus.clone();
        let mut detector = ShakeDetector::new(self.config);

        tokio::spawn(async move {
            tracing::info!(
                threshold = detector.config().threshold,
                "motion detector started"
            );

            loop {
                let sample = tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    sample = receiver.recv() => sample,
                };

                let Some(sample) = sample else {
                    tracing::info!("sample bus closed, stopping motion detector");
                    break;
                };

                if let Some(event) = detector.process(&sample) {
                    deliver(&callback, event_bus.as_ref(), event);
                }
            }

            tracing::info!(gaps = receiver.gaps_detected(), "motion detector stopped");
        });

        true
    }

    /// Unsubscribe from the sensor. Idempotent.
    pub fn disable(&self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        self.cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        if was_running {
            self.sensor.stop();
        }
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn deliver(callback: &CallbackSlot, event_bus: Option<&EventBusRef>, event: ShakeEvent) {
    if let Some(bus) = event_bus {
        let payload = ShakeDetectedEvent {
            magnitude: event.magnitude,
            peaks: event.peaks,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        };
        if let Ok(value) = serde_json::to_value(payload) {
            bus.emit(event_names::SHAKE_DETECTED, value);
        }
    }

    let consumer = callback
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    match consumer {
        Some(f) => f(event),
        None => tracing::debug!("shake dropped, no consumer registered"),
    }
}

impl Drop for MotionSignalDetector {
    fn drop(&mut self) {
        self.disable();
    }
}

impl std::fmt::Debug for MotionSignalDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionSignalDetector")
            .field("enabled", &self.is_enabled())
            .field("permission", &self.permission())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{AccelerationSample, MotionError, MotionSensor};
    use async_trait::async_trait;
    use sos_events::RecordingEventBus;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    /// Sensor that hands its sender to the test.
    #[derive(Default)]
    pub(crate) struct ManualSensor {
        pub deny: bool,
        pub sender: Mutex<Option<SampleSender>>,
        pub starts: AtomicUsize,
        pub stops: AtomicUsize,
    }

    impl ManualSensor {
        pub(crate) fn push(&self, sample: AccelerationSample) -> bool {
            self.sender
                .lock()
                .unwrap()
                .as_ref()
                .map(|s| s.send(sample))
                .unwrap_or(false)
        }
    }

    #[async_trait]
    impl MotionSensor for ManualSensor {
        async fn request_permission(&self) -> bool {
            !self.deny
        }

        fn start(&self, sender: SampleSender) -> Result<(), MotionError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.sender.lock().unwrap() = Some(sender);
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.sender.lock().unwrap().take();
        }
    }

    fn shake_burst(sensor: &ManualSensor, t0: Instant) {
        for i in 0..10 {
            sensor.push(AccelerationSample::new(
                25.0,
                0.0,
                9.8,
                t0 + Duration::from_millis(i * 16),
            ));
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_shake_invokes_callback_once() {
        let sensor = Arc::new(ManualSensor::default());
        let bus = Arc::new(RecordingEventBus::new());
        let detector = MotionSignalDetector::new(sensor.clone(), ShakeConfig::default())
            .with_event_bus(bus.clone());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        detector.on_shake(new_callback(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(detector.request_motion_permission().await);
        assert!(detector.enable());
        shake_burst(&sensor, Instant::now());
        settle().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.events_for(event_names::SHAKE_DETECTED).len(), 1);
    }

    #[tokio::test]
    async fn test_denied_permission_keeps_detector_disabled() {
        let sensor = Arc::new(ManualSensor {
            deny: true,
            ..Default::default()
        });
        let detector = MotionSignalDetector::new(sensor.clone(), ShakeConfig::default());

        assert!(!detector.request_motion_permission().await);
        assert_eq!(detector.permission(), PermissionState::Denied);
        assert!(!detector.enable());
        assert!(!detector.is_enabled());
        assert_eq!(sensor.starts.load(Ordering::SeqCst), 0);
        // Samples go nowhere.
        assert!(!sensor.push(AccelerationSample::new(30.0, 0.0, 0.0, Instant::now())));
    }

    #[tokio::test]
    async fn test_shake_without_consumer_is_dropped() {
        let sensor = Arc::new(ManualSensor::default());
        let detector = MotionSignalDetector::new(sensor.clone(), ShakeConfig::default());
        assert!(detector.enable());

        let t0 = Instant::now();
        shake_burst(&sensor, t0);
        settle().await;

        // Registering later does not replay the dropped shake.
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        detector.on_shake(new_callback(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enable_disable_lifecycle() {
        let sensor = Arc::new(ManualSensor::default());
        let detector = MotionSignalDetector::new(sensor.clone(), ShakeConfig::default());

        assert!(detector.enable());
        assert!(detector.enable());
        assert_eq!(sensor.starts.load(Ordering::SeqCst), 1);

        detector.disable();
        detector.disable();
        assert!(!detector.is_enabled());
        assert_eq!(sensor.stops.load(Ordering::SeqCst), 1);

        assert!(detector.enable());
        assert_eq!(sensor.starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_detector_ignores_samples() {
        let sensor = Arc::new(ManualSensor::default());
        let detector = MotionSignalDetector::new(sensor.clone(), ShakeConfig::default());
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        detector.on_shake(new_callback(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(detector.enable());
        detector.disable();
        shake_burst(&sensor, Instant::now());
        settle().await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
