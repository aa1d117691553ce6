//! Example: Simulate a shake-triggered emergency end to end.
//!
//! Run with: cargo run -p sos-session --example simulate
//!
//! Set `SOS_DB=/path/to/sos.db` to keep preferences and history between runs.

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sos_activation::LogDispatcher;
use sos_contacts::NewContact;
use sos_events::EventBus;
use sos_location::{Geolocator, Location, LocationError};
use sos_motion::{AccelerationSample, MotionError, MotionSensor, SampleSender};
use sos_session::{SessionDeps, SosSession};
use sos_storage::Database;
use tracing_subscriber::EnvFilter;

/// Prints every event the session publishes.
struct PrintBus;

impl EventBus for PrintBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        let elapsed = START.get_or_init(Instant::now).elapsed();
        println!("[{:>6.2}s] {:22} {}", elapsed.as_secs_f64(), topic, payload);
    }
}

static START: OnceLock<Instant> = OnceLock::new();

/// Sensor driven by [`SimulatedSensor::shake`].
#[derive(Default)]
struct SimulatedSensor {
    sender: Mutex<Option<SampleSender>>,
}

impl SimulatedSensor {
    fn shake(&self) {
        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = guard.as_ref() else {
            println!("sensor not subscribed, shake ignored");
            return;
        };
        let t0 = Instant::now();
        for i in 0..12 {
            let x = if i % 2 == 0 { 22.0 } else { -22.0 };
            sender.send(AccelerationSample::new(
                x,
                3.0,
                9.8,
                t0 + Duration::from_millis(i * 20),
            ));
        }
    }
}

#[async_trait]
impl MotionSensor for SimulatedSensor {
    async fn request_permission(&self) -> bool {
        true
    }

    fn start(&self, sender: SampleSender) -> Result<(), MotionError> {
        *self.sender.lock().unwrap_or_else(|e| e.into_inner()) = Some(sender);
        Ok(())
    }

    fn stop(&self) {
        self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

struct FixedGeolocator;

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn request_permission(&self) -> bool {
        true
    }

    async fn current_position(&self) -> Result<Location, LocationError> {
        Ok(Location::new(41.3874, 2.1686).with_accuracy(15.0))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sos_session=debug,sos_activation=debug")),
        )
        .init();

    let db = Arc::new(match std::env::var_os("SOS_DB") {
        Some(path) => Database::open(Path::new(&path))?,
        None => Database::open_in_memory()?,
    });
    let sensor = Arc::new(SimulatedSensor::default());
    START.get_or_init(Instant::now);

    let session = SosSession::new(SessionDeps {
        store: db.clone(),
        geolocator: Arc::new(FixedGeolocator),
        sensor: sensor.clone(),
        dispatcher: Arc::new(LogDispatcher),
        event_bus: Arc::new(PrintBus),
        alert_repository: Some(db),
    })?;

    println!("=== Emergency SOS Simulation ===\n");

    if !session.is_onboarded() {
        session.complete_onboarding("Alex")?;
    }
    if session.contacts().is_empty() {
        session.add_contact(NewContact::new("Sam", "+34 600 000 001").relationship("partner"))?;
        session.add_contact(NewContact::new("Robin", "+34 600 000 002"))?;
    }

    session.request_location_permission().await;
    session.request_motion_permission().await;
    session.start();

    println!("\nShaking the phone...\n");
    sensor.shake();

    let countdown = Duration::from_secs(u64::from(session.config().countdown.duration_secs));
    tokio::time::sleep(countdown + Duration::from_secs(1)).await;

    println!("\nAlert history:");
    for report in session.alert_history(5)? {
        println!(
            "  {} | delivered {} / failed {} | {}",
            report.alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
            report.delivered(),
            report.failed(),
            report.alert.maps_url().unwrap_or_else(|| "no location".into())
        );
    }

    session.shutdown();
    println!("\nDone.");
    Ok(())
}
