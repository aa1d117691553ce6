//! Publishing side of the SOS core.
//!
//! The engine, detector and session never talk to a UI directly. They push
//! `sos:*` topics with JSON payloads into an [`EventBus`], and whatever hosts
//! the core decides what to do with them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub trait EventBus: Send + Sync {
    /// Publish `payload` under `topic`, for example `sos:countdown_tick`.
    ///
    /// Must not block; the engine calls this from its countdown task.
    fn emit(&self, topic: &str, payload: serde_json::Value);
}

pub type EventBusRef = Arc<dyn EventBus>;

/// Keeps every published event in order so tests can assert on the
/// sequence a scenario produced.
#[derive(Default)]
pub struct RecordingEventBus {
    recorded: Mutex<Vec<RecordedEvent>>,
}

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.recorded().clone()
    }

    /// Recorded events whose topic equals `topic`, oldest first.
    pub fn events_for(&self, topic: &str) -> Vec<RecordedEvent> {
        self.recorded()
            .iter()
            .filter(|e| e.topic == topic)
            .cloned()
            .collect()
    }

    /// Each topic once, ordered by its first appearance.
    pub fn topics(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for event in self.recorded().iter() {
            if !seen.contains(&event.topic) {
                seen.push(event.topic.clone());
            }
        }
        seen
    }

    pub fn clear(&self) {
        self.recorded().clear();
    }

    pub fn len(&self) -> usize {
        self.recorded().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded().is_empty()
    }

    fn recorded(&self) -> MutexGuard<'_, Vec<RecordedEvent>> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventBus for RecordingEventBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        self.recorded().push(RecordedEvent {
            topic: topic.to_string(),
            payload,
        });
    }
}

/// Drops events after a trace line. For hosts with nothing to render.
pub struct TracingEventBus;

impl EventBus for TracingEventBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        tracing::trace!(topic, %payload, "sos event");
    }
}
