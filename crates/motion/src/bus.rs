//! Bounded sample channel between the sensor driver and the detector task.
//!
//! The sensor callback must never block, so the sender drops samples when
//! the buffer is full and counts them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::AccelerationSample;

/// Default channel capacity in samples (about one second at 60 Hz).
pub const DEFAULT_CAPACITY: usize = 64;

/// Sample with a sequence number for gap detection.
#[derive(Debug, Clone, Copy)]
pub struct SampleFrame {
    /// Monotonic sequence number for ordering.
    pub seq: u64,
    pub sample: AccelerationSample,
}

/// Configuration for the sample bus.
#[derive(Debug, Clone, Copy)]
pub struct SampleBusConfig {
    /// Channel capacity in samples.
    pub capacity: usize,
}

impl Default for SampleBusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Sender half of the sample bus.
#[derive(Clone)]
pub struct SampleSender {
    tx: mpsc::Sender<SampleFrame>,
    seq_counter: Arc<AtomicU64>,
    dropped_samples: Arc<AtomicU64>,
}

impl SampleSender {
    /// Send a sample, dropping it if the buffer is full.
    ///
    /// Returns true if sent, false if dropped or the bus is closed.
    pub fn send(&self, sample: AccelerationSample) -> bool {
        let seq = self.seq_counter.fetch_add(1, Ordering::Relaxed);

        match self.tx.try_send(SampleFrame { seq, sample }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped_samples.fetch_add(1, Ordering::Relaxed) + 1;
                // Rate-limit logging: only log every 50th drop to avoid spam
                if dropped % 50 == 1 {
                    tracing::warn!(dropped, seq, "Sample bus full, dropping samples");
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("Sample bus closed");
                false
            }
        }
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiver half of the sample bus.
pub struct SampleReceiver {
    rx: mpsc::Receiver<SampleFrame>,
    next_seq: u64,
    gaps_detected: u64,
}

impl SampleReceiver {
    /// Receive the next sample. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<AccelerationSample> {
        let frame = self.rx.recv().await?;

        if frame.seq > self.next_seq {
            let gap = frame.seq - self.next_seq;
            self.gaps_detected += gap;
            tracing::debug!(
                "Sample bus gap detected: {} samples missing (seq {} -> {})",
                gap,
                self.next_seq,
                frame.seq
            );
        }
        self.next_seq = frame.seq + 1;

        Some(frame.sample)
    }

    /// Number of samples lost between sender and receiver.
    pub fn gaps_detected(&self) -> u64 {
        self.gaps_detected
    }
}

/// Sample bus pairing one receiver with any number of senders.
pub struct SampleBus {
    sender: SampleSender,
    receiver: Option<SampleReceiver>,
}

impl SampleBus {
    pub fn new() -> Self {
        Self::with_config(SampleBusConfig::default())
    }

    pub fn with_config(config: SampleBusConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));

        Self {
            sender: SampleSender {
                tx,
                seq_counter: Arc::new(AtomicU64::new(0)),
                dropped_samples: Arc::new(AtomicU64::new(0)),
            },
            receiver: Some(SampleReceiver {
                rx,
                next_seq: 0,
                gaps_detected: 0,
            }),
        }
    }

    /// Get a clone of the sender.
    pub fn sender(&self) -> SampleSender {
        self.sender.clone()
    }

    /// Take the receiver (can only be called once).
    pub fn take_receiver(&mut self) -> Option<SampleReceiver> {
        self.receiver.take()
    }
}

impl Default for SampleBus {
    fn default() -> Self {
        Self::new()
    }
}
