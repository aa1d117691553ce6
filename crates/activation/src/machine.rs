//! Activation state machine.
//!
//! Pure domain logic: no timers, no I/O. The engine owns exactly one machine
//! and serializes every transition through it, which is what makes
//! cancel-versus-expiry resolve to whichever call is observed first.

use serde::{Deserialize, Serialize};

/// Identifies one countdown instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActivationId(pub u64);

impl std::fmt::Display for ActivationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the emergency flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ActivationState {
    #[default]
    Idle,
    Counting {
        #[serde(rename = "remainingSecs")]
        remaining_secs: u32,
    },
    Dispatching,
    Cancelled,
    Completed,
}

impl ActivationState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Counting { .. } => "counting",
            Self::Dispatching => "dispatching",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    /// A countdown or dispatch is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Counting { .. } | Self::Dispatching)
    }

    pub fn remaining_secs(&self) -> Option<u32> {
        match self {
            Self::Counting { remaining_secs } => Some(*remaining_secs),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Counting { remaining_secs } => write!(f, "counting({remaining_secs}s)"),
            other => f.write_str(other.label()),
        }
    }
}

/// Result of asking the machine to start a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new countdown began.
    Started(ActivationId),
    /// A countdown or dispatch was already running; nothing changed.
    AlreadyActive(ActivationId),
}

impl StartOutcome {
    pub fn activation(&self) -> ActivationId {
        match self {
            Self::Started(id) | Self::AlreadyActive(id) => *id,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

/// Result of one countdown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still counting with this many seconds left.
    Counting(u32),
    /// Reached zero; the machine is now dispatching.
    Expired,
    /// The tick belongs to a countdown that was cancelled or replaced.
    Stale,
}

/// The single activation state of a session.
#[derive(Debug, Default)]
pub struct ActivationMachine {
    state: ActivationState,
    current: ActivationId,
}

impl ActivationMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ActivationState {
        self.state
    }

    /// Most recent activation id (zero before the first countdown).
    pub fn current(&self) -> ActivationId {
        self.current
    }

    /// `Idle → Counting(duration)`. No-op while counting or dispatching.
    ///
    /// Durations below one second are raised to one so expiry always goes
    /// through a tick.
    pub fn start(&mut self, duration_secs: u32) -> StartOutcome {
        if self.state.is_active() {
            return StartOutcome::AlreadyActive(self.current);
        }

        self.current = ActivationId(self.current.0 + 1);
        self.state = ActivationState::Counting {
            remaining_secs: duration_secs.max(1),
        };
        StartOutcome::Started(self.current)
    }

    /// One countdown step for `id`.
    pub fn tick(&mut self, id: ActivationId) -> TickOutcome {
        if id != self.current {
            return TickOutcome::Stale;
        }
        let ActivationState::Counting { remaining_secs } = self.state else {
            return TickOutcome::Stale;
        };

        let remaining = remaining_secs.saturating_sub(1);
        if remaining == 0 {
            self.state = ActivationState::Dispatching;
            TickOutcome::Expired
        } else {
            self.state = ActivationState::Counting {
                remaining_secs: remaining,
            };
            TickOutcome::Counting(remaining)
        }
    }

    /// `Counting → Cancelled → Idle`.
    ///
    /// Returns the cancelled activation, or `None` when not counting.
    pub fn cancel(&mut self) -> Option<ActivationId> {
        if !matches!(self.state, ActivationState::Counting { .. }) {
            return None;
        }
        self.state = ActivationState::Idle;
        Some(self.current)
    }

    /// `Dispatching → Completed → Idle` for `id`.
    pub fn complete(&mut self, id: ActivationId) -> bool {
        if id != self.current || self.state != ActivationState::Dispatching {
            return false;
        }
        self.state = ActivationState::Idle;
        true
    }
}
