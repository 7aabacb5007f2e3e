//! RLC Timers
//!
//! Timers are deadlines, not callbacks. A bearer exposes the earliest armed
//! deadline, its driver injects the matching [`TimerExpiry`] back into the
//! bearer's event stream, and an expiry whose generation no longer matches
//! (the timer was stopped or restarted meanwhile) is ignored.

use serde::Serialize;
use std::fmt;

/// Logical time in milliseconds since the bearer's epoch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RlcInstant(pub u64);

impl RlcInstant {
    pub const ZERO: RlcInstant = RlcInstant(0);

    pub fn from_millis(ms: u64) -> Self {
        RlcInstant(ms)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Instant `ms` milliseconds later
    pub fn after(&self, ms: u64) -> Self {
        RlcInstant(self.0.saturating_add(ms))
    }
}

impl fmt::Display for RlcInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Timers of TS 38.322 Section 7.3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    PollRetransmit,
    Reassembly,
    StatusProhibit,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerKind::PollRetransmit => "t-PollRetransmit",
            TimerKind::Reassembly => "t-Reassembly",
            TimerKind::StatusProhibit => "t-StatusProhibit",
        };
        write!(f, "{}", name)
    }
}

/// Expiry event for one arming of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerExpiry {
    pub kind: TimerKind,
    pub generation: u64,
}

/// A restartable one-shot timer
#[derive(Debug, Clone)]
pub struct RlcTimer {
    kind: TimerKind,
    duration_ms: Option<u64>,
    deadline: Option<RlcInstant>,
    generation: u64,
}

impl RlcTimer {
    /// Create a stopped timer; `None` duration means the timer never runs
    pub fn new(kind: TimerKind, duration_ms: Option<u64>) -> Self {
        Self {
            kind,
            duration_ms,
            deadline: None,
            generation: 0,
        }
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// (Re)start the timer at `now`; returns false when it is disabled
    pub fn start(&mut self, now: RlcInstant) -> bool {
        let Some(duration) = self.duration_ms else {
            return false;
        };
        self.generation += 1;
        self.deadline = Some(now.after(duration));
        true
    }

    /// Stop the timer, invalidating any expiry already in flight
    pub fn stop(&mut self) {
        if self.deadline.take().is_some() {
            self.generation += 1;
        }
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<RlcInstant> {
        self.deadline
    }

    /// Deadline and expiry event of the current arming
    pub fn armed(&self) -> Option<(RlcInstant, TimerExpiry)> {
        self.deadline.map(|deadline| {
            (deadline, TimerExpiry { kind: self.kind, generation: self.generation })
        })
    }

    /// Consume `expiry` if it belongs to the current arming
    pub fn try_expire(&mut self, expiry: TimerExpiry) -> bool {
        if expiry.kind != self.kind || expiry.generation != self.generation || self.deadline.is_none() {
            return false;
        }
        self.deadline = None;
        true
    }
}
