//! Periodic timers on the single logical clock.
use serde::Serialize;

use crate::constants::{
    AUTO_HARVEST_INTERVAL_MS, AUTO_WATER_INTERVAL_MS, AUTOSAVE_INTERVAL_MS, TICK_MS,
    WORKER_TICK_MS,
};

/// The periodic callbacks a session runs. Declaration order breaks ties
/// between timers due at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Growth,
    AutoHarvest,
    AutoWater,
    Workers,
    Autosave,
}

impl TimerKind {
    pub const ALL: [Self; 5] = [
        Self::Growth,
        Self::AutoHarvest,
        Self::AutoWater,
        Self::Workers,
        Self::Autosave,
    ];

    #[must_use]
    pub const fn interval_ms(self) -> u64 {
        match self {
            Self::Growth => TICK_MS,
            Self::AutoHarvest => AUTO_HARVEST_INTERVAL_MS,
            Self::AutoWater => AUTO_WATER_INTERVAL_MS,
            Self::Workers => WORKER_TICK_MS,
            Self::Autosave => AUTOSAVE_INTERVAL_MS,
        }
    }

    /// Missed autosaves collapse into one; every other timer replays each period.
    const fn coalesces(self) -> bool {
        matches!(self, Self::Autosave)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicTimer {
    kind: TimerKind,
    next_due_ms: u64,
}

impl PeriodicTimer {
    /// A timer whose first firing is one interval after `start_ms`.
    #[must_use]
    pub const fn new(kind: TimerKind, start_ms: u64) -> Self {
        Self {
            kind,
            next_due_ms: start_ms.saturating_add(kind.interval_ms()),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> TimerKind {
        self.kind
    }

    #[must_use]
    pub const fn next_due_ms(&self) -> u64 {
        self.next_due_ms
    }

    #[must_use]
    pub const fn is_due(&self, now_ms: u64) -> bool {
        self.next_due_ms <= now_ms
    }

    /// Consume the current period and return its due time.
    fn fire(&mut self, now_ms: u64) -> u64 {
        let interval = self.kind.interval_ms().max(1);
        let due = self.next_due_ms;
        self.next_due_ms = due.saturating_add(interval);
        if self.kind.coalesces() && self.next_due_ms <= now_ms {
            let missed = (now_ms - self.next_due_ms) / interval + 1;
            self.next_due_ms = self
                .next_due_ms
                .saturating_add(missed.saturating_mul(interval));
        }
        due
    }
}

/// All session timers, drained in due-time order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduler {
    timers: Vec<PeriodicTimer>,
}

impl Scheduler {
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            timers: TimerKind::ALL
                .into_iter()
                .map(|kind| PeriodicTimer::new(kind, start_ms))
                .collect(),
        }
    }

    #[must_use]
    pub fn timer(&self, kind: TimerKind) -> Option<&PeriodicTimer> {
        self.timers.iter().find(|timer| timer.kind == kind)
    }

    /// Fire the earliest timer due at or before `now_ms`, returning its kind
    /// and the instant it was due.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TimerKind, u64)> {
        let timer = self
            .timers
            .iter_mut()
            .filter(|timer| timer.is_due(now_ms))
            .min_by_key(|timer| (timer.next_due_ms, timer.kind))?;
        Some((timer.kind, timer.fire(now_ms)))
    }
}
