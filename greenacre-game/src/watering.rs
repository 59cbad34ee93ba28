//! Watering boosts. All of this state is ephemeral: it lives on the engine
//! instance and is empty after every load.
use std::collections::BTreeMap;

use crate::constants::{WATER_CHAIN_MAX_STEPS, WATER_CHAIN_STEP_MS, WATER_CHAIN_WINDOW_MS};
use crate::error::InvalidReason;

/// Effect of one watering, resolved from the upgrade tracks at watering time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterProfile {
    pub multiplier: f64,
    pub duration_ms: u64,
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct WaterTimer {
    boost_until_ms: u64,
    multiplier: f64,
    ready_at_ms: u64,
}

/// Throttle on rapid manual watering: each watering inside the window adds
/// a step of extra delay before the next one is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaterChain {
    last_at_ms: Option<u64>,
    streak: u32,
}

impl WaterChain {
    #[must_use]
    pub const fn streak(&self) -> u32 {
        self.streak
    }

    /// Extra delay currently imposed after the last watering.
    #[must_use]
    pub fn extra_delay_ms(&self) -> u64 {
        u64::from(self.streak) * WATER_CHAIN_STEP_MS
    }

    /// # Errors
    ///
    /// Returns [`InvalidReason::WaterThrottled`] while the chain delay is running.
    pub fn check(&self, now_ms: u64) -> Result<(), InvalidReason> {
        match self.last_at_ms {
            Some(last) if now_ms < last.saturating_add(self.extra_delay_ms()) => {
                Err(InvalidReason::WaterThrottled)
            }
            _ => Ok(()),
        }
    }

    pub fn record(&mut self, now_ms: u64) {
        let chained = self
            .last_at_ms
            .is_some_and(|last| now_ms.saturating_sub(last) <= WATER_CHAIN_WINDOW_MS);
        self.streak = if chained {
            (self.streak + 1).min(WATER_CHAIN_MAX_STEPS)
        } else {
            0
        };
        self.last_at_ms = Some(now_ms);
    }
}

/// Per-field boosts and cooldowns plus the manual chain throttle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WateringState {
    timers: BTreeMap<usize, WaterTimer>,
    chain: WaterChain,
}

impl WateringState {
    #[must_use]
    pub fn is_watered(&self, field: usize, now_ms: u64) -> bool {
        self.timers
            .get(&field)
            .is_some_and(|timer| now_ms < timer.boost_until_ms)
    }

    #[must_use]
    pub fn is_cooling_down(&self, field: usize, now_ms: u64) -> bool {
        self.timers
            .get(&field)
            .is_some_and(|timer| now_ms >= timer.boost_until_ms && now_ms < timer.ready_at_ms)
    }

    /// Milliseconds until the field can be watered again, 0 when ready.
    #[must_use]
    pub fn cooldown_remaining_ms(&self, field: usize, now_ms: u64) -> u64 {
        self.timers
            .get(&field)
            .map_or(0, |timer| timer.ready_at_ms.saturating_sub(now_ms))
    }

    /// Growth multiplier from watering for this field, 1.0 when dry.
    #[must_use]
    pub fn speed_multiplier(&self, field: usize, now_ms: u64) -> f64 {
        match self.timers.get(&field) {
            Some(timer) if now_ms < timer.boost_until_ms => timer.multiplier,
            _ => 1.0,
        }
    }

    /// Field-level checks shared by manual and automated watering.
    ///
    /// # Errors
    ///
    /// Rejects fields that are boosted or cooling down.
    pub fn check_field(&self, field: usize, now_ms: u64) -> Result<(), InvalidReason> {
        if self.is_watered(field, now_ms) {
            return Err(InvalidReason::AlreadyWatered);
        }
        if self.is_cooling_down(field, now_ms) {
            return Err(InvalidReason::WaterCooldown);
        }
        Ok(())
    }

    #[must_use]
    pub const fn chain(&self) -> &WaterChain {
        &self.chain
    }

    /// Start a boost on a field. `manual` waterings feed the chain throttle.
    pub fn apply(&mut self, field: usize, profile: WaterProfile, now_ms: u64, manual: bool) {
        let boost_until_ms = now_ms.saturating_add(profile.duration_ms);
        self.timers.insert(
            field,
            WaterTimer {
                boost_until_ms,
                multiplier: profile.multiplier,
                ready_at_ms: boost_until_ms.saturating_add(profile.cooldown_ms),
            },
        );
        if manual {
            self.chain.record(now_ms);
        }
    }

    /// End a field's boost early (its crop was harvested); the cooldown still runs.
    pub fn end_boost(&mut self, field: usize, now_ms: u64) {
        if let Some(timer) = self.timers.get_mut(&field)
            && now_ms < timer.boost_until_ms
        {
            let shortened = timer.boost_until_ms - now_ms;
            timer.boost_until_ms = now_ms;
            timer.ready_at_ms = timer.ready_at_ms.saturating_sub(shortened);
        }
    }

    /// Drop timers whose cooldown has fully elapsed.
    pub fn prune(&mut self, now_ms: u64) {
        self.timers.retain(|_, timer| now_ms < timer.ready_at_ms);
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.timers.is_empty()
    }
}
