//! Field slots and their growth state machine.
//!
//! A field is `Empty`, `Growing` (stage 1 to 3) or `Ripe`. Ripe is not a
//! separate flag: it is stage 3 with nothing left to grow.
use serde::{Deserialize, Serialize};

use crate::catalog::{PlantDef, PlantId};
use crate::constants::{STAGE_THREE_PROGRESS, STAGE_TWO_PROGRESS};
use crate::error::InvalidReason;
use crate::numbers::u64_to_f64;

/// Growth stage for a field given its remaining and total grow time.
///
/// Always derived from the final remaining time, so a large step passes
/// straight to stage 3 instead of advancing one stage per tick.
#[must_use]
pub fn stage_for(remaining_ms: u64, duration_ms: u64) -> u8 {
    if remaining_ms == 0 {
        return 3;
    }
    let progress = growth_progress(remaining_ms, duration_ms);
    if progress >= STAGE_THREE_PROGRESS {
        3
    } else if progress >= STAGE_TWO_PROGRESS {
        2
    } else {
        1
    }
}

/// Fraction of growth completed, in `[0, 1]`.
#[must_use]
pub fn growth_progress(remaining_ms: u64, duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        return 1.0;
    }
    (1.0 - u64_to_f64(remaining_ms.min(duration_ms)) / u64_to_f64(duration_ms)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Field {
    pub unlocked: bool,
    /// Bought with tokens; survives rebirth.
    pub permanent: bool,
    pub planted: Option<PlantId>,
    pub remaining_grow_ms: u64,
    /// Capped duration of the current crop, used for stage derivation.
    pub grow_duration_ms: u64,
    pub growth_stage: u8,
    pub planted_at_ms: u64,
}

impl Field {
    #[must_use]
    pub fn unlocked() -> Self {
        Self {
            unlocked: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn locked() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.planted.is_none()
    }

    #[must_use]
    pub const fn is_ripe(&self) -> bool {
        self.planted.is_some() && self.remaining_grow_ms == 0 && self.growth_stage == 3
    }

    #[must_use]
    pub const fn is_growing(&self) -> bool {
        self.planted.is_some() && self.remaining_grow_ms > 0
    }

    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        growth_progress(self.remaining_grow_ms, self.grow_duration_ms)
    }

    /// Whether a seed can go into this field right now.
    ///
    /// # Errors
    ///
    /// Rejects locked and occupied fields.
    pub const fn check_plantable(&self) -> Result<(), InvalidReason> {
        if !self.unlocked {
            return Err(InvalidReason::FieldLocked);
        }
        if self.planted.is_some() {
            return Err(InvalidReason::FieldOccupied);
        }
        Ok(())
    }

    /// Whether the crop can be harvested right now.
    ///
    /// # Errors
    ///
    /// Rejects locked, empty and still-growing fields.
    pub const fn check_harvestable(&self) -> Result<(), InvalidReason> {
        if !self.unlocked {
            return Err(InvalidReason::FieldLocked);
        }
        if self.planted.is_none() {
            return Err(InvalidReason::FieldEmpty);
        }
        if !self.is_ripe() {
            return Err(InvalidReason::NotRipe);
        }
        Ok(())
    }

    /// Put a crop in the ground. Callers validate with [`Self::check_plantable`] first.
    pub fn sow(&mut self, plant: &PlantDef, now_ms: u64) {
        let duration = plant.capped_grow_ms();
        self.planted = Some(plant.id.clone());
        self.grow_duration_ms = duration;
        self.remaining_grow_ms = duration;
        self.growth_stage = stage_for(duration, duration);
        self.planted_at_ms = now_ms;
    }

    /// Advance growth by `delta_ms`. Returns `true` when this step made the crop ripe.
    pub fn advance(&mut self, delta_ms: u64) -> bool {
        if !self.is_growing() {
            return false;
        }
        self.remaining_grow_ms = self.remaining_grow_ms.saturating_sub(delta_ms);
        self.growth_stage = stage_for(self.remaining_grow_ms, self.grow_duration_ms);
        self.remaining_grow_ms == 0
    }

    /// Empty the field after a harvest, keeping ownership flags.
    pub fn clear(&mut self) -> Option<PlantId> {
        let planted = self.planted.take();
        self.remaining_grow_ms = 0;
        self.grow_duration_ms = 0;
        self.growth_stage = 0;
        self.planted_at_ms = 0;
        planted
    }

    /// Repair fields loaded from storage so the empty/stage invariant holds.
    pub fn normalize(&mut self) {
        if self.planted.is_none() {
            self.clear();
            return;
        }
        if self.grow_duration_ms == 0 {
            self.grow_duration_ms = self.remaining_grow_ms;
        }
        self.growth_stage = stage_for(self.remaining_grow_ms, self.grow_duration_ms);
    }
}

/// Read-only view of one field for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldProgress {
    pub index: usize,
    pub unlocked: bool,
    pub plant: Option<PlantId>,
    pub stage: u8,
    pub remaining_ms: u64,
    pub progress: f64,
    pub ripe: bool,
    pub watered: bool,
    pub cooldown_remaining_ms: u64,
}
