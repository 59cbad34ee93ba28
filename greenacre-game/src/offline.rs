//! Catch-up growth for the time the game was closed.
use serde::Serialize;

use crate::catalog::ShopTrack;
use crate::constants::{
    BASE_OFFLINE_EFFICIENCY, MAX_OFFLINE_HOURS, MS_PER_HOUR, OFFLINE_TIER_STEP,
};
use crate::numbers::{scale_ms, u32_to_f64};
use crate::state::PlayerState;

/// Welcome-back summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OfflineReport {
    /// Wall-clock time since the last save.
    pub away_ms: u64,
    /// Away time after the cap.
    pub elapsed_ms: u64,
    /// Growth actually applied after efficiency.
    pub effective_ms: u64,
    pub efficiency: f64,
    pub capped: bool,
    /// Fields that finished growing during the catch-up.
    pub fields_ripened: usize,
}

#[must_use]
pub const fn max_offline_ms() -> u64 {
    MAX_OFFLINE_HOURS * MS_PER_HOUR
}

/// `min(1, 0.5 + 0.1 × tier)`.
#[must_use]
pub fn offline_efficiency(tier: u32) -> f64 {
    (BASE_OFFLINE_EFFICIENCY + OFFLINE_TIER_STEP * u32_to_f64(tier)).min(1.0)
}

/// Fast-forward growing fields by the capped, efficiency-scaled away time.
///
/// Watering is not replayed and worker jobs need nothing: they compare
/// against wall-clock timestamps.
pub fn reconcile(state: &mut PlayerState, now_ms: u64) -> OfflineReport {
    let away_ms = now_ms.saturating_sub(state.last_saved_at_ms);
    let elapsed_ms = away_ms.min(max_offline_ms());
    let efficiency = offline_efficiency(state.shop_level(ShopTrack::OfflineEfficiency));
    let effective_ms = scale_ms(elapsed_ms, efficiency);

    let mut fields_ripened = 0;
    if effective_ms > 0 {
        for field in state.fields.iter_mut().filter(|f| f.unlocked) {
            if field.advance(effective_ms) {
                fields_ripened += 1;
            }
        }
    }

    let report = OfflineReport {
        away_ms,
        elapsed_ms,
        effective_ms,
        efficiency,
        capped: away_ms > elapsed_ms,
        fields_ripened,
    };
    log::info!(
        "offline for {away_ms} ms: applied {effective_ms} ms of growth, {fields_ripened} fields ripened"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::standard;

    #[test]
    fn efficiency_caps_at_one() {
        assert!((offline_efficiency(0) - 0.5).abs() < f64::EPSILON);
        assert!((offline_efficiency(3) - 0.8).abs() < 1e-12);
        assert!((offline_efficiency(5) - 1.0).abs() < f64::EPSILON);
        assert!((offline_efficiency(9) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn long_absence_is_capped() {
        let catalog = standard();
        let hour = MS_PER_HOUR;
        let mut state = PlayerState::fresh(0);
        state.fields[0].sow(catalog.plant("starfruit").unwrap(), 0);
        state.fields[1].sow(catalog.plant("elder_oak").unwrap(), 0);
        state.last_saved_at_ms = 0;

        let report = reconcile(&mut state, 100 * hour);
        assert!(report.capped);
        assert_eq!(report.elapsed_ms, 12 * hour);
        assert_eq!(report.effective_ms, 6 * hour);
        assert_eq!(report.fields_ripened, 2);
        assert!(state.fields[0].is_ripe());
    }

    #[test]
    fn short_absence_advances_partially() {
        let catalog = standard();
        let mut state = PlayerState::fresh(0);
        state.fields[0].sow(catalog.plant("carrot").unwrap(), 0);
        state.last_saved_at_ms = 10_000;

        let report = reconcile(&mut state, 50_000);
        assert!(!report.capped);
        assert_eq!(report.effective_ms, 20_000);
        assert_eq!(report.fields_ripened, 0);
        assert_eq!(state.fields[0].remaining_grow_ms, 40_000);
        assert_eq!(state.fields[0].growth_stage, 2);
    }

    #[test]
    fn clock_skew_applies_nothing() {
        let mut state = PlayerState::fresh(5_000);
        let report = reconcile(&mut state, 1_000);
        assert_eq!(report.elapsed_ms, 0);
        assert_eq!(report.fields_ripened, 0);
    }
}
