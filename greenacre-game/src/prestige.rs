//! Rebirth: cost and token curves, bulk options, milestones and the reset partition.
use serde::Serialize;

use crate::automation::enforce_availability;
use crate::catalog::{Catalog, MilestoneKey, ShopTrack};
use crate::constants::{
    BASE_START_FIELDS, BASE_STARTING_CURRENCY, REBIRTH_BASE_COST, REBIRTH_COST_GROWTH,
};
use crate::error::{ActionResult, Currency, InvalidReason, require_funds};
use crate::field::Field;
use crate::numbers::{floor_f64_to_u64, u64_to_f64};
use crate::state::{PlayerState, field_layout};

/// Coins needed to rebirth from `prestige_count`.
#[must_use]
pub fn rebirth_cost(prestige_count: u32) -> u64 {
    let exponent = i32::try_from(prestige_count).unwrap_or(i32::MAX);
    floor_f64_to_u64(u64_to_f64(REBIRTH_BASE_COST) * REBIRTH_COST_GROWTH.powi(exponent))
}

/// Tokens for a single rebirth performed at `prestige_count`, from the catalog bands.
#[must_use]
pub fn token_reward(catalog: &Catalog, prestige_count: u32) -> u64 {
    catalog
        .token_bands
        .iter()
        .rev()
        .find(|band| band.min_prestige <= prestige_count)
        .map_or(0, |band| band.tokens)
}

#[must_use]
pub fn has_milestone(catalog: &Catalog, prestige_count: u32, key: MilestoneKey) -> bool {
    catalog
        .milestone_threshold(key)
        .is_some_and(|threshold| prestige_count >= threshold)
}

/// Milestones whose threshold lies in `(old, new]`, in table order.
#[must_use]
pub fn crossed_milestones(catalog: &Catalog, old_count: u32, new_count: u32) -> Vec<MilestoneKey> {
    catalog
        .milestones
        .iter()
        .filter(|m| m.threshold > old_count && m.threshold <= new_count)
        .map(|m| m.key)
        .collect()
}

/// Coins a run starts with: the best reached starter-funds milestone, else the base.
#[must_use]
pub fn starting_currency(catalog: &Catalog, prestige_count: u32) -> u64 {
    catalog
        .milestones
        .iter()
        .filter(|m| m.threshold <= prestige_count)
        .filter_map(|m| m.starting_currency)
        .max()
        .map_or(BASE_STARTING_CURRENCY, |coins| coins.max(BASE_STARTING_CURRENCY))
}

/// Field growth speed from growth-boost milestones; the highest reached applies.
#[must_use]
pub fn growth_multiplier(catalog: &Catalog, prestige_count: u32) -> f64 {
    catalog
        .milestones
        .iter()
        .filter(|m| m.threshold <= prestige_count)
        .filter_map(|m| m.growth_multiplier)
        .fold(1.0, f64::max)
}

/// Unlocked fields at the start of a run.
#[must_use]
pub fn starting_field_count(extra_fields_tier: u32, permanent_fields: usize) -> usize {
    BASE_START_FIELDS
        .saturating_add(usize::try_from(extra_fields_tier).unwrap_or(usize::MAX))
        .saturating_add(permanent_fields)
}

/// A priced rebirth, single or bulk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrestigePlan {
    pub steps: u32,
    pub from_count: u32,
    pub cost: u64,
    pub tokens: u64,
}

/// Price a rebirth of `steps` levels from the current count.
///
/// # Errors
///
/// Rejects zero steps, unknown bulk options and bulk options below their minimum count.
pub fn plan_prestige(
    catalog: &Catalog,
    prestige_count: u32,
    steps: u32,
) -> ActionResult<PrestigePlan> {
    if steps == 0 {
        return Err(InvalidReason::ZeroAmount.into());
    }
    let base_cost = rebirth_cost(prestige_count);
    if steps == 1 {
        return Ok(PrestigePlan {
            steps,
            from_count: prestige_count,
            cost: base_cost,
            tokens: token_reward(catalog, prestige_count),
        });
    }
    let option = catalog.bulk_option(steps)?;
    if prestige_count < option.min_prestige {
        return Err(InvalidReason::BulkPrestigeLocked.into());
    }
    let earned: u64 = (0..steps)
        .map(|i| token_reward(catalog, prestige_count.saturating_add(i)))
        .sum();
    Ok(PrestigePlan {
        steps,
        from_count: prestige_count,
        cost: floor_f64_to_u64(u64_to_f64(base_cost) * option.cost_multiplier),
        tokens: floor_f64_to_u64(option.token_penalty * u64_to_f64(earned)),
    })
}

/// What a rebirth would do, computed without touching the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrestigePreview {
    pub plan: PrestigePlan,
    pub affordable: bool,
    /// Coins still missing; 0 when affordable.
    pub shortfall: u64,
    pub starting_currency: u64,
    pub starting_fields: usize,
    pub milestones: Vec<MilestoneKey>,
}

/// Price a rebirth against the current balance and describe the next run.
///
/// # Errors
///
/// Rejects when [`plan_prestige`] does.
pub fn preview_prestige(
    catalog: &Catalog,
    state: &PlayerState,
    steps: u32,
) -> ActionResult<PrestigePreview> {
    let plan = plan_prestige(catalog, state.prestige_count, steps)?;
    let new_count = state.prestige_count.saturating_add(steps);
    Ok(PrestigePreview {
        plan,
        affordable: state.currency >= plan.cost,
        shortfall: plan.cost.saturating_sub(state.currency),
        starting_currency: starting_currency(catalog, new_count),
        starting_fields: starting_field_count(
            state.shop_level(ShopTrack::ExtraFields),
            state.permanent_field_count(),
        ),
        milestones: crossed_milestones(catalog, state.prestige_count, new_count),
    })
}

/// What a completed rebirth changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrestigeOutcome {
    pub plan: PrestigePlan,
    pub prestige_count: u32,
    pub tokens_earned: u64,
    pub prestige_tokens: u64,
    pub currency: u64,
    pub unlocked_fields: usize,
    /// Every milestone crossed by this rebirth.
    pub milestones: Vec<MilestoneKey>,
    /// Milestones to announce; empty when popups are switched off.
    pub popups: Vec<MilestoneKey>,
}

/// Rebirth in place.
///
/// Resets the run (coins, non-permanent fields, seeds, harvest inventory,
/// active event, coin-bought automation) and keeps everything else.
///
/// # Errors
///
/// Rejects when [`plan_prestige`] does or when the current balance is below the plan's cost.
pub fn apply_prestige(
    catalog: &Catalog,
    state: &mut PlayerState,
    steps: u32,
    popups_enabled: bool,
) -> ActionResult<PrestigeOutcome> {
    let plan = plan_prestige(catalog, state.prestige_count, steps)?;
    require_funds(Currency::Coins, plan.cost, state.currency)?;

    let old_count = state.prestige_count;
    let new_count = old_count.saturating_add(steps);

    let kept: Vec<Field> = state.fields.iter().filter(|f| f.permanent).cloned().collect();
    let unlocked = starting_field_count(state.shop_level(ShopTrack::ExtraFields), kept.len());

    state.prestige_count = new_count;
    state.prestige_tokens = state.prestige_tokens.saturating_add(plan.tokens);
    state.currency = starting_currency(catalog, new_count);
    state.fields = field_layout(kept, unlocked);
    state.fields_purchased = 0;
    state.seed_inventory.clear();
    state.harvested.clear();
    state.active_event = None;
    state.automation.run_unlocks.clear();
    enforce_availability(catalog, state);
    state.lifetime.total_rebirths = state.lifetime.total_rebirths.saturating_add(u64::from(steps));

    let milestones = crossed_milestones(catalog, old_count, new_count);
    let mut popups = Vec::new();
    for key in &milestones {
        if state.milestones_seen.insert(*key) && popups_enabled {
            popups.push(*key);
        }
        log::info!("milestone reached: {key:?}");
    }
    log::info!(
        "rebirth {old_count} -> {new_count}: paid {} coins, earned {} tokens",
        plan.cost,
        plan.tokens
    );

    Ok(PrestigeOutcome {
        plan,
        prestige_count: new_count,
        tokens_earned: plan.tokens,
        prestige_tokens: state.prestige_tokens,
        currency: state.currency,
        unlocked_fields: state.unlocked_field_count(),
        milestones,
        popups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::standard;
    use crate::error::Rejection;

    #[test]
    fn cost_curve_matches_known_points() {
        assert_eq!(rebirth_cost(0), 50_000);
        assert_eq!(rebirth_cost(1), 67_500);
        assert!(rebirth_cost(10) > rebirth_cost(9));
    }

    #[test]
    fn token_bands_are_stepped() {
        let catalog = standard();
        let rewards: Vec<u64> = [0, 4, 5, 9, 10, 19, 20, 34, 35, 100]
            .into_iter()
            .map(|n| token_reward(catalog, n))
            .collect();
        assert_eq!(rewards, vec![1, 1, 2, 2, 3, 3, 5, 5, 8, 8]);
    }

    #[test]
    fn bulk_plan_uses_current_cost_and_penalty() {
        let catalog = standard();
        let plan = plan_prestige(catalog, 10, 5).unwrap();
        assert_eq!(plan.cost, rebirth_cost(10) * 6);
        // 5 rebirths at 3 tokens each, times 0.8.
        assert_eq!(plan.tokens, 12);
        assert_eq!(
            plan_prestige(catalog, 9, 5).unwrap_err(),
            Rejection::from(InvalidReason::BulkPrestigeLocked)
        );
        assert!(plan_prestige(catalog, 30, 3).unwrap_err().is_not_found());
    }

    #[test]
    fn milestone_helpers() {
        let catalog = standard();
        assert!(!has_milestone(catalog, 1, MilestoneKey::AutoHarvest));
        assert!(has_milestone(catalog, 2, MilestoneKey::AutoHarvest));
        assert_eq!(
            crossed_milestones(catalog, 1, 4),
            vec![MilestoneKey::AutoHarvest, MilestoneKey::Farmhands, MilestoneKey::AutoSell]
        );
        assert_eq!(starting_currency(catalog, 0), BASE_STARTING_CURRENCY);
        assert_eq!(starting_currency(catalog, 1), 1_000);
        assert_eq!(starting_currency(catalog, 7), 10_000);
        assert!((growth_multiplier(catalog, 7) - 1.0).abs() < f64::EPSILON);
        assert!((growth_multiplier(catalog, 8) - 1.25).abs() < f64::EPSILON);
        assert!((growth_multiplier(catalog, 20) - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn preview_reports_shortfall_and_next_run() {
        let catalog = standard();
        let mut state = PlayerState::fresh(0);
        state.fields[0].permanent = true;
        state.shop_upgrades.insert(ShopTrack::ExtraFields, 2);
        let before = state.clone();
        let preview = preview_prestige(catalog, &state, 1).unwrap();
        assert!(!preview.affordable);
        assert_eq!(preview.shortfall, 49_950);
        assert_eq!(preview.starting_currency, 1_000);
        assert_eq!(preview.starting_fields, 6);
        assert_eq!(preview.milestones, vec![MilestoneKey::StarterFundsI]);
        assert_eq!(state, before);
    }

    #[test]
    fn short_balance_leaves_state_untouched() {
        let catalog = standard();
        let mut state = PlayerState::fresh(0);
        state.currency = 49_999;
        let before = state.clone();
        assert!(matches!(
            apply_prestige(catalog, &mut state, 1, true),
            Err(Rejection::InsufficientFunds { required: 50_000, .. })
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn popups_respect_opt_out_and_seen_set() {
        let catalog = standard();
        let mut state = PlayerState::fresh(0);
        state.currency = 50_000;
        let outcome = apply_prestige(catalog, &mut state, 1, false).unwrap();
        assert_eq!(outcome.milestones, vec![MilestoneKey::StarterFundsI]);
        assert!(outcome.popups.is_empty());
        assert!(state.milestones_seen.contains(&MilestoneKey::StarterFundsI));
        assert_eq!(outcome.currency, 1_000);
        assert_eq!(outcome.tokens_earned, 1);
    }
}
