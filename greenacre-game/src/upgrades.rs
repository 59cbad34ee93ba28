//! Upgrade track purchases and the effects they resolve to.
use serde::Serialize;

use crate::catalog::{Catalog, ShopTrack, WaterTrack};
use crate::error::{ActionResult, Currency, InvalidReason, NotFound, require_funds};
use crate::numbers::floor_f64_to_u64;
use crate::state::PlayerState;
use crate::watering::WaterProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpgradePurchase {
    pub level: u32,
    pub cost: u64,
    pub currency: Currency,
    pub balance: u64,
}

/// Buy the next level of a coin-priced watering track.
///
/// # Errors
///
/// Rejects maxed tracks and short balances.
pub fn buy_water_upgrade(
    catalog: &Catalog,
    state: &mut PlayerState,
    track: WaterTrack,
) -> ActionResult<UpgradePurchase> {
    let def = catalog.water_track(track)?;
    let level = state.water_level(track);
    let cost = def.next_cost(level).ok_or(InvalidReason::MaxLevel)?;
    require_funds(Currency::Coins, cost, state.currency)?;
    state.currency -= cost;
    state.water_upgrades.insert(track, level + 1);
    log::debug!("{} -> level {} for {cost} coins", track.key(), level + 1);
    Ok(UpgradePurchase {
        level: level + 1,
        cost,
        currency: Currency::Coins,
        balance: state.currency,
    })
}

/// Buy the next level of a token-priced prestige shop track.
///
/// # Errors
///
/// Rejects maxed tracks and short token balances.
pub fn buy_shop_upgrade(
    catalog: &Catalog,
    state: &mut PlayerState,
    track: ShopTrack,
) -> ActionResult<UpgradePurchase> {
    let def = catalog.shop_track(track)?;
    let level = state.shop_level(track);
    let cost = def.next_cost(level).ok_or(InvalidReason::MaxLevel)?;
    require_funds(Currency::Tokens, cost, state.prestige_tokens)?;
    state.prestige_tokens -= cost;
    state.shop_upgrades.insert(track, level + 1);
    log::debug!("{} -> level {} for {cost} tokens", track.key(), level + 1);
    Ok(UpgradePurchase {
        level: level + 1,
        cost,
        currency: Currency::Tokens,
        balance: state.prestige_tokens,
    })
}

/// Watering effect at the player's current levels.
///
/// # Errors
///
/// Returns [`NotFound::Track`] if the catalog lacks a watering track.
pub fn water_profile(catalog: &Catalog, state: &PlayerState) -> Result<WaterProfile, NotFound> {
    let effect = |track: WaterTrack| -> Result<f64, NotFound> {
        Ok(catalog
            .water_track(track)?
            .effect_at(state.water_level(track)))
    };
    Ok(WaterProfile {
        multiplier: effect(WaterTrack::Power)?.max(1.0),
        duration_ms: floor_f64_to_u64(effect(WaterTrack::Duration)?),
        cooldown_ms: floor_f64_to_u64(effect(WaterTrack::Cooldown)?),
    })
}

/// Effect of a shop track at the player's level; 0 when the catalog lacks it.
#[must_use]
pub fn shop_effect(catalog: &Catalog, state: &PlayerState, track: ShopTrack) -> f64 {
    catalog
        .shop_track(track)
        .map_or(0.0, |def| def.effect_at(state.shop_level(track)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::standard;
    use crate::error::Rejection;

    #[test]
    fn water_levels_walk_the_cost_table() {
        let catalog = standard();
        let mut state = PlayerState::fresh(0);
        state.currency = 2_600;
        let first = buy_water_upgrade(catalog, &mut state, WaterTrack::Power).unwrap();
        assert_eq!((first.level, first.cost, first.balance), (1, 500, 2_100));
        let second = buy_water_upgrade(catalog, &mut state, WaterTrack::Power).unwrap();
        assert_eq!((second.level, second.cost), (2, 2_000));
        assert!(matches!(
            buy_water_upgrade(catalog, &mut state, WaterTrack::Power),
            Err(Rejection::InsufficientFunds { required: 8_000, available: 100, .. })
        ));
        assert_eq!(state.water_level(WaterTrack::Power), 2);
    }

    #[test]
    fn maxed_tracks_reject() {
        let catalog = standard();
        let mut state = PlayerState::fresh(0);
        state.prestige_tokens = 1_000;
        for _ in 0..4 {
            buy_shop_upgrade(catalog, &mut state, ShopTrack::ExtraFields).unwrap();
        }
        assert_eq!(state.prestige_tokens, 1_000 - 28);
        assert_eq!(
            buy_shop_upgrade(catalog, &mut state, ShopTrack::ExtraFields).unwrap_err(),
            Rejection::from(InvalidReason::MaxLevel)
        );
    }

    #[test]
    fn profile_reflects_levels() {
        let catalog = standard();
        let mut state = PlayerState::fresh(0);
        let base = water_profile(catalog, &state).unwrap();
        assert!((base.multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(base.duration_ms, 10_000);
        assert_eq!(base.cooldown_ms, 30_000);

        state.water_upgrades.insert(WaterTrack::Cooldown, 2);
        state.water_upgrades.insert(WaterTrack::Duration, 1);
        let upgraded = water_profile(catalog, &state).unwrap();
        assert_eq!(upgraded.cooldown_ms, 22_000);
        assert_eq!(upgraded.duration_ms, 15_000);
    }

    #[test]
    fn shop_effects_scale_linearly() {
        let catalog = standard();
        let mut state = PlayerState::fresh(0);
        assert!(shop_effect(catalog, &state, ShopTrack::VariantLuck).abs() < f64::EPSILON);
        state.shop_upgrades.insert(ShopTrack::VariantLuck, 3);
        assert!((shop_effect(catalog, &state, ShopTrack::VariantLuck) - 15.0).abs() < f64::EPSILON);
    }
}
