//! Automation toggles, availability and the auto-sell / auto-water selection rules.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::catalog::{AutomationFeature, Catalog, MilestoneKey};
use crate::constants::{AUTO_WATER_MIN_REMAINING_MS, RARE_AUTO_SELL_FLOOR};
use crate::error::{ActionResult, Currency, InvalidReason, NotFound, require_funds};
use crate::prestige::has_milestone;
use crate::reward::VariantCombo;
use crate::state::PlayerState;
use crate::watering::WateringState;

/// Which automated harvests are sold on the spot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoSellMode {
    #[default]
    Off,
    NormalOnly,
    All,
    /// Gold or better; shiny stays in the inventory.
    RareOnly,
}

impl AutoSellMode {
    /// Whether a harvest with this combo is sold immediately.
    ///
    /// # Errors
    ///
    /// Returns [`NotFound::Variant`] for unknown variant ids.
    pub fn matches(self, catalog: &Catalog, combo: &VariantCombo) -> Result<bool, NotFound> {
        Ok(match self {
            Self::Off => false,
            Self::All => true,
            Self::NormalOnly => combo.is_normal(),
            Self::RareOnly => {
                combo.best_rank(catalog)? >= catalog.variant_rank(RARE_AUTO_SELL_FLOOR)?
            }
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationSettings {
    #[serde(default)]
    pub auto_harvest: bool,
    #[serde(default)]
    pub auto_sell: AutoSellMode,
    #[serde(default)]
    pub auto_water: bool,
    /// Features bought with coins this run.
    #[serde(default)]
    pub run_unlocks: BTreeSet<AutomationFeature>,
}

impl AutomationSettings {
    #[must_use]
    pub const fn is_enabled(&self, feature: AutomationFeature) -> bool {
        match feature {
            AutomationFeature::AutoHarvest => self.auto_harvest,
            AutomationFeature::AutoSell => !matches!(self.auto_sell, AutoSellMode::Off),
            AutomationFeature::AutoWater => self.auto_water,
        }
    }

    const fn disable(&mut self, feature: AutomationFeature) {
        match feature {
            AutomationFeature::AutoHarvest => self.auto_harvest = false,
            AutomationFeature::AutoSell => self.auto_sell = AutoSellMode::Off,
            AutomationFeature::AutoWater => self.auto_water = false,
        }
    }
}

/// A request to change one automation setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AutomationToggle {
    AutoHarvest(bool),
    AutoSell(AutoSellMode),
    AutoWater(bool),
}

impl AutomationToggle {
    #[must_use]
    pub const fn feature(self) -> AutomationFeature {
        match self {
            Self::AutoHarvest(_) => AutomationFeature::AutoHarvest,
            Self::AutoSell(_) => AutomationFeature::AutoSell,
            Self::AutoWater(_) => AutomationFeature::AutoWater,
        }
    }

    #[must_use]
    pub const fn enables(self) -> bool {
        match self {
            Self::AutoHarvest(on) | Self::AutoWater(on) => on,
            Self::AutoSell(mode) => !matches!(mode, AutoSellMode::Off),
        }
    }
}

/// Milestone reached or bought for this run.
#[must_use]
pub fn is_available(catalog: &Catalog, state: &PlayerState, feature: AutomationFeature) -> bool {
    has_milestone(
        catalog,
        state.prestige_count,
        MilestoneKey::for_automation(feature),
    ) || state.automation.run_unlocks.contains(&feature)
}

/// Switch off any toggle whose feature is no longer available.
pub fn enforce_availability(catalog: &Catalog, state: &mut PlayerState) {
    for feature in [
        AutomationFeature::AutoHarvest,
        AutomationFeature::AutoSell,
        AutomationFeature::AutoWater,
    ] {
        if state.automation.is_enabled(feature) && !is_available(catalog, state, feature) {
            log::debug!("{feature} switched off: no longer available");
            state.automation.disable(feature);
        }
    }
}

/// Apply a toggle. Turning a feature off is always allowed.
///
/// # Errors
///
/// Returns [`InvalidReason::FeatureLocked`] when enabling an unavailable feature.
pub fn apply_toggle(
    catalog: &Catalog,
    state: &mut PlayerState,
    toggle: AutomationToggle,
) -> ActionResult<AutomationSettings> {
    if toggle.enables() && !is_available(catalog, state, toggle.feature()) {
        return Err(InvalidReason::FeatureLocked.into());
    }
    let settings = &mut state.automation;
    match toggle {
        AutomationToggle::AutoHarvest(on) => settings.auto_harvest = on,
        AutomationToggle::AutoSell(mode) => settings.auto_sell = mode,
        AutomationToggle::AutoWater(on) => settings.auto_water = on,
    }
    log::debug!("automation {toggle:?}");
    Ok(settings.clone())
}

/// Buy a feature for the rest of this run.
///
/// # Errors
///
/// Rejects features already available, features without a price and short balances.
pub fn buy_unlock(
    catalog: &Catalog,
    state: &mut PlayerState,
    feature: AutomationFeature,
) -> ActionResult<u64> {
    if is_available(catalog, state, feature) {
        return Err(InvalidReason::AlreadyUnlocked.into());
    }
    let Some(unlock) = catalog.automation_unlock(feature) else {
        return Err(InvalidReason::FeatureLocked.into());
    };
    require_funds(Currency::Coins, unlock.coin_price, state.currency)?;
    state.currency -= unlock.coin_price;
    state.automation.run_unlocks.insert(feature);
    log::debug!("bought {feature} for {} coins", unlock.coin_price);
    Ok(unlock.coin_price)
}

/// Lowest-index ripe field.
#[must_use]
pub fn next_auto_harvest(state: &PlayerState) -> Option<usize> {
    state
        .fields
        .iter()
        .position(|field| field.unlocked && field.is_ripe())
}

/// First field with enough growth left that is neither watered nor cooling down.
#[must_use]
pub fn next_auto_water(
    state: &PlayerState,
    watering: &WateringState,
    now_ms: u64,
) -> Option<usize> {
    state.fields.iter().enumerate().find_map(|(index, field)| {
        let eligible = field.unlocked
            && field.planted.is_some()
            && field.remaining_grow_ms > AUTO_WATER_MIN_REMAINING_MS
            && watering.check_field(index, now_ms).is_ok();
        eligible.then_some(index)
    })
}
