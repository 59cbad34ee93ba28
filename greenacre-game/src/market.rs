//! Buying seeds and fields, selling harvested goods.
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, PlantId, ShopTrack};
use crate::constants::{FIELD_BASE_COST, FIELD_COST_GROWTH};
use crate::error::{
    ActionResult, CapacityLimit, Currency, InvalidReason, NotFound, Rejection, require_funds,
};
use crate::numbers::{floor_f64_to_u64, u64_to_f64};
use crate::reward::{VariantCombo, calculate_value, index_completion_bonus};
use crate::state::PlayerState;

/// Which stored combos a bulk sale touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellFilter {
    #[default]
    All,
    /// Only plain `normal` results.
    Normal,
    /// Anything carrying at least one rare variant.
    Rare,
}

impl SellFilter {
    #[must_use]
    pub fn matches(self, combo: &VariantCombo) -> bool {
        match self {
            Self::All => true,
            Self::Normal => combo.is_normal(),
            Self::Rare => !combo.is_normal(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedPurchase {
    pub plant: PlantId,
    pub amount: u64,
    pub cost: u64,
    pub owned: u64,
    pub currency: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldPurchase {
    pub index: usize,
    pub cost: u64,
    pub currency: Currency,
    pub balance: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaleOutcome {
    pub items_sold: u64,
    pub earned: u64,
    pub currency: u64,
}

/// Coin price of the next field given how many were bought this run.
#[must_use]
pub fn field_cost(fields_purchased: u32) -> u64 {
    let exponent = i32::try_from(fields_purchased).unwrap_or(i32::MAX);
    floor_f64_to_u64(u64_to_f64(FIELD_BASE_COST) * FIELD_COST_GROWTH.powi(exponent))
}

/// Index completion multiplier for the player's tier and progress.
#[must_use]
pub fn index_bonus(catalog: &Catalog, state: &PlayerState) -> f64 {
    index_completion_bonus(
        state.shop_level(ShopTrack::IndexBonus),
        state.discovered_fraction(catalog),
    )
}

/// Sale value of one item at the player's current multipliers.
///
/// # Errors
///
/// Returns [`NotFound`] for unknown plants or variants.
pub fn unit_value(
    catalog: &Catalog,
    state: &PlayerState,
    plant: &str,
    combo: &VariantCombo,
) -> Result<u64, NotFound> {
    let def = catalog.plant(plant)?;
    calculate_value(
        catalog,
        def.base_value,
        combo,
        state.prestige_count,
        index_bonus(catalog, state),
    )
}

/// # Errors
///
/// Rejects zero amounts, unknown or rebirth-locked plants and short balances.
pub fn buy_seed(
    catalog: &Catalog,
    state: &mut PlayerState,
    plant: &str,
    amount: u64,
) -> ActionResult<SeedPurchase> {
    if amount == 0 {
        return Err(InvalidReason::ZeroAmount.into());
    }
    let def = catalog.plant(plant)?;
    if !def.is_available(state.prestige_count) {
        return Err(InvalidReason::PlantLocked.into());
    }
    let cost = def.base_price.saturating_mul(amount);
    require_funds(Currency::Coins, cost, state.currency)?;
    state.currency -= cost;
    state.add_seeds(plant, amount);
    log::debug!("bought {amount} {plant} seeds for {cost}");
    Ok(SeedPurchase {
        plant: def.id.clone(),
        amount,
        cost,
        owned: state.seeds(plant),
        currency: state.currency,
    })
}

/// Unlock the next locked field for coins. Fields open strictly in order.
///
/// # Errors
///
/// Rejects owned fields, out-of-order indices, a full grid and short balances.
pub fn buy_field(state: &mut PlayerState, index: usize) -> ActionResult<FieldPurchase> {
    if index >= state.fields.len() {
        return Err(NotFound::Field(index).into());
    }
    let next_locked = state
        .fields
        .iter()
        .position(|f| !f.unlocked)
        .ok_or(CapacityLimit::FieldCount)?;
    if state.fields[index].unlocked {
        return Err(InvalidReason::FieldAlreadyOwned.into());
    }
    if index != next_locked {
        return Err(InvalidReason::FieldOutOfOrder.into());
    }
    let cost = field_cost(state.fields_purchased);
    require_funds(Currency::Coins, cost, state.currency)?;
    state.currency -= cost;
    state.fields_purchased = state.fields_purchased.saturating_add(1);
    state.fields[index].unlocked = true;
    log::debug!("bought field {index} for {cost}");
    Ok(FieldPurchase {
        index,
        cost,
        currency: Currency::Coins,
        balance: state.currency,
    })
}

/// Make an owned field permanent so it survives rebirth. Priced in tokens.
///
/// # Errors
///
/// Rejects locked or already permanent fields, an exhausted price table and
/// short token balances.
pub fn buy_permanent_field(
    catalog: &Catalog,
    state: &mut PlayerState,
    index: usize,
) -> ActionResult<FieldPurchase> {
    let field = state.fields.get(index).ok_or(NotFound::Field(index))?;
    if !field.unlocked {
        return Err(InvalidReason::FieldLocked.into());
    }
    if field.permanent {
        return Err(InvalidReason::AlreadyPermanent.into());
    }
    let cost = catalog
        .permanent_field_costs
        .get(state.permanent_field_count())
        .copied()
        .ok_or(InvalidReason::MaxLevel)?;
    require_funds(Currency::Tokens, cost, state.prestige_tokens)?;
    state.prestige_tokens -= cost;
    state.fields[index].permanent = true;
    log::debug!("field {index} made permanent for {cost} tokens");
    Ok(FieldPurchase {
        index,
        cost,
        currency: Currency::Tokens,
        balance: state.prestige_tokens,
    })
}

/// Sell up to `amount` of one stored stack; the amount clamps to what is held.
///
/// # Errors
///
/// Rejects zero amounts, empty stacks and unknown plants or combos.
pub fn sell_harvested(
    catalog: &Catalog,
    state: &mut PlayerState,
    plant: &str,
    combo_key: &str,
    amount: u64,
) -> ActionResult<SaleOutcome> {
    if amount == 0 {
        return Err(InvalidReason::ZeroAmount.into());
    }
    let combo = VariantCombo::parse(combo_key)
        .ok_or_else(|| Rejection::not_found(NotFound::Variant(combo_key.to_string())))?;
    let per_item = unit_value(catalog, state, plant, &combo)?;
    let sold = state.harvested.take(plant, &combo, amount);
    if sold == 0 {
        return Err(InvalidReason::NothingToSell.into());
    }
    let earned = per_item.saturating_mul(sold);
    state.credit(earned);
    log::debug!("sold {sold} {plant} [{combo}] for {earned}");
    Ok(SaleOutcome {
        items_sold: sold,
        earned,
        currency: state.currency,
    })
}

/// Sell every stored stack the filter matches.
///
/// # Errors
///
/// Rejects when nothing matches; unknown ids reject before anything is sold.
pub fn sell_all(
    catalog: &Catalog,
    state: &mut PlayerState,
    filter: SellFilter,
) -> ActionResult<SaleOutcome> {
    let mut priced = Vec::new();
    for (plant, combo, count) in state.harvested.stacks() {
        if !filter.matches(combo) {
            continue;
        }
        let per_item = unit_value(catalog, state, plant, combo)?;
        priced.push((plant.clone(), combo.clone(), count, per_item));
    }
    if priced.is_empty() {
        return Err(InvalidReason::NothingToSell.into());
    }
    let mut outcome = SaleOutcome::default();
    for (plant, combo, count, per_item) in priced {
        let sold = state.harvested.take(&plant, &combo, count);
        let earned = per_item.saturating_mul(sold);
        outcome.items_sold += sold;
        outcome.earned = outcome.earned.saturating_add(earned);
    }
    state.credit(outcome.earned);
    outcome.currency = state.currency;
    log::debug!(
        "sold {} items ({filter:?}) for {}",
        outcome.items_sold,
        outcome.earned
    );
    Ok(outcome)
}
