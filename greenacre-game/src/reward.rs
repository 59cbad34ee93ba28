//! Variant reward model: single rolls, stacked rolls and valuation.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::catalog::{Catalog, VariantId};
use crate::constants::{
    COMBO_SEPARATOR, EVENT_FOCUS_MULTIPLIER, EVENT_OTHER_MULTIPLIER, INDEX_BONUS_BUCKETS,
    INDEX_BONUS_STEP, MAX_STACKED_VARIANTS, NORMAL_VARIANT, PRESTIGE_VALUE_STEP,
    STACK_SECOND_ROLL_SCALAR, STACK_THIRD_ROLL_SCALAR,
};
use crate::error::NotFound;
use crate::numbers::{floor_f64_to_u64, u32_to_f64, u64_to_f64};
use crate::rng::{RandomSource, RngStream};

/// Odds modifiers in effect for one harvest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollContext<'a> {
    /// The plant's `variant_chance_multiplier`.
    pub plant_multiplier: f64,
    /// Prestige-shop luck bonus, in percent.
    pub global_bonus_pct: f64,
    /// Focus variant of the active event, if any.
    pub event_focus: Option<&'a str>,
}

impl RollContext<'_> {
    /// Context with no bonuses at all.
    #[must_use]
    pub const fn neutral() -> Self {
        Self {
            plant_multiplier: 1.0,
            global_bonus_pct: 0.0,
            event_focus: None,
        }
    }

    fn event_multiplier(&self, variant: &str) -> f64 {
        match self.event_focus {
            Some(focus) if focus == variant => EVENT_FOCUS_MULTIPLIER,
            Some(_) => EVENT_OTHER_MULTIPLIER,
            None => 1.0,
        }
    }

    /// Effective 1-in-N odds of a variant under this context.
    #[must_use]
    pub fn effective_rarity(&self, base_rarity: f64, variant: &str) -> f64 {
        base_rarity
            / self.plant_multiplier.max(f64::MIN_POSITIVE)
            / (1.0 + self.global_bonus_pct / 100.0).max(f64::MIN_POSITIVE)
            / self.event_multiplier(variant)
    }
}

/// One harvest result: up to three distinct rare variants, or exactly `normal`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct VariantCombo(SmallVec<[VariantId; MAX_STACKED_VARIANTS]>);

impl VariantCombo {
    #[must_use]
    pub fn normal() -> Self {
        Self(SmallVec::from_iter([NORMAL_VARIANT.to_string()]))
    }

    #[must_use]
    pub fn single(variant: &str) -> Self {
        Self(SmallVec::from_iter([variant.to_string()]))
    }

    /// Parse a combo key such as `gold+diamond`.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let parts: SmallVec<[VariantId; MAX_STACKED_VARIANTS]> = key
            .split(COMBO_SEPARATOR)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        if parts.is_empty() || parts.len() > MAX_STACKED_VARIANTS {
            return None;
        }
        if parts.len() > 1 && parts.iter().any(|p| p == NORMAL_VARIANT) {
            return None;
        }
        Some(Self(parts))
    }

    #[must_use]
    pub fn key(&self) -> String {
        self.0.join(&COMBO_SEPARATOR.to_string())
    }

    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.0.len() == 1 && self.0[0] == NORMAL_VARIANT
    }

    #[must_use]
    pub fn variants(&self) -> &[VariantId] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, variant: &str) -> bool {
        self.0.iter().any(|v| v == variant)
    }

    /// Highest display rank among the combo's variants.
    ///
    /// # Errors
    ///
    /// Returns [`NotFound::Variant`] if any id is unknown to the catalog.
    pub fn best_rank(&self, catalog: &Catalog) -> Result<usize, NotFound> {
        let mut best = 0;
        for id in &self.0 {
            best = best.max(catalog.variant_rank(id)?);
        }
        Ok(best)
    }
}

impl fmt::Display for VariantCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl From<VariantCombo> for String {
    fn from(value: VariantCombo) -> Self {
        value.key()
    }
}

impl TryFrom<String> for VariantCombo {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid variant combo `{value}`"))
    }
}

fn roll_with_scalar<R>(
    catalog: &Catalog,
    ctx: &RollContext<'_>,
    chance_scalar: f64,
    exclude: &[VariantId],
    rng: &mut R,
) -> VariantId
where
    R: RandomSource + ?Sized,
{
    for variant in catalog.rollable_variants_rarest_first() {
        if exclude.iter().any(|held| *held == variant.id) {
            continue;
        }
        let effective = ctx.effective_rarity(variant.rarity, &variant.id);
        let chance = (chance_scalar / effective).clamp(0.0, 1.0);
        if rng.next_unit(RngStream::Harvest) < chance {
            return variant.id.clone();
        }
    }
    NORMAL_VARIANT.to_string()
}

/// Roll one variant, checking rarest to commonest; `normal` when nothing hits.
pub fn roll_variant<R>(catalog: &Catalog, ctx: &RollContext<'_>, rng: &mut R) -> VariantId
where
    R: RandomSource + ?Sized,
{
    roll_with_scalar(catalog, ctx, 1.0, &[], rng)
}

/// Harvest roll with up to two follow-up rolls at reduced odds.
///
/// Follow-up rolls skip variants already held, and the chain stops on the
/// first follow-up that comes back `normal`.
pub fn roll_stacked<R>(catalog: &Catalog, ctx: &RollContext<'_>, rng: &mut R) -> VariantCombo
where
    R: RandomSource + ?Sized,
{
    let first = roll_variant(catalog, ctx, rng);
    if first == NORMAL_VARIANT {
        return VariantCombo::normal();
    }
    let mut held: SmallVec<[VariantId; MAX_STACKED_VARIANTS]> = SmallVec::new();
    held.push(first);

    for scalar in [STACK_SECOND_ROLL_SCALAR, STACK_THIRD_ROLL_SCALAR] {
        let next = roll_with_scalar(catalog, ctx, scalar, &held, rng);
        if next == NORMAL_VARIANT || held.contains(&next) {
            break;
        }
        held.push(next);
    }
    VariantCombo(held)
}

/// Index completion bonus, stepping in 10%-of-collection increments.
#[must_use]
pub fn index_completion_bonus(tier: u32, discovered_fraction: f64) -> f64 {
    let buckets = (INDEX_BONUS_BUCKETS * discovered_fraction.clamp(0.0, 1.0)).floor();
    1.0 + u32_to_f64(tier) * INDEX_BONUS_STEP * buckets
}

/// Prestige value multiplier, `1 + 0.1 × count`.
#[must_use]
pub fn prestige_multiplier(prestige_count: u32) -> f64 {
    1.0 + PRESTIGE_VALUE_STEP * u32_to_f64(prestige_count)
}

/// Sale value of one harvested item.
///
/// # Errors
///
/// Returns [`NotFound::Variant`] if the combo names an unknown variant.
pub fn calculate_value(
    catalog: &Catalog,
    base_value: u64,
    combo: &VariantCombo,
    prestige_count: u32,
    index_bonus: f64,
) -> Result<u64, NotFound> {
    let mut multiplier_sum = 0.0;
    for id in combo.variants() {
        multiplier_sum += catalog.variant(id)?.value_multiplier;
    }
    Ok(floor_f64_to_u64(
        u64_to_f64(base_value) * multiplier_sum * prestige_multiplier(prestige_count) * index_bonus,
    ))
}

/// Non-stacked valuation of a single variant, used for inventory display.
///
/// # Errors
///
/// Returns [`NotFound::Variant`] for unknown ids.
pub fn single_variant_value(
    catalog: &Catalog,
    base_value: u64,
    variant: &str,
    prestige_count: u32,
    index_bonus: f64,
) -> Result<u64, NotFound> {
    let multiplier = catalog.variant(variant)?.value_multiplier;
    Ok(floor_f64_to_u64(
        u64_to_f64(base_value) * multiplier * prestige_multiplier(prestige_count) * index_bonus,
    ))
}
