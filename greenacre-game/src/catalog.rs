//! Static content: plants, variants, events, upgrade tracks and prestige tables.
//!
//! The standard catalog is built in code and cached for the process. Custom
//! catalogs (mods, balance experiments, tests) load from JSON and go through
//! the same validation.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

use crate::constants::{MAX_GROW_CAP_MS, NORMAL_VARIANT};
use crate::error::NotFound;

pub type PlantId = String;
pub type VariantId = String;

const fn default_chance_multiplier() -> f64 {
    1.0
}

const fn default_weight() -> u32 {
    1
}

/// A crop the player can buy seeds for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantDef {
    pub id: PlantId,
    pub name: String,
    pub base_price: u64,
    pub base_value: u64,
    pub base_grow_ms: u64,
    /// Minimum rebirth count before seeds can be bought. `None` for regular plants.
    #[serde(default)]
    pub prestige_requirement: Option<u32>,
    #[serde(default = "default_chance_multiplier")]
    pub variant_chance_multiplier: f64,
}

impl PlantDef {
    #[must_use]
    pub const fn is_prestige_locked(&self) -> bool {
        self.prestige_requirement.is_some()
    }

    #[must_use]
    pub fn is_available(&self, prestige_count: u32) -> bool {
        self.prestige_requirement
            .is_none_or(|required| required <= prestige_count)
    }

    /// Grow duration after the playability cap.
    #[must_use]
    pub fn capped_grow_ms(&self) -> u64 {
        self.base_grow_ms.min(MAX_GROW_CAP_MS)
    }
}

/// A rarity tier rolled at harvest time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDef {
    pub id: VariantId,
    pub name: String,
    pub value_multiplier: f64,
    /// Draw odds expressed as 1-in-N.
    pub rarity: f64,
}

/// A timed event that boosts one variant's odds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDef {
    pub id: String,
    pub name: String,
    pub focus_variant: VariantId,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Linear effect of an upgrade track: `base + per_level * level`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackEffect {
    pub base: f64,
    pub per_level: f64,
}

impl TrackEffect {
    #[must_use]
    pub fn at(self, level: u32) -> f64 {
        self.base + self.per_level * f64::from(level)
    }
}

/// Coin-priced watering upgrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterTrack {
    /// Growth speed multiplier while watered.
    Power,
    /// Boost duration in milliseconds.
    Duration,
    /// Cooldown after a boost, in milliseconds.
    Cooldown,
}

impl WaterTrack {
    pub const ALL: [Self; 3] = [Self::Power, Self::Duration, Self::Cooldown];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Power => "water_power",
            Self::Duration => "water_duration",
            Self::Cooldown => "water_cooldown",
        }
    }
}

/// Token-priced prestige shop upgrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopTrack {
    /// Global rare-variant bonus in percent.
    VariantLuck,
    /// Tier of the index completion bonus.
    IndexBonus,
    /// Tier of the offline efficiency bonus.
    OfflineEfficiency,
    /// Extra fields unlocked at the start of each run.
    ExtraFields,
}

impl ShopTrack {
    pub const ALL: [Self; 4] = [
        Self::VariantLuck,
        Self::IndexBonus,
        Self::OfflineEfficiency,
        Self::ExtraFields,
    ];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::VariantLuck => "variant_luck",
            Self::IndexBonus => "index_bonus",
            Self::OfflineEfficiency => "offline_efficiency",
            Self::ExtraFields => "extra_fields",
        }
    }
}

/// An upgrade track definition; `cost_table[level]` buys the next level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeTrackDef<K> {
    pub key: K,
    pub name: String,
    pub cost_table: Vec<u64>,
    pub effect: TrackEffect,
}

impl<K> UpgradeTrackDef<K> {
    #[must_use]
    pub fn max_level(&self) -> u32 {
        u32::try_from(self.cost_table.len()).unwrap_or(u32::MAX)
    }

    /// Cost of the next level, `None` once maxed.
    #[must_use]
    pub fn next_cost(&self, level: u32) -> Option<u64> {
        usize::try_from(level)
            .ok()
            .and_then(|idx| self.cost_table.get(idx).copied())
    }

    #[must_use]
    pub fn effect_at(&self, level: u32) -> f64 {
        self.effect.at(level.min(self.max_level()))
    }
}

/// Automation features that milestones or per-run purchases unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationFeature {
    AutoHarvest,
    AutoSell,
    AutoWater,
}

impl fmt::Display for AutomationFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AutoHarvest => "auto_harvest",
            Self::AutoSell => "auto_sell",
            Self::AutoWater => "auto_water",
        })
    }
}

/// Named unlocks granted by reaching a rebirth count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKey {
    StarterFundsI,
    AutoHarvest,
    Farmhands,
    AutoSell,
    AutoWater,
    StarterFundsII,
    GrowthBoostI,
    GrowthBoostII,
}

impl MilestoneKey {
    /// Milestone that permanently grants an automation feature.
    #[must_use]
    pub const fn for_automation(feature: AutomationFeature) -> Self {
        match feature {
            AutomationFeature::AutoHarvest => Self::AutoHarvest,
            AutomationFeature::AutoSell => Self::AutoSell,
            AutomationFeature::AutoWater => Self::AutoWater,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneDef {
    pub threshold: u32,
    pub key: MilestoneKey,
    /// Starting coins for a run once reached (highest reached wins).
    #[serde(default)]
    pub starting_currency: Option<u64>,
    /// Multiplies field growth speed once reached.
    #[serde(default)]
    pub growth_multiplier: Option<f64>,
}

/// Tokens awarded per rebirth from `min_prestige` upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBand {
    pub min_prestige: u32,
    pub tokens: u64,
}

/// Advance several rebirths at once for a price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulkPrestigeOption {
    pub steps: u32,
    pub min_prestige: u32,
    pub cost_multiplier: f64,
    pub token_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDef {
    pub id: String,
    pub name: String,
    pub token_price: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationUnlockDef {
    pub feature: AutomationFeature,
    pub coin_price: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog JSON invalid: {0}")]
    Parse(String),
    #[error("variant list must start with `normal`")]
    MissingNormal,
    #[error("variant `{0}` has rarity below 1")]
    BadRarity(String),
    #[error("duplicate id `{0}`")]
    Duplicate(String),
    #[error("event `{event}` focuses unknown variant `{variant}`")]
    EventVariant { event: String, variant: String },
    #[error("token bands must start at 0 and be strictly ascending")]
    TokenBands,
    #[error("milestones must be sorted by threshold")]
    MilestoneOrder,
    #[error("bulk rebirth option with {0} steps is invalid")]
    BulkOption(u32),
    #[error("missing track definition `{0}`")]
    MissingTrack(&'static str),
}

/// All static game content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub plants: Vec<PlantDef>,
    /// Ordered common to rare; rank is the index.
    pub variants: Vec<VariantDef>,
    pub events: Vec<EventDef>,
    pub water_tracks: Vec<UpgradeTrackDef<WaterTrack>>,
    pub shop_tracks: Vec<UpgradeTrackDef<ShopTrack>>,
    pub milestones: Vec<MilestoneDef>,
    pub token_bands: Vec<TokenBand>,
    pub bulk_prestige: Vec<BulkPrestigeOption>,
    pub workers: Vec<WorkerDef>,
    pub worker_upgrade_costs: Vec<u64>,
    pub automation_unlocks: Vec<AutomationUnlockDef>,
    pub permanent_field_costs: Vec<u64>,
}

/// The process-wide standard catalog.
#[must_use]
pub fn standard() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(Catalog::standard)
}

impl Catalog {
    /// Load a catalog from JSON and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self =
            serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns the first integrity problem found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.variants.first().is_none_or(|v| v.id != NORMAL_VARIANT) {
            return Err(CatalogError::MissingNormal);
        }
        if let Some(bad) = self.variants.iter().find(|v| v.rarity < 1.0) {
            return Err(CatalogError::BadRarity(bad.id.clone()));
        }
        let mut seen = std::collections::HashSet::new();
        for id in self
            .plants
            .iter()
            .map(|p| &p.id)
            .chain(self.variants.iter().map(|v| &v.id))
            .chain(self.workers.iter().map(|w| &w.id))
        {
            if !seen.insert(id.as_str()) {
                return Err(CatalogError::Duplicate(id.clone()));
            }
        }
        for event in &self.events {
            if self.variant(&event.focus_variant).is_err() {
                return Err(CatalogError::EventVariant {
                    event: event.id.clone(),
                    variant: event.focus_variant.clone(),
                });
            }
        }
        let bands_ok = self.token_bands.first().is_some_and(|b| b.min_prestige == 0)
            && self
                .token_bands
                .windows(2)
                .all(|pair| pair[0].min_prestige < pair[1].min_prestige);
        if !bands_ok {
            return Err(CatalogError::TokenBands);
        }
        if !self
            .milestones
            .windows(2)
            .all(|pair| pair[0].threshold <= pair[1].threshold)
        {
            return Err(CatalogError::MilestoneOrder);
        }
        if let Some(bad) = self.bulk_prestige.iter().find(|o| {
            o.steps < 2 || o.cost_multiplier <= 0.0 || !(0.0..=1.0).contains(&o.token_penalty)
        }) {
            return Err(CatalogError::BulkOption(bad.steps));
        }
        for track in WaterTrack::ALL {
            if self.water_track(track).is_err() {
                return Err(CatalogError::MissingTrack(track.key()));
            }
        }
        for track in ShopTrack::ALL {
            if self.shop_track(track).is_err() {
                return Err(CatalogError::MissingTrack(track.key()));
            }
        }
        Ok(())
    }

    /// Look up a plant by id.
    ///
    /// # Errors
    ///
    /// Returns [`NotFound::Plant`] for unknown ids.
    pub fn plant(&self, id: &str) -> Result<&PlantDef, NotFound> {
        self.plants
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| NotFound::Plant(id.to_string()))
    }

    /// Look up a variant by id.
    ///
    /// # Errors
    ///
    /// Returns [`NotFound::Variant`] for unknown ids.
    pub fn variant(&self, id: &str) -> Result<&VariantDef, NotFound> {
        self.variants
            .iter()
            .find(|v| v.id == id)
            .ok_or_else(|| NotFound::Variant(id.to_string()))
    }

    /// Display rank of a variant (index in common-to-rare order).
    ///
    /// # Errors
    ///
    /// Returns [`NotFound::Variant`] for unknown ids.
    pub fn variant_rank(&self, id: &str) -> Result<usize, NotFound> {
        self.variants
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| NotFound::Variant(id.to_string()))
    }

    /// Variants eligible for rolling, rarest first.
    pub fn rollable_variants_rarest_first(&self) -> impl Iterator<Item = &VariantDef> {
        self.variants
            .iter()
            .rev()
            .filter(|v| v.id != NORMAL_VARIANT)
    }

    /// Look up an event by id.
    ///
    /// # Errors
    ///
    /// Returns [`NotFound::Event`] for unknown ids.
    pub fn event(&self, id: &str) -> Result<&EventDef, NotFound> {
        self.events
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| NotFound::Event(id.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`NotFound::Track`] when the catalog lacks the track.
    pub fn water_track(&self, track: WaterTrack) -> Result<&UpgradeTrackDef<WaterTrack>, NotFound> {
        self.water_tracks
            .iter()
            .find(|t| t.key == track)
            .ok_or_else(|| NotFound::Track(track.key().to_string()))
    }

    /// # Errors
    ///
    /// Returns [`NotFound::Track`] when the catalog lacks the track.
    pub fn shop_track(&self, track: ShopTrack) -> Result<&UpgradeTrackDef<ShopTrack>, NotFound> {
        self.shop_tracks
            .iter()
            .find(|t| t.key == track)
            .ok_or_else(|| NotFound::Track(track.key().to_string()))
    }

    /// # Errors
    ///
    /// Returns [`NotFound::Worker`] for unknown ids.
    pub fn worker(&self, id: &str) -> Result<&WorkerDef, NotFound> {
        self.workers
            .iter()
            .find(|w| w.id == id)
            .ok_or_else(|| NotFound::Worker(id.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`NotFound::PrestigeOption`] when no option advances `steps` rebirths.
    pub fn bulk_option(&self, steps: u32) -> Result<&BulkPrestigeOption, NotFound> {
        self.bulk_prestige
            .iter()
            .find(|o| o.steps == steps)
            .ok_or(NotFound::PrestigeOption(steps))
    }

    #[must_use]
    pub fn automation_unlock(&self, feature: AutomationFeature) -> Option<&AutomationUnlockDef> {
        self.automation_unlocks.iter().find(|u| u.feature == feature)
    }

    /// Regular plants plus rebirth plants whose requirement is met.
    #[must_use]
    pub fn available_plants(&self, prestige_count: u32) -> Vec<&PlantDef> {
        self.plants
            .iter()
            .filter(|p| p.is_available(prestige_count))
            .collect()
    }

    /// Rebirth count at which a milestone unlocks.
    #[must_use]
    pub fn milestone_threshold(&self, key: MilestoneKey) -> Option<u32> {
        self.milestones
            .iter()
            .find(|m| m.key == key)
            .map(|m| m.threshold)
    }

    /// Number of (plant, variant) pairs the index can hold.
    #[must_use]
    pub fn index_size(&self) -> usize {
        self.plants.len() * self.variants.len()
    }

    /// The built-in content set.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            plants: standard_plants(),
            variants: standard_variants(),
            events: standard_events(),
            water_tracks: vec![
                track(WaterTrack::Power, "Sprinkler Pressure", &[500, 2_000, 8_000, 30_000, 100_000], 1.5, 0.25),
                track(WaterTrack::Duration, "Soaker Hoses", &[400, 1_500, 6_000, 20_000, 75_000], 10_000.0, 5_000.0),
                track(WaterTrack::Cooldown, "Rain Barrels", &[300, 1_200, 5_000, 18_000, 60_000], 30_000.0, -4_000.0),
            ],
            shop_tracks: vec![
                track(ShopTrack::VariantLuck, "Lucky Soil", &[1, 2, 3, 4, 5, 6, 8, 10, 12, 15], 0.0, 5.0),
                track(ShopTrack::IndexBonus, "Archivist", &[2, 4, 6, 9, 12], 0.0, 1.0),
                track(ShopTrack::OfflineEfficiency, "Night Shift", &[2, 3, 5, 7, 10], 0.0, 1.0),
                track(ShopTrack::ExtraFields, "Homestead", &[3, 5, 8, 12], 0.0, 1.0),
            ],
            milestones: vec![
                milestone(1, MilestoneKey::StarterFundsI, Some(1_000), None),
                milestone(2, MilestoneKey::AutoHarvest, None, None),
                milestone(3, MilestoneKey::Farmhands, None, None),
                milestone(4, MilestoneKey::AutoSell, None, None),
                milestone(5, MilestoneKey::AutoWater, None, None),
                milestone(6, MilestoneKey::StarterFundsII, Some(10_000), None),
                milestone(8, MilestoneKey::GrowthBoostI, None, Some(1.25)),
                milestone(15, MilestoneKey::GrowthBoostII, None, Some(1.5)),
            ],
            token_bands: vec![
                TokenBand { min_prestige: 0, tokens: 1 },
                TokenBand { min_prestige: 5, tokens: 2 },
                TokenBand { min_prestige: 10, tokens: 3 },
                TokenBand { min_prestige: 20, tokens: 5 },
                TokenBand { min_prestige: 35, tokens: 8 },
            ],
            bulk_prestige: vec![
                BulkPrestigeOption { steps: 5, min_prestige: 10, cost_multiplier: 6.0, token_penalty: 0.8 },
                BulkPrestigeOption { steps: 10, min_prestige: 25, cost_multiplier: 15.0, token_penalty: 0.7 },
            ],
            workers: vec![
                WorkerDef { id: "ada".into(), name: "Ada".into(), token_price: 3 },
                WorkerDef { id: "bram".into(), name: "Bram".into(), token_price: 6 },
                WorkerDef { id: "cleo".into(), name: "Cleo".into(), token_price: 12 },
            ],
            worker_upgrade_costs: vec![2, 3, 5, 8, 12, 18, 25, 35, 50],
            automation_unlocks: vec![
                AutomationUnlockDef { feature: AutomationFeature::AutoHarvest, coin_price: 5_000 },
                AutomationUnlockDef { feature: AutomationFeature::AutoSell, coin_price: 20_000 },
                AutomationUnlockDef { feature: AutomationFeature::AutoWater, coin_price: 12_000 },
            ],
            permanent_field_costs: vec![5, 10, 20, 40],
        }
    }
}

fn track<K>(key: K, name: &str, costs: &[u64], base: f64, per_level: f64) -> UpgradeTrackDef<K> {
    UpgradeTrackDef {
        key,
        name: name.to_string(),
        cost_table: costs.to_vec(),
        effect: TrackEffect { base, per_level },
    }
}

fn milestone(
    threshold: u32,
    key: MilestoneKey,
    starting_currency: Option<u64>,
    growth_multiplier: Option<f64>,
) -> MilestoneDef {
    MilestoneDef {
        threshold,
        key,
        starting_currency,
        growth_multiplier,
    }
}

fn plant(
    id: &str,
    name: &str,
    (base_price, base_value, base_grow_ms): (u64, u64, u64),
    prestige_requirement: Option<u32>,
    variant_chance_multiplier: f64,
) -> PlantDef {
    PlantDef {
        id: id.to_string(),
        name: name.to_string(),
        base_price,
        base_value,
        base_grow_ms,
        prestige_requirement,
        variant_chance_multiplier,
    }
}

fn standard_plants() -> Vec<PlantDef> {
    vec![
        plant("wheat", "Wheat", (10, 15, 30_000), None, 1.0),
        plant("carrot", "Carrot", (25, 40, 60_000), None, 1.0),
        plant("potato", "Potato", (60, 100, 120_000), None, 1.0),
        plant("tomato", "Tomato", (150, 260, 300_000), None, 1.0),
        plant("corn", "Corn", (400, 720, 600_000), None, 1.0),
        plant("pumpkin", "Pumpkin", (1_000, 1_900, 1_200_000), None, 1.0),
        plant("melon", "Melon", (2_500, 5_000, 1_800_000), None, 1.1),
        plant("starfruit", "Starfruit", (8_000, 17_000, 3_600_000), None, 1.2),
        plant("elder_oak", "Elder Oak", (25_000, 60_000, 7_200_000), None, 1.3),
        plant("moonflower", "Moonflower", (5_000, 12_000, 900_000), Some(1), 1.5),
        plant("sunpetal", "Sunpetal", (20_000, 50_000, 1_800_000), Some(3), 2.0),
        plant("dragonfruit", "Dragonfruit", (80_000, 220_000, 5_400_000), Some(5), 3.0),
        plant("void_lotus", "Void Lotus", (400_000, 1_200_000, 10_800_000), Some(10), 5.0),
    ]
}

fn standard_variants() -> Vec<VariantDef> {
    [
        ("normal", "Normal", 1.0, 1.0),
        ("shiny", "Shiny", 1.5, 10.0),
        ("gold", "Gold", 2.5, 25.0),
        ("ruby", "Ruby", 5.0, 75.0),
        ("diamond", "Diamond", 10.0, 200.0),
        ("rainbow", "Rainbow", 25.0, 1_000.0),
        ("cosmic", "Cosmic", 50.0, 5_000.0),
    ]
    .into_iter()
    .map(|(id, name, value_multiplier, rarity)| VariantDef {
        id: id.to_string(),
        name: name.to_string(),
        value_multiplier,
        rarity,
    })
    .collect()
}

fn standard_events() -> Vec<EventDef> {
    [
        ("shiny_shower", "Shiny Shower", "shiny", 40),
        ("golden_hour", "Golden Hour", "gold", 30),
        ("ruby_moon", "Ruby Moon", "ruby", 15),
        ("diamond_rain", "Diamond Rain", "diamond", 10),
        ("rainbow_festival", "Rainbow Festival", "rainbow", 4),
        ("cosmic_alignment", "Cosmic Alignment", "cosmic", 1),
    ]
    .into_iter()
    .map(|(id, name, focus, weight)| EventDef {
        id: id.to_string(),
        name: name.to_string(),
        focus_variant: focus.to_string(),
        weight,
    })
    .collect()
}
