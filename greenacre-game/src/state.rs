use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::automation::AutomationSettings;
use crate::catalog::{Catalog, MilestoneKey, PlantId, ShopTrack, VariantId, WaterTrack};
use crate::constants::{
    BASE_START_FIELDS, BASE_STARTING_CURRENCY, EVENT_INTERVAL_MS, MAX_FIELDS,
};
use crate::error::InvalidReason;
use crate::events::ActiveEvent;
use crate::field::Field;
use crate::numbers::ratio;
use crate::reward::VariantCombo;
use crate::workers::{WorkerEntity, WorkerSummary};

/// Harvested goods waiting to be sold: plant, then combo, then count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HarvestInventory(BTreeMap<PlantId, BTreeMap<VariantCombo, u64>>);

impl HarvestInventory {
    pub fn add(&mut self, plant: &str, combo: &VariantCombo, amount: u64) {
        if amount == 0 {
            return;
        }
        let count = self
            .0
            .entry(plant.to_string())
            .or_default()
            .entry(combo.clone())
            .or_insert(0);
        *count = count.saturating_add(amount);
    }

    #[must_use]
    pub fn count(&self, plant: &str, combo: &VariantCombo) -> u64 {
        self.0
            .get(plant)
            .and_then(|combos| combos.get(combo))
            .copied()
            .unwrap_or(0)
    }

    /// Remove up to `amount`, returning how many were actually removed.
    pub fn take(&mut self, plant: &str, combo: &VariantCombo, amount: u64) -> u64 {
        let Some(combos) = self.0.get_mut(plant) else {
            return 0;
        };
        let Some(count) = combos.get_mut(combo) else {
            return 0;
        };
        let taken = amount.min(*count);
        *count -= taken;
        if *count == 0 {
            combos.remove(combo);
        }
        if combos.is_empty() {
            self.0.remove(plant);
        }
        taken
    }

    /// Every stack as `(plant, combo, count)`.
    pub fn stacks(&self) -> impl Iterator<Item = (&PlantId, &VariantCombo, u64)> {
        self.0.iter().flat_map(|(plant, combos)| {
            combos
                .iter()
                .map(move |(combo, count)| (plant, combo, *count))
        })
    }

    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.stacks().map(|(_, _, count)| count).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Long-running counters shown on the stats screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeStats {
    #[serde(default)]
    pub total_harvests: u64,
    #[serde(default)]
    pub total_earned: u64,
    #[serde(default)]
    pub best_variant_rank: usize,
    #[serde(default)]
    pub total_rebirths: u64,
}

/// Sound and notification settings, persisted in their own blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    /// Once switched off, milestone popups stay suppressed for good.
    #[serde(default = "default_true")]
    pub milestone_popups_enabled: bool,
}

const fn default_true() -> bool {
    true
}

const fn default_volume() -> f32 {
    0.8
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            volume: default_volume(),
            notifications_enabled: true,
            milestone_popups_enabled: true,
        }
    }
}

impl Preferences {
    /// Clamp values that came from storage or the UI.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.volume = if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            default_volume()
        };
        self
    }
}

/// Persisted player aggregate. The harvested inventory is stored as its own blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub currency: u64,
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Fields bought with coins this run; drives the field price.
    #[serde(default)]
    pub fields_purchased: u32,
    #[serde(default)]
    pub seed_inventory: BTreeMap<PlantId, u64>,
    #[serde(skip)]
    pub harvested: HarvestInventory,
    #[serde(default)]
    pub prestige_count: u32,
    #[serde(default)]
    pub prestige_tokens: u64,
    #[serde(default)]
    pub discovered: BTreeMap<PlantId, BTreeSet<VariantId>>,
    #[serde(default)]
    pub active_event: Option<ActiveEvent>,
    #[serde(default)]
    pub next_event_at_ms: u64,
    #[serde(default)]
    pub water_upgrades: BTreeMap<WaterTrack, u32>,
    #[serde(default)]
    pub shop_upgrades: BTreeMap<ShopTrack, u32>,
    #[serde(default)]
    pub automation: AutomationSettings,
    #[serde(default)]
    pub workers: Vec<WorkerEntity>,
    #[serde(default)]
    pub pending_worker_summary: Option<WorkerSummary>,
    #[serde(default)]
    pub tutorial_complete: bool,
    #[serde(default)]
    pub milestones_seen: BTreeSet<MilestoneKey>,
    #[serde(default)]
    pub last_saved_at_ms: u64,
    #[serde(default)]
    pub lifetime: LifetimeStats,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::fresh(0)
    }
}

impl PlayerState {
    /// First-run state at `now_ms`.
    #[must_use]
    pub fn fresh(now_ms: u64) -> Self {
        Self {
            seed: 0,
            currency: BASE_STARTING_CURRENCY,
            fields: field_layout(Vec::new(), BASE_START_FIELDS),
            fields_purchased: 0,
            seed_inventory: BTreeMap::new(),
            harvested: HarvestInventory::default(),
            prestige_count: 0,
            prestige_tokens: 0,
            discovered: BTreeMap::new(),
            active_event: None,
            next_event_at_ms: now_ms.saturating_add(EVENT_INTERVAL_MS),
            water_upgrades: BTreeMap::new(),
            shop_upgrades: BTreeMap::new(),
            automation: AutomationSettings::default(),
            workers: Vec::new(),
            pending_worker_summary: None,
            tutorial_complete: false,
            milestones_seen: BTreeSet::new(),
            last_saved_at_ms: now_ms,
            lifetime: LifetimeStats::default(),
        }
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Repair a state loaded from storage: field invariants and layout size.
    pub fn normalize(&mut self) {
        for field in &mut self.fields {
            field.normalize();
        }
        self.fields.truncate(MAX_FIELDS);
        while self.fields.len() < MAX_FIELDS {
            self.fields.push(Field::locked());
        }
        self.seed_inventory.retain(|_, count| *count > 0);
    }

    #[must_use]
    pub fn water_level(&self, track: WaterTrack) -> u32 {
        self.water_upgrades.get(&track).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn shop_level(&self, track: ShopTrack) -> u32 {
        self.shop_upgrades.get(&track).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn seeds(&self, plant: &str) -> u64 {
        self.seed_inventory.get(plant).copied().unwrap_or(0)
    }

    pub fn add_seeds(&mut self, plant: &str, amount: u64) {
        if amount == 0 {
            return;
        }
        let count = self.seed_inventory.entry(plant.to_string()).or_insert(0);
        *count = count.saturating_add(amount);
    }

    /// Remove seeds, rejecting when fewer than `amount` are owned.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidReason::NoSeeds`] when the inventory is short.
    pub fn take_seeds(&mut self, plant: &str, amount: u64) -> Result<(), InvalidReason> {
        let owned = self.seeds(plant);
        if owned < amount || owned == 0 {
            return Err(InvalidReason::NoSeeds);
        }
        if owned == amount {
            self.seed_inventory.remove(plant);
        } else {
            self.seed_inventory.insert(plant.to_string(), owned - amount);
        }
        Ok(())
    }

    /// Record discovered variants. Returns the ids that were new for this plant.
    pub fn discover(&mut self, plant: &str, combo: &VariantCombo) -> Vec<VariantId> {
        let known = self.discovered.entry(plant.to_string()).or_default();
        combo
            .variants()
            .iter()
            .filter(|variant| known.insert((*variant).clone()))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn discovered_pairs(&self) -> usize {
        self.discovered.values().map(BTreeSet::len).sum()
    }

    /// Share of the index discovered, in `[0, 1]`.
    #[must_use]
    pub fn discovered_fraction(&self, catalog: &Catalog) -> f64 {
        ratio(self.discovered_pairs(), catalog.index_size()).min(1.0)
    }

    #[must_use]
    pub fn unlocked_field_count(&self) -> usize {
        self.fields.iter().filter(|f| f.unlocked).count()
    }

    #[must_use]
    pub fn permanent_field_count(&self) -> usize {
        self.fields.iter().filter(|f| f.permanent).count()
    }

    #[must_use]
    pub fn worker(&self, id: &str) -> Option<&WorkerEntity> {
        self.workers.iter().find(|w| w.id == id)
    }

    pub fn worker_mut(&mut self, id: &str) -> Option<&mut WorkerEntity> {
        self.workers.iter_mut().find(|w| w.id == id)
    }

    /// Credit coins earned from a sale.
    pub fn credit(&mut self, amount: u64) {
        self.currency = self.currency.saturating_add(amount);
        self.lifetime.total_earned = self.lifetime.total_earned.saturating_add(amount);
    }
}

/// Field layout for a new run: kept fields first, then fresh unlocked slots
/// up to `unlocked_count`, then locked slots up to the maximum.
#[must_use]
pub fn field_layout(kept: Vec<Field>, unlocked_count: usize) -> Vec<Field> {
    let mut fields = kept;
    fields.truncate(MAX_FIELDS);
    let target = unlocked_count.min(MAX_FIELDS);
    while fields.len() < target {
        fields.push(Field::unlocked());
    }
    while fields.len() < MAX_FIELDS {
        fields.push(Field::locked());
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::standard;

    #[test]
    fn fresh_state_has_starting_layout() {
        let state = PlayerState::fresh(1_000);
        assert_eq!(state.currency, BASE_STARTING_CURRENCY);
        assert_eq!(state.fields.len(), MAX_FIELDS);
        assert_eq!(state.unlocked_field_count(), BASE_START_FIELDS);
        assert_eq!(state.next_event_at_ms, 1_000 + EVENT_INTERVAL_MS);
        assert_eq!(state.last_saved_at_ms, 1_000);
    }

    #[test]
    fn seeds_never_go_negative() {
        let mut state = PlayerState::fresh(0);
        state.add_seeds("wheat", 2);
        assert_eq!(state.take_seeds("wheat", 3), Err(InvalidReason::NoSeeds));
        assert_eq!(state.seeds("wheat"), 2);
        state.take_seeds("wheat", 2).unwrap();
        assert!(!state.seed_inventory.contains_key("wheat"));
        assert_eq!(state.take_seeds("wheat", 0), Err(InvalidReason::NoSeeds));
    }

    #[test]
    fn discovery_only_reports_new_variants() {
        let mut state = PlayerState::fresh(0);
        let combo = VariantCombo::parse("gold+ruby").unwrap();
        assert_eq!(state.discover("wheat", &combo), vec!["gold", "ruby"]);
        assert!(state.discover("wheat", &VariantCombo::single("gold")).is_empty());
        assert_eq!(state.discovered_pairs(), 2);
        let expected = 2.0 / 91.0;
        assert!((state.discovered_fraction(standard()) - expected).abs() < 1e-12);
    }

    #[test]
    fn harvest_inventory_take_clamps_and_prunes() {
        let mut inventory = HarvestInventory::default();
        let gold = VariantCombo::single("gold");
        inventory.add("corn", &gold, 3);
        assert_eq!(inventory.take("corn", &gold, 5), 3);
        assert!(inventory.is_empty());
        assert_eq!(inventory.take("corn", &gold, 1), 0);
    }

    #[test]
    fn harvest_inventory_serializes_combo_keys() {
        let mut inventory = HarvestInventory::default();
        inventory.add("corn", &VariantCombo::parse("gold+diamond").unwrap(), 2);
        let json = serde_json::to_string(&inventory).unwrap();
        assert_eq!(json, r#"{"corn":{"gold+diamond":2}}"#);
        let back: HarvestInventory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inventory);
    }

    #[test]
    fn normalize_pads_and_repairs_fields() {
        let mut state = PlayerState::fresh(0);
        state.fields.truncate(2);
        state.fields[0].remaining_grow_ms = 10;
        state.seed_inventory.insert("wheat".into(), 0);
        state.normalize();
        assert_eq!(state.fields.len(), MAX_FIELDS);
        assert_eq!(state.fields[0], Field::unlocked());
        assert!(state.seed_inventory.is_empty());
    }

    #[test]
    fn preferences_fill_defaults_and_clamp() {
        let prefs: Preferences = serde_json::from_str(r#"{"volume": 3.0}"#).unwrap();
        assert!(prefs.milestone_popups_enabled);
        assert!((prefs.sanitized().volume - 1.0).abs() < f32::EPSILON);
    }
}
