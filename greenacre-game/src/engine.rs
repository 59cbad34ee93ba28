//! The operation API the presentation layer calls, plus the periodic passes
//! a [`crate::session::FarmSession`] drives.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::automation::{
    self, AutomationSettings, AutomationToggle, next_auto_harvest, next_auto_water,
};
use crate::catalog::{
    AutomationFeature, Catalog, PlantDef, PlantId, ShopTrack, VariantId, WaterTrack, standard,
};
use crate::constants::{AUTO_HARVEST_MIN_GAP_MS, AUTO_WATER_MIN_GAP_MS, TICK_MS};
use crate::error::{ActionResult, InvalidReason, NotFound};
use crate::events::{ActiveEvent, EventChange, active_event, tick_events};
use crate::field::FieldProgress;
use crate::market::{self, FieldPurchase, SaleOutcome, SeedPurchase, SellFilter, unit_value};
use crate::numbers::scale_ms;
use crate::prestige::{
    PrestigeOutcome, PrestigePreview, apply_prestige, growth_multiplier, preview_prestige,
    rebirth_cost,
};
use crate::reward::{RollContext, VariantCombo, roll_stacked};
use crate::rng::{RandomSource, RngBundle, next_seed};
use crate::state::{PlayerState, Preferences};
use crate::upgrades::{self, UpgradePurchase, shop_effect, water_profile};
use crate::watering::WateringState;
use crate::workers::{
    self, SummaryChoice, SummaryResolution, auto_replant_pass, fill_worker_slots,
    worker_item_value,
};

/// Host-provided settings for a new engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Derives the random streams for a fresh game.
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlantOutcome {
    pub field: usize,
    pub plant: PlantId,
    pub grow_ms: u64,
    pub seeds_left: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarvestOutcome {
    pub field: usize,
    pub plant: PlantId,
    pub combo: VariantCombo,
    /// Sale value of the item at the time of harvest.
    pub value: u64,
    pub new_discoveries: Vec<VariantId>,
    /// Produced by auto-harvest rather than a player action.
    pub automated: bool,
    /// Sold on the spot by auto-sell instead of stored.
    pub auto_sold: bool,
    pub currency: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaterOutcome {
    pub field: usize,
    pub multiplier: f64,
    pub boost_until_ms: u64,
    pub ready_at_ms: u64,
    pub automated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerCollection {
    pub worker: String,
    pub plant: PlantId,
    pub combo: VariantCombo,
    /// Sell-now value, worker bonus included.
    pub value: u64,
    pub new_discoveries: Vec<VariantId>,
}

/// What one growth tick changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fields_ripened: Vec<usize>,
    pub event: Option<EventChange>,
}

/// Everything the presentation layer renders, in one read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FarmSnapshot {
    pub now_ms: u64,
    pub currency: u64,
    pub prestige_count: u32,
    pub prestige_tokens: u64,
    pub next_rebirth_cost: u64,
    pub fields: Vec<FieldProgress>,
    pub seed_inventory: BTreeMap<PlantId, u64>,
    pub harvested_items: u64,
    pub active_event: Option<ActiveEvent>,
    pub event_remaining_ms: u64,
    pub discovered_fraction: f64,
    pub automation: AutomationSettings,
    pub pending_worker_items: u64,
    pub water_chain_streak: u32,
    pub tutorial_complete: bool,
}

/// Owns the player state and the ephemeral simulation state around it.
///
/// Every operation validates fully before it mutates, so a rejection leaves
/// the engine exactly as it was.
pub struct FarmEngine {
    state: PlayerState,
    prefs: Preferences,
    catalog: Arc<Catalog>,
    rng: Box<dyn RandomSource>,
    watering: WateringState,
    now_ms: u64,
    last_auto_harvest_ms: Option<u64>,
    last_auto_water_ms: Option<u64>,
}

impl fmt::Debug for FarmEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FarmEngine")
            .field("now_ms", &self.now_ms)
            .field("state", &self.state)
            .field("prefs", &self.prefs)
            .field("watering", &self.watering)
            .finish_non_exhaustive()
    }
}

impl FarmEngine {
    /// A first-run engine on the standard catalog.
    #[must_use]
    pub fn new(config: EngineConfig, now_ms: u64) -> Self {
        let state = PlayerState::fresh(now_ms).with_seed(config.seed);
        Self::from_state(state, Preferences::default(), now_ms)
    }

    /// Resume from a loaded state. Repairs field invariants and switches off
    /// automation the state is no longer entitled to.
    #[must_use]
    pub fn from_state(mut state: PlayerState, prefs: Preferences, now_ms: u64) -> Self {
        let catalog = Arc::new(standard().clone());
        state.normalize();
        automation::enforce_availability(&catalog, &mut state);
        let rng = Box::new(RngBundle::from_user_seed(state.seed));
        Self {
            state,
            prefs: prefs.sanitized(),
            catalog,
            rng,
            watering: WateringState::default(),
            now_ms,
            last_auto_harvest_ms: None,
            last_auto_water_ms: None,
        }
    }

    /// Swap in a custom content set.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        automation::enforce_availability(&catalog, &mut self.state);
        self.catalog = catalog;
        self
    }

    /// Replace the random source, e.g. with a scripted one for replays.
    #[must_use]
    pub fn with_random_source(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    #[must_use]
    pub const fn state(&self) -> &PlayerState {
        &self.state
    }

    /// Mutate the state directly. Intended for hosts and tests.
    pub fn with_state_mut<F>(&mut self, f: F)
    where
        F: FnOnce(&mut PlayerState),
    {
        f(&mut self.state);
    }

    #[must_use]
    pub fn into_state(self) -> PlayerState {
        self.state
    }

    #[must_use]
    pub const fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub const fn watering(&self) -> &WateringState {
        &self.watering
    }

    #[must_use]
    pub const fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Move the logical clock forward. Earlier times are ignored.
    pub fn set_clock(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    /// Chain the state seed forward from the clock and restart the roll
    /// streams on it. Returns the new seed.
    pub fn rotate_seed(&mut self) -> u64 {
        let seed = next_seed(self.state.seed, self.now_ms);
        self.state.seed = seed;
        self.rng.reseed(seed);
        seed
    }

    // Fields -------------------------------------------------------------

    /// Sow one seed from the inventory into an empty unlocked field.
    ///
    /// # Errors
    ///
    /// Rejects locked or occupied fields, missing seeds and unknown ids.
    pub fn plant(&mut self, field: usize, plant: &str) -> ActionResult<PlantOutcome> {
        let def = self.catalog.plant(plant)?;
        self.state
            .fields
            .get(field)
            .ok_or(NotFound::Field(field))?
            .check_plantable()?;
        self.state.take_seeds(plant, 1)?;
        self.state.fields[field].sow(def, self.now_ms);
        log::debug!("planted {plant} in field {field}");
        Ok(PlantOutcome {
            field,
            plant: def.id.clone(),
            grow_ms: self.state.fields[field].remaining_grow_ms,
            seeds_left: self.state.seeds(plant),
        })
    }

    /// Harvest a ripe field by hand.
    ///
    /// # Errors
    ///
    /// Rejects locked, empty and unripe fields.
    pub fn harvest(&mut self, field: usize) -> ActionResult<HarvestOutcome> {
        self.harvest_field(field, false)
    }

    fn harvest_field(&mut self, field: usize, automated: bool) -> ActionResult<HarvestOutcome> {
        let catalog = Arc::clone(&self.catalog);
        let slot = self.state.fields.get(field).ok_or(NotFound::Field(field))?;
        slot.check_harvestable()?;
        let plant_id = slot.planted.clone().ok_or(InvalidReason::FieldEmpty)?;
        let def = catalog.plant(&plant_id)?;

        let combo = self.roll_harvest(&catalog, def);
        let value = unit_value(&catalog, &self.state, &plant_id, &combo)?;
        let auto_sold = automated && self.state.automation.auto_sell.matches(&catalog, &combo)?;

        self.state.fields[field].clear();
        self.watering.end_boost(field, self.now_ms);
        let new_discoveries = self.state.discover(&plant_id, &combo);
        if auto_sold {
            self.state.credit(value);
        } else {
            self.state.harvested.add(&plant_id, &combo, 1);
        }
        self.record_harvest(&catalog, &combo);
        log::debug!(
            "harvested {plant_id} [{combo}] from field {field} worth {value}{}",
            if auto_sold { ", auto-sold" } else { "" }
        );
        Ok(HarvestOutcome {
            field,
            plant: plant_id,
            combo,
            value,
            new_discoveries,
            automated,
            auto_sold,
            currency: self.state.currency,
        })
    }

    fn roll_harvest(&mut self, catalog: &Catalog, plant: &PlantDef) -> VariantCombo {
        let focus = active_event(&self.state, self.now_ms).map(|event| event.focus_variant.clone());
        let ctx = RollContext {
            plant_multiplier: plant.variant_chance_multiplier,
            global_bonus_pct: shop_effect(catalog, &self.state, ShopTrack::VariantLuck),
            event_focus: focus.as_deref(),
        };
        roll_stacked(catalog, &ctx, self.rng.as_mut())
    }

    fn record_harvest(&mut self, catalog: &Catalog, combo: &VariantCombo) {
        let lifetime = &mut self.state.lifetime;
        lifetime.total_harvests = lifetime.total_harvests.saturating_add(1);
        if let Ok(rank) = combo.best_rank(catalog) {
            lifetime.best_variant_rank = lifetime.best_variant_rank.max(rank);
        }
    }

    /// Water a growing field by hand.
    ///
    /// # Errors
    ///
    /// Rejects fields that are locked, empty, ripe, boosted or cooling down,
    /// and rapid repeats while the chain throttle is running.
    pub fn water(&mut self, field: usize) -> ActionResult<WaterOutcome> {
        self.water_field(field, true)
    }

    fn water_field(&mut self, field: usize, manual: bool) -> ActionResult<WaterOutcome> {
        let slot = self.state.fields.get(field).ok_or(NotFound::Field(field))?;
        if !slot.unlocked {
            return Err(InvalidReason::FieldLocked.into());
        }
        if slot.is_empty() {
            return Err(InvalidReason::FieldEmpty.into());
        }
        if slot.is_ripe() {
            return Err(InvalidReason::AlreadyRipe.into());
        }
        self.watering.check_field(field, self.now_ms)?;
        if manual {
            self.watering.chain().check(self.now_ms)?;
        }
        let profile = water_profile(&self.catalog, &self.state)?;
        self.watering.apply(field, profile, self.now_ms, manual);
        let boost_until_ms = self.now_ms.saturating_add(profile.duration_ms);
        log::debug!(
            "watered field {field}: x{} until {boost_until_ms}",
            profile.multiplier
        );
        Ok(WaterOutcome {
            field,
            multiplier: profile.multiplier,
            boost_until_ms,
            ready_at_ms: boost_until_ms.saturating_add(profile.cooldown_ms),
            automated: !manual,
        })
    }

    // Market -------------------------------------------------------------

    /// # Errors
    ///
    /// See [`market::buy_seed`].
    pub fn buy_seed(&mut self, plant: &str, amount: u64) -> ActionResult<SeedPurchase> {
        market::buy_seed(&self.catalog, &mut self.state, plant, amount)
    }

    /// # Errors
    ///
    /// See [`market::buy_field`].
    pub fn buy_field(&mut self, field: usize) -> ActionResult<FieldPurchase> {
        market::buy_field(&mut self.state, field)
    }

    /// # Errors
    ///
    /// See [`market::buy_permanent_field`].
    pub fn buy_permanent_field(&mut self, field: usize) -> ActionResult<FieldPurchase> {
        market::buy_permanent_field(&self.catalog, &mut self.state, field)
    }

    /// # Errors
    ///
    /// See [`market::sell_harvested`].
    pub fn sell_harvested(
        &mut self,
        plant: &str,
        combo_key: &str,
        amount: u64,
    ) -> ActionResult<SaleOutcome> {
        market::sell_harvested(&self.catalog, &mut self.state, plant, combo_key, amount)
    }

    /// # Errors
    ///
    /// See [`market::sell_all`].
    pub fn sell_all(&mut self, filter: SellFilter) -> ActionResult<SaleOutcome> {
        market::sell_all(&self.catalog, &mut self.state, filter)
    }

    // Progression --------------------------------------------------------

    /// Rebirth `steps` times. Watering and automation pacing restart with the run.
    ///
    /// # Errors
    ///
    /// See [`apply_prestige`].
    pub fn do_prestige(&mut self, steps: u32) -> ActionResult<PrestigeOutcome> {
        let outcome = apply_prestige(
            &self.catalog,
            &mut self.state,
            steps,
            self.prefs.milestone_popups_enabled,
        )?;
        self.watering = WateringState::default();
        self.last_auto_harvest_ms = None;
        self.last_auto_water_ms = None;
        Ok(outcome)
    }

    /// # Errors
    ///
    /// See [`preview_prestige`].
    pub fn preview_prestige(&self, steps: u32) -> ActionResult<PrestigePreview> {
        preview_prestige(&self.catalog, &self.state, steps)
    }

    /// # Errors
    ///
    /// See [`upgrades::buy_shop_upgrade`].
    pub fn buy_prestige_shop_upgrade(
        &mut self,
        track: ShopTrack,
    ) -> ActionResult<UpgradePurchase> {
        upgrades::buy_shop_upgrade(&self.catalog, &mut self.state, track)
    }

    /// # Errors
    ///
    /// See [`upgrades::buy_water_upgrade`].
    pub fn buy_water_upgrade(&mut self, track: WaterTrack) -> ActionResult<UpgradePurchase> {
        upgrades::buy_water_upgrade(&self.catalog, &mut self.state, track)
    }

    // Workers ------------------------------------------------------------

    /// Hire a worker. Returns the remaining token balance.
    ///
    /// # Errors
    ///
    /// See [`workers::buy_worker`].
    pub fn buy_worker(&mut self, id: &str) -> ActionResult<u64> {
        workers::buy_worker(&self.catalog, &mut self.state, id)
    }

    /// # Errors
    ///
    /// See [`workers::upgrade_worker`].
    pub fn upgrade_worker(&mut self, id: &str) -> ActionResult<u32> {
        workers::upgrade_worker(&self.catalog, &mut self.state, id)
    }

    /// # Errors
    ///
    /// See [`workers::give_seeds`].
    pub fn give_seeds_to_worker(
        &mut self,
        id: &str,
        plant: &str,
        amount: u64,
    ) -> ActionResult<u64> {
        workers::give_seeds(&self.catalog, &mut self.state, id, plant, amount)
    }

    /// Start jobs on every free slot of a worker.
    ///
    /// # Errors
    ///
    /// See [`workers::fill_worker_slots`].
    pub fn start_worker_jobs(&mut self, id: &str) -> ActionResult<usize> {
        fill_worker_slots(&self.catalog, &mut self.state, id, self.now_ms)
    }

    /// # Errors
    ///
    /// Rejects workers the player does not own.
    pub fn set_worker_auto_replant(&mut self, id: &str, enabled: bool) -> ActionResult<bool> {
        let worker = self
            .state
            .worker_mut(id)
            .ok_or(InvalidReason::WorkerNotOwned)?;
        worker.auto_replant = enabled;
        Ok(enabled)
    }

    /// # Errors
    ///
    /// Rejects workers the player does not own.
    pub fn set_worker_auto_collect(&mut self, id: &str, enabled: bool) -> ActionResult<bool> {
        let worker = self
            .state
            .worker_mut(id)
            .ok_or(InvalidReason::WorkerNotOwned)?;
        worker.auto_collect = enabled;
        Ok(enabled)
    }

    /// Collect one finished job into the pending harvest summary.
    ///
    /// # Errors
    ///
    /// Rejects unowned workers, unknown job indices and jobs still growing.
    pub fn collect_worker_job(&mut self, id: &str, job: usize) -> ActionResult<WorkerCollection> {
        let catalog = Arc::clone(&self.catalog);
        let worker = self.state.worker(id).ok_or(InvalidReason::WorkerNotOwned)?;
        let entry = worker.active_jobs.get(job).ok_or(NotFound::Job(job))?;
        if !entry.is_ready(self.now_ms) {
            return Err(InvalidReason::JobNotReady.into());
        }
        let plant_id = entry.plant.clone();
        let def = catalog.plant(&plant_id)?;

        let combo = self.roll_harvest(&catalog, def);
        let field_value = unit_value(&catalog, &self.state, &plant_id, &combo)?;
        let worker = self
            .state
            .worker_mut(id)
            .ok_or(InvalidReason::WorkerNotOwned)?;
        let value = worker_item_value(field_value, worker);
        worker.active_jobs.remove(job);
        worker.stats.jobs_completed = worker.stats.jobs_completed.saturating_add(1);
        worker.stats.items_collected = worker.stats.items_collected.saturating_add(1);

        let new_discoveries = self.state.discover(&plant_id, &combo);
        self.state
            .pending_worker_summary
            .get_or_insert_with(Default::default)
            .record(&plant_id, &combo, value);
        self.record_harvest(&catalog, &combo);
        log::debug!("{id} collected {plant_id} [{combo}] worth {value}");
        Ok(WorkerCollection {
            worker: id.to_string(),
            plant: plant_id,
            combo,
            value,
            new_discoveries,
        })
    }

    /// Collect every finished job of every worker.
    pub fn collect_ready_worker_jobs(&mut self) -> Vec<WorkerCollection> {
        self.collect_ready(false)
    }

    /// Timer pass: collect finished jobs of workers with auto-collect on.
    pub fn auto_collect_pass(&mut self) -> Vec<WorkerCollection> {
        self.collect_ready(true)
    }

    fn collect_ready(&mut self, auto_only: bool) -> Vec<WorkerCollection> {
        let ids: Vec<String> = self
            .state
            .workers
            .iter()
            .filter(|w| !auto_only || w.auto_collect)
            .map(|w| w.id.clone())
            .collect();
        let mut collected = Vec::new();
        for id in ids {
            loop {
                let next = self
                    .state
                    .worker(&id)
                    .and_then(|w| w.ready_jobs(self.now_ms).first().copied());
                let Some(job) = next else {
                    break;
                };
                match self.collect_worker_job(&id, job) {
                    Ok(collection) => collected.push(collection),
                    Err(err) => {
                        log::warn!("{id} job {job} could not be collected: {err}");
                        break;
                    }
                }
            }
        }
        collected
    }

    /// Send the pending worker harvest to the inventory or sell it now.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidReason::NoPendingSummary`] when nothing is waiting.
    pub fn resolve_worker_summary(
        &mut self,
        choice: SummaryChoice,
    ) -> ActionResult<SummaryResolution> {
        let summary = self
            .state
            .pending_worker_summary
            .take()
            .filter(|summary| !summary.is_empty())
            .ok_or(InvalidReason::NoPendingSummary)?;
        let items = summary.total_items();
        let earned = match choice {
            SummaryChoice::Inventory => {
                for line in &summary.lines {
                    self.state.harvested.add(&line.plant, &line.combo, line.count);
                }
                0
            }
            SummaryChoice::SellNow => {
                let earned = summary.total_value();
                self.state.credit(earned);
                earned
            }
        };
        log::debug!("worker summary of {items} items resolved as {choice:?}");
        Ok(SummaryResolution {
            choice,
            items,
            earned,
            currency: self.state.currency,
        })
    }

    // Automation and settings --------------------------------------------

    /// Buy an automation feature for the rest of this run. Returns the price paid.
    ///
    /// # Errors
    ///
    /// See [`automation::buy_unlock`].
    pub fn buy_automation_unlock(&mut self, feature: AutomationFeature) -> ActionResult<u64> {
        automation::buy_unlock(&self.catalog, &mut self.state, feature)
    }

    /// # Errors
    ///
    /// See [`automation::apply_toggle`].
    pub fn toggle_automation(
        &mut self,
        toggle: AutomationToggle,
    ) -> ActionResult<AutomationSettings> {
        automation::apply_toggle(&self.catalog, &mut self.state, toggle)
    }

    pub const fn complete_tutorial(&mut self) {
        self.state.tutorial_complete = true;
    }

    /// Replace the preferences. A milestone-popup opt-out cannot be undone.
    pub fn set_preferences(&mut self, prefs: Preferences) -> &Preferences {
        let mut prefs = prefs.sanitized();
        if !self.prefs.milestone_popups_enabled {
            prefs.milestone_popups_enabled = false;
        }
        self.prefs = prefs;
        &self.prefs
    }

    // Queries ------------------------------------------------------------

    #[must_use]
    pub fn active_event(&self) -> Option<&ActiveEvent> {
        active_event(&self.state, self.now_ms)
    }

    #[must_use]
    pub fn field_progress(&self) -> Vec<FieldProgress> {
        self.state
            .fields
            .iter()
            .enumerate()
            .map(|(index, field)| FieldProgress {
                index,
                unlocked: field.unlocked,
                plant: field.planted.clone(),
                stage: field.growth_stage,
                remaining_ms: field.remaining_grow_ms,
                progress: field.progress(),
                ripe: field.is_ripe(),
                watered: self.watering.is_watered(index, self.now_ms),
                cooldown_remaining_ms: self.watering.cooldown_remaining_ms(index, self.now_ms),
            })
            .collect()
    }

    #[must_use]
    pub fn available_plants(&self) -> Vec<&PlantDef> {
        self.catalog.available_plants(self.state.prestige_count)
    }

    #[must_use]
    pub fn discovered_fraction(&self) -> f64 {
        self.state.discovered_fraction(&self.catalog)
    }

    #[must_use]
    pub fn snapshot(&self) -> FarmSnapshot {
        let event = self.active_event().cloned();
        FarmSnapshot {
            now_ms: self.now_ms,
            currency: self.state.currency,
            prestige_count: self.state.prestige_count,
            prestige_tokens: self.state.prestige_tokens,
            next_rebirth_cost: rebirth_cost(self.state.prestige_count),
            fields: self.field_progress(),
            seed_inventory: self.state.seed_inventory.clone(),
            harvested_items: self.state.harvested.total_items(),
            event_remaining_ms: event.as_ref().map_or(0, |e| e.remaining_ms(self.now_ms)),
            active_event: event,
            discovered_fraction: self.discovered_fraction(),
            automation: self.state.automation.clone(),
            pending_worker_items: self
                .state
                .pending_worker_summary
                .as_ref()
                .map_or(0, |summary| summary.total_items()),
            water_chain_streak: self.watering.chain().streak(),
            tutorial_complete: self.state.tutorial_complete,
        }
    }

    // Periodic passes ----------------------------------------------------

    /// One growth tick at the current clock: event bookkeeping, then every
    /// growing field advances by the tick scaled by its speed.
    pub fn growth_tick(&mut self) -> TickReport {
        let now = self.now_ms;
        let event = tick_events(&mut self.state, &self.catalog, now, self.rng.as_mut());
        let milestone_speed = growth_multiplier(&self.catalog, self.state.prestige_count);
        let mut fields_ripened = Vec::new();
        for (index, field) in self.state.fields.iter_mut().enumerate() {
            if !field.unlocked {
                continue;
            }
            let speed = self.watering.speed_multiplier(index, now) * milestone_speed;
            if field.advance(scale_ms(TICK_MS, speed)) {
                fields_ripened.push(index);
            }
        }
        self.watering.prune(now);
        TickReport {
            fields_ripened,
            event,
        }
    }

    /// Harvest the lowest-index ripe field, at most once per second.
    pub fn auto_harvest_pass(&mut self) -> Option<HarvestOutcome> {
        if !self.state.automation.auto_harvest {
            return None;
        }
        let now = self.now_ms;
        if self
            .last_auto_harvest_ms
            .is_some_and(|last| now.saturating_sub(last) < AUTO_HARVEST_MIN_GAP_MS)
        {
            return None;
        }
        let field = next_auto_harvest(&self.state)?;
        match self.harvest_field(field, true) {
            Ok(outcome) => {
                self.last_auto_harvest_ms = Some(now);
                Some(outcome)
            }
            Err(err) => {
                log::warn!("auto-harvest of field {field} failed: {err}");
                None
            }
        }
    }

    /// Water the first eligible field, at most once every three seconds.
    pub fn auto_water_pass(&mut self) -> Option<WaterOutcome> {
        if !self.state.automation.auto_water {
            return None;
        }
        let now = self.now_ms;
        if self
            .last_auto_water_ms
            .is_some_and(|last| now.saturating_sub(last) < AUTO_WATER_MIN_GAP_MS)
        {
            return None;
        }
        let field = next_auto_water(&self.state, &self.watering, now)?;
        match self.water_field(field, false) {
            Ok(outcome) => {
                self.last_auto_water_ms = Some(now);
                Some(outcome)
            }
            Err(err) => {
                log::warn!("auto-water of field {field} failed: {err}");
                None
            }
        }
    }

    /// Let auto-replanting workers start their next job. Returns jobs started.
    pub fn worker_pass(&mut self) -> usize {
        auto_replant_pass(&self.catalog, &mut self.state, self.now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::AutoSellMode;
    use crate::error::{CapacityLimit, Rejection};
    use crate::rng::scripted::FixedSource;

    fn engine_with(source: FixedSource) -> FarmEngine {
        FarmEngine::new(EngineConfig { seed: 7 }, 0).with_random_source(Box::new(source))
    }

    fn ripen(engine: &mut FarmEngine, field: usize, plant: &str) {
        let def = standard().plant(plant).unwrap();
        engine.with_state_mut(|state| {
            state.fields[field].sow(def, 0);
            state.fields[field].advance(u64::MAX);
        });
    }

    #[test]
    fn planting_consumes_a_seed_and_ticks_grow() {
        let mut engine = engine_with(FixedSource::always_fail());
        engine.buy_seed("carrot", 2).unwrap();
        let planted = engine.plant(0, "carrot").unwrap();
        assert_eq!((planted.grow_ms, planted.seeds_left), (60_000, 1));
        assert_eq!(
            engine.plant(0, "carrot").unwrap_err(),
            Rejection::from(InvalidReason::FieldOccupied)
        );
        assert_eq!(
            engine.plant(5, "carrot").unwrap_err(),
            Rejection::from(InvalidReason::FieldLocked)
        );

        engine.set_clock(1_000);
        let report = engine.growth_tick();
        assert!(report.fields_ripened.is_empty());
        assert_eq!(engine.state().fields[0].remaining_grow_ms, 59_000);
        assert_eq!(engine.state().fields[0].growth_stage, 1);
    }

    #[test]
    fn planting_without_seeds_is_rejected() {
        let mut engine = engine_with(FixedSource::always_fail());
        assert_eq!(
            engine.plant(0, "wheat").unwrap_err(),
            Rejection::from(InvalidReason::NoSeeds)
        );
        assert!(engine.state().fields[0].is_empty());
    }

    #[test]
    fn harvest_stores_result_and_discovers() {
        let mut engine = engine_with(FixedSource::always_succeed());
        engine.buy_seed("wheat", 1).unwrap();
        engine.plant(1, "wheat").unwrap();
        assert_eq!(
            engine.harvest(1).unwrap_err(),
            Rejection::from(InvalidReason::NotRipe)
        );
        for second in 1..=30 {
            engine.set_clock(second * 1_000);
            engine.growth_tick();
        }
        let outcome = engine.harvest(1).unwrap();
        assert_eq!(outcome.combo.key(), "cosmic+rainbow+diamond");
        assert!(!outcome.automated);
        assert_eq!(outcome.new_discoveries.len(), 3);
        assert!(engine.state().fields[1].is_empty());
        assert_eq!(engine.state().harvested.count("wheat", &outcome.combo), 1);
        assert_eq!(engine.state().lifetime.total_harvests, 1);
        assert_eq!(engine.state().lifetime.best_variant_rank, 6);
        assert_eq!(
            engine.harvest(1).unwrap_err(),
            Rejection::from(InvalidReason::FieldEmpty)
        );
    }

    #[test]
    fn watering_speeds_growth_and_throttles_rapid_use() {
        let mut engine = engine_with(FixedSource::always_fail());
        engine.buy_seed("carrot", 2).unwrap();
        engine.plant(0, "carrot").unwrap();
        engine.plant(1, "carrot").unwrap();

        let watered = engine.water(0).unwrap();
        assert_eq!(watered.boost_until_ms, 10_000);
        assert_eq!(watered.ready_at_ms, 40_000);
        assert_eq!(
            engine.water(0).unwrap_err(),
            Rejection::from(InvalidReason::AlreadyWatered)
        );
        engine.water(1).unwrap();
        assert_eq!(
            engine.water(2).unwrap_err(),
            Rejection::from(InvalidReason::FieldEmpty)
        );

        engine.set_clock(1_000);
        engine.growth_tick();
        assert_eq!(engine.state().fields[0].remaining_grow_ms, 58_500);
        assert!(engine.field_progress()[0].watered);
    }

    #[test]
    fn chain_throttle_blocks_third_rapid_watering() {
        let mut engine = engine_with(FixedSource::always_fail());
        engine.buy_seed("wheat", 2).unwrap();
        engine.plant(0, "wheat").unwrap();
        engine.plant(1, "wheat").unwrap();
        engine.with_state_mut(|state| {
            state.fields[3].unlocked = true;
        });
        engine.buy_seed("wheat", 1).unwrap();
        engine.plant(3, "wheat").unwrap();

        engine.water(0).unwrap();
        engine.water(1).unwrap();
        assert_eq!(
            engine.water(3).unwrap_err(),
            Rejection::from(InvalidReason::WaterThrottled)
        );
        engine.set_clock(250);
        engine.water(3).unwrap();
        assert_eq!(engine.snapshot().water_chain_streak, 2);
    }

    #[test]
    fn auto_harvest_is_rate_limited_and_auto_sells() {
        let mut engine = engine_with(FixedSource::always_fail());
        engine.with_state_mut(|state| state.prestige_count = 4);
        engine
            .toggle_automation(AutomationToggle::AutoHarvest(true))
            .unwrap();
        engine
            .toggle_automation(AutomationToggle::AutoSell(AutoSellMode::All))
            .unwrap();
        ripen(&mut engine, 0, "carrot");
        ripen(&mut engine, 2, "carrot");

        let first = engine.auto_harvest_pass().unwrap();
        assert_eq!(first.field, 0);
        assert!(first.automated && first.auto_sold);
        assert!(first.value > 40);
        assert_eq!(engine.state().currency, 50 + first.value);
        assert!(engine.state().harvested.is_empty());

        engine.set_clock(500);
        assert!(engine.auto_harvest_pass().is_none());
        engine.set_clock(1_000);
        assert_eq!(engine.auto_harvest_pass().unwrap().field, 2);
    }

    #[test]
    fn locked_automation_cannot_be_enabled() {
        let mut engine = engine_with(FixedSource::always_fail());
        assert_eq!(
            engine
                .toggle_automation(AutomationToggle::AutoWater(true))
                .unwrap_err(),
            Rejection::from(InvalidReason::FeatureLocked)
        );
        assert!(engine.auto_water_pass().is_none());
    }

    #[test]
    fn auto_water_skips_short_crops() {
        let mut engine = engine_with(FixedSource::always_fail());
        engine.with_state_mut(|state| state.prestige_count = 5);
        engine
            .toggle_automation(AutomationToggle::AutoWater(true))
            .unwrap();
        engine.buy_seed("wheat", 1).unwrap();
        engine.plant(0, "wheat").unwrap();
        engine.with_state_mut(|state| state.fields[0].remaining_grow_ms = 9_000);
        assert!(engine.auto_water_pass().is_none());

        engine.buy_seed("wheat", 1).unwrap();
        engine.plant(1, "wheat").unwrap();
        let watered = engine.auto_water_pass().unwrap();
        assert_eq!(watered.field, 1);
        assert!(watered.automated);

        engine.buy_seed("wheat", 1).unwrap();
        engine.plant(2, "wheat").unwrap();
        engine.set_clock(2_000);
        assert!(engine.auto_water_pass().is_none());
        engine.set_clock(3_000);
        assert_eq!(engine.auto_water_pass().unwrap().field, 2);
    }

    #[test]
    fn worker_jobs_flow_into_the_summary() {
        let mut engine = engine_with(FixedSource::always_fail());
        engine.with_state_mut(|state| {
            state.prestige_count = 3;
            state.prestige_tokens = 10;
            state.currency = 1_000;
        });
        engine.buy_worker("ada").unwrap();
        engine.buy_seed("wheat", 3).unwrap();
        assert_eq!(engine.give_seeds_to_worker("ada", "wheat", 10).unwrap(), 3);

        assert_eq!(engine.worker_pass(), 1);
        assert_eq!(engine.worker_pass(), 0);
        assert_eq!(
            engine.collect_worker_job("ada", 0).unwrap_err(),
            Rejection::from(InvalidReason::JobNotReady)
        );

        engine.set_clock(30_000);
        let collected = engine.collect_ready_worker_jobs();
        assert_eq!(collected.len(), 1);
        // 15 base value at a 1.3 rebirth multiplier.
        assert_eq!(collected[0].value, 19);
        assert_eq!(engine.snapshot().pending_worker_items, 1);

        let resolution = engine.resolve_worker_summary(SummaryChoice::SellNow).unwrap();
        assert_eq!((resolution.items, resolution.earned), (1, 19));
        assert_eq!(
            engine.resolve_worker_summary(SummaryChoice::Inventory).unwrap_err(),
            Rejection::from(InvalidReason::NoPendingSummary)
        );
        let worker = engine.state().worker("ada").unwrap();
        assert_eq!(worker.stats.jobs_completed, 1);
        assert_eq!(worker.buffered(), 2);
    }

    #[test]
    fn full_worker_buffer_is_a_capacity_rejection() {
        let mut engine = engine_with(FixedSource::always_fail());
        engine.with_state_mut(|state| {
            state.prestige_count = 3;
            state.prestige_tokens = 10;
            state.currency = 10_000;
        });
        engine.buy_worker("ada").unwrap();
        for plant in ["wheat", "carrot", "potato", "tomato"] {
            engine.buy_seed(plant, 1).unwrap();
        }
        for plant in ["wheat", "carrot", "potato"] {
            engine.give_seeds_to_worker("ada", plant, 1).unwrap();
        }
        assert_eq!(
            engine.give_seeds_to_worker("ada", "tomato", 1).unwrap_err(),
            Rejection::from(CapacityLimit::WorkerSeedTypes)
        );
        assert_eq!(engine.state().seeds("tomato"), 1);
    }

    #[test]
    fn prestige_clears_watering() {
        let mut engine = engine_with(FixedSource::always_fail());
        engine.buy_seed("carrot", 1).unwrap();
        engine.plant(0, "carrot").unwrap();
        engine.water(0).unwrap();
        engine.with_state_mut(|state| state.currency = 50_000);
        let outcome = engine.do_prestige(1).unwrap();
        assert_eq!(outcome.prestige_count, 1);
        assert!(engine.watering().is_idle());
        assert!(engine.state().fields[0].is_empty());
    }

    #[test]
    fn popup_opt_out_sticks() {
        let mut engine = engine_with(FixedSource::always_fail());
        engine.set_preferences(Preferences {
            milestone_popups_enabled: false,
            ..Preferences::default()
        });
        let prefs = engine.set_preferences(Preferences {
            volume: 3.0,
            ..Preferences::default()
        });
        assert!(!prefs.milestone_popups_enabled);
        assert!((prefs.volume - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut engine = engine_with(FixedSource::always_fail());
        engine.complete_tutorial();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.currency, 50);
        assert_eq!(snapshot.next_rebirth_cost, 50_000);
        assert_eq!(snapshot.fields.len(), 12);
        assert!(snapshot.active_event.is_none());
        assert!(snapshot.tutorial_complete);
        assert_eq!(engine.available_plants().len(), 9);
    }
}
