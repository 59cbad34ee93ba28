//! Farmhands: token-bought workers that grow seeds from their own buffer on
//! wall-clock jobs, independent of the field grid.
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, MilestoneKey, PlantDef, PlantId};
use crate::constants::{
    WORKER_BUFFER_BASE, WORKER_BUFFER_PER_LEVEL, WORKER_MAX_LEVEL, WORKER_MAX_SEED_TYPES,
    WORKER_MIN_LEVEL, WORKER_TIME_STEP, WORKER_VALUE_STEP,
};
use crate::error::{
    ActionResult, CapacityLimit, Currency, InvalidReason, NotFound, Rejection, require_funds,
};
use crate::numbers::{floor_f64_to_u64, scale_ms, u32_to_f64, u64_to_f64};
use crate::prestige::has_milestone;
use crate::reward::VariantCombo;
use crate::state::PlayerState;

const fn default_level() -> u32 {
    WORKER_MIN_LEVEL
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub plant: PlantId,
    pub started_at_ms: u64,
    pub duration_ms: u64,
}

impl WorkerJob {
    #[must_use]
    pub const fn ready_at_ms(&self) -> u64 {
        self.started_at_ms.saturating_add(self.duration_ms)
    }

    #[must_use]
    pub const fn is_ready(&self, now_ms: u64) -> bool {
        now_ms >= self.ready_at_ms()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedStack {
    pub plant: PlantId,
    pub amount: u64,
}

/// Lifetime counters that survive rebirth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    #[serde(default)]
    pub jobs_completed: u64,
    #[serde(default)]
    pub items_collected: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEntity {
    pub id: String,
    #[serde(default = "default_true")]
    pub unlocked: bool,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub active_jobs: Vec<WorkerJob>,
    #[serde(default)]
    pub seed_buffer: Vec<SeedStack>,
    #[serde(default = "default_true")]
    pub auto_replant: bool,
    /// Finished jobs are collected by the worker timer rather than by hand.
    #[serde(default = "default_true")]
    pub auto_collect: bool,
    #[serde(default)]
    pub stats: WorkerStats,
}

impl WorkerEntity {
    #[must_use]
    pub fn hired(id: &str) -> Self {
        Self {
            id: id.to_string(),
            unlocked: true,
            level: WORKER_MIN_LEVEL,
            active_jobs: Vec::new(),
            seed_buffer: Vec::new(),
            auto_replant: true,
            auto_collect: true,
            stats: WorkerStats::default(),
        }
    }

    const fn steps(&self) -> u32 {
        self.level.saturating_sub(WORKER_MIN_LEVEL)
    }

    /// Concurrent job slots: `1 + (level - 1) / 2`.
    #[must_use]
    pub fn capacity(&self) -> usize {
        1 + usize::try_from(self.steps() / 2).unwrap_or(0)
    }

    /// Job duration factor: `1 - 0.05 (level - 1)`.
    #[must_use]
    pub fn time_multiplier(&self) -> f64 {
        (1.0 - WORKER_TIME_STEP * u32_to_f64(self.steps())).max(0.0)
    }

    /// Sale value factor: `1 + 0.1 (level - 1)`.
    #[must_use]
    pub fn value_multiplier(&self) -> f64 {
        1.0 + WORKER_VALUE_STEP * u32_to_f64(self.steps())
    }

    /// Total seeds the buffer may hold: `20 + 10 level`.
    #[must_use]
    pub fn buffer_capacity(&self) -> u64 {
        WORKER_BUFFER_BASE + WORKER_BUFFER_PER_LEVEL * u64::from(self.level)
    }

    #[must_use]
    pub fn buffered(&self) -> u64 {
        self.seed_buffer.iter().map(|s| s.amount).sum()
    }

    #[must_use]
    pub fn has_free_slot(&self) -> bool {
        self.active_jobs.len() < self.capacity()
    }

    /// Room left for `plant`, or the limit that blocks it.
    ///
    /// # Errors
    ///
    /// Rejects a new plant type when the buffer already holds the maximum
    /// number of types, and any plant when the buffer is full.
    pub fn room_for(&self, plant: &str) -> Result<u64, CapacityLimit> {
        let known = self.seed_buffer.iter().any(|s| s.plant == plant);
        if !known && self.seed_buffer.len() >= WORKER_MAX_SEED_TYPES {
            return Err(CapacityLimit::WorkerSeedTypes);
        }
        let free = self.buffer_capacity().saturating_sub(self.buffered());
        if free == 0 {
            return Err(CapacityLimit::WorkerSeedBuffer);
        }
        Ok(free)
    }

    fn push_seeds(&mut self, plant: &str, amount: u64) {
        if let Some(stack) = self.seed_buffer.iter_mut().find(|s| s.plant == plant) {
            stack.amount += amount;
        } else {
            self.seed_buffer.push(SeedStack {
                plant: plant.to_string(),
                amount,
            });
        }
    }

    /// Take one seed from the front of the buffer.
    fn pop_seed(&mut self) -> Option<PlantId> {
        let stack = self.seed_buffer.first_mut()?;
        stack.amount -= 1;
        let plant = stack.plant.clone();
        if stack.amount == 0 {
            self.seed_buffer.remove(0);
        }
        Some(plant)
    }

    /// Start a job from the buffer if a slot is free. Returns the started job.
    ///
    /// # Errors
    ///
    /// Returns [`NotFound::Plant`] if the buffered plant is unknown; the seed
    /// stays in the buffer.
    pub fn start_next_job(
        &mut self,
        catalog: &Catalog,
        now_ms: u64,
    ) -> Result<Option<WorkerJob>, NotFound> {
        if !self.has_free_slot() {
            return Ok(None);
        }
        let Some(next) = self.seed_buffer.first() else {
            return Ok(None);
        };
        let def = catalog.plant(&next.plant)?;
        let job = WorkerJob {
            plant: def.id.clone(),
            started_at_ms: now_ms,
            duration_ms: self.job_duration(def),
        };
        self.pop_seed();
        self.active_jobs.push(job.clone());
        Ok(Some(job))
    }

    #[must_use]
    pub fn job_duration(&self, plant: &PlantDef) -> u64 {
        scale_ms(plant.capped_grow_ms(), self.time_multiplier())
    }

    /// Indices of completed jobs, ascending.
    #[must_use]
    pub fn ready_jobs(&self, now_ms: u64) -> Vec<usize> {
        self.active_jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.is_ready(now_ms))
            .map(|(index, _)| index)
            .collect()
    }
}

/// One line of a pending worker harvest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryLine {
    pub plant: PlantId,
    pub combo: VariantCombo,
    pub count: u64,
    /// Sell-now value of the whole line, worker bonus included.
    pub value: u64,
}

/// Worker harvests waiting for the player's inventory-or-sell decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    #[serde(default)]
    pub lines: Vec<SummaryLine>,
}

impl WorkerSummary {
    pub fn record(&mut self, plant: &str, combo: &VariantCombo, value: u64) {
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|l| l.plant == plant && l.combo == *combo)
        {
            line.count += 1;
            line.value = line.value.saturating_add(value);
            return;
        }
        self.lines.push(SummaryLine {
            plant: plant.to_string(),
            combo: combo.clone(),
            count: 1,
            value,
        });
    }

    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.lines.iter().map(|l| l.count).sum()
    }

    #[must_use]
    pub fn total_value(&self) -> u64 {
        self.lines
            .iter()
            .fold(0u64, |acc, l| acc.saturating_add(l.value))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Where a pending worker harvest goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryChoice {
    Inventory,
    SellNow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryResolution {
    pub choice: SummaryChoice,
    pub items: u64,
    pub earned: u64,
    pub currency: u64,
}

/// Sale value of a worker-grown item: field value scaled by the worker bonus.
#[must_use]
pub fn worker_item_value(field_value: u64, worker: &WorkerEntity) -> u64 {
    floor_f64_to_u64(u64_to_f64(field_value) * worker.value_multiplier())
}

fn owned_worker<'a>(state: &'a mut PlayerState, id: &str) -> ActionResult<&'a mut WorkerEntity> {
    state
        .worker_mut(id)
        .ok_or(Rejection::InvalidState(InvalidReason::WorkerNotOwned))
}

/// Hire a worker with tokens once the farmhands milestone is reached.
///
/// # Errors
///
/// Rejects unknown workers, a locked feature, owned workers and short token balances.
pub fn buy_worker(catalog: &Catalog, state: &mut PlayerState, id: &str) -> ActionResult<u64> {
    let def = catalog.worker(id)?;
    if !has_milestone(catalog, state.prestige_count, MilestoneKey::Farmhands) {
        return Err(InvalidReason::FeatureLocked.into());
    }
    if state.worker(id).is_some() {
        return Err(InvalidReason::WorkerOwned.into());
    }
    require_funds(Currency::Tokens, def.token_price, state.prestige_tokens)?;
    state.prestige_tokens -= def.token_price;
    state.workers.push(WorkerEntity::hired(&def.id));
    log::debug!("hired {} for {} tokens", def.id, def.token_price);
    Ok(state.prestige_tokens)
}

/// Raise a worker one level for tokens. Returns the new level.
///
/// # Errors
///
/// Rejects unknown or unowned workers, max level and short token balances.
pub fn upgrade_worker(catalog: &Catalog, state: &mut PlayerState, id: &str) -> ActionResult<u32> {
    catalog.worker(id)?;
    let level = state
        .worker(id)
        .ok_or(InvalidReason::WorkerNotOwned)?
        .level;
    if level >= WORKER_MAX_LEVEL {
        return Err(InvalidReason::MaxLevel.into());
    }
    let step = usize::try_from(level.saturating_sub(WORKER_MIN_LEVEL)).unwrap_or(usize::MAX);
    let cost = catalog
        .worker_upgrade_costs
        .get(step)
        .copied()
        .ok_or(InvalidReason::MaxLevel)?;
    require_funds(Currency::Tokens, cost, state.prestige_tokens)?;
    state.prestige_tokens -= cost;
    let worker = owned_worker(state, id)?;
    worker.level = level + 1;
    log::debug!("{id} upgraded to level {} for {cost} tokens", level + 1);
    Ok(level + 1)
}

/// Move seeds from the player's inventory into a worker's buffer.
///
/// The amount clamps to the seeds owned and to the buffer's free room.
/// Returns how many seeds moved.
///
/// # Errors
///
/// Rejects zero amounts, missing seeds, unowned workers and full buffers.
pub fn give_seeds(
    catalog: &Catalog,
    state: &mut PlayerState,
    id: &str,
    plant: &str,
    amount: u64,
) -> ActionResult<u64> {
    if amount == 0 {
        return Err(InvalidReason::ZeroAmount.into());
    }
    catalog.plant(plant)?;
    let owned = state.seeds(plant);
    if owned == 0 {
        return Err(InvalidReason::NoSeeds.into());
    }
    let room = state
        .worker(id)
        .ok_or(InvalidReason::WorkerNotOwned)?
        .room_for(plant)?;
    let moved = amount.min(owned).min(room);
    state.take_seeds(plant, moved)?;
    owned_worker(state, id)?.push_seeds(plant, moved);
    log::debug!("gave {moved} {plant} seeds to {id}");
    Ok(moved)
}

/// Start jobs on every free slot of one worker. Returns how many started.
///
/// # Errors
///
/// Rejects unowned workers and unknown buffered plants.
pub fn fill_worker_slots(
    catalog: &Catalog,
    state: &mut PlayerState,
    id: &str,
    now_ms: u64,
) -> ActionResult<usize> {
    let worker = owned_worker(state, id)?;
    let mut started = 0;
    while worker.start_next_job(catalog, now_ms)?.is_some() {
        started += 1;
    }
    Ok(started)
}

/// Periodic pass: each auto-replanting worker starts at most one job.
pub fn auto_replant_pass(catalog: &Catalog, state: &mut PlayerState, now_ms: u64) -> usize {
    let mut started = 0;
    for worker in state.workers.iter_mut().filter(|w| w.auto_replant) {
        match worker.start_next_job(catalog, now_ms) {
            Ok(Some(job)) => {
                log::debug!("{} started {} for {} ms", worker.id, job.plant, job.duration_ms);
                started += 1;
            }
            Ok(None) => {}
            Err(missing) => log::error!("{} cannot start a job: {missing}", worker.id),
        }
    }
    started
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::standard;

    fn farmhand_state() -> PlayerState {
        let mut state = PlayerState::fresh(0);
        state.prestige_count = 3;
        state.prestige_tokens = 100;
        state
    }

    #[test]
    fn level_formulas() {
        let mut worker = WorkerEntity::hired("ada");
        assert_eq!(worker.capacity(), 1);
        assert!((worker.time_multiplier() - 1.0).abs() < f64::EPSILON);
        assert_eq!(worker.buffer_capacity(), 30);
        worker.level = 3;
        assert_eq!(worker.capacity(), 2);
        assert!((worker.time_multiplier() - 0.9).abs() < 1e-12);
        assert!((worker.value_multiplier() - 1.2).abs() < 1e-12);
        worker.level = 10;
        assert_eq!(worker.capacity(), 5);
        assert_eq!(worker.buffer_capacity(), 120);
    }

    #[test]
    fn hiring_needs_the_milestone_and_tokens() {
        let catalog = standard();
        let mut state = PlayerState::fresh(0);
        state.prestige_tokens = 100;
        assert_eq!(
            buy_worker(catalog, &mut state, "ada").unwrap_err(),
            Rejection::from(InvalidReason::FeatureLocked)
        );
        state.prestige_count = 3;
        assert_eq!(buy_worker(catalog, &mut state, "ada").unwrap(), 97);
        assert_eq!(
            buy_worker(catalog, &mut state, "ada").unwrap_err(),
            Rejection::from(InvalidReason::WorkerOwned)
        );
        assert!(buy_worker(catalog, &mut state, "zed").unwrap_err().is_not_found());
    }

    #[test]
    fn upgrades_walk_the_cost_table_to_max() {
        let catalog = standard();
        let mut state = farmhand_state();
        state.prestige_tokens = 1_000;
        buy_worker(catalog, &mut state, "ada").unwrap();
        for expected in 2..=WORKER_MAX_LEVEL {
            assert_eq!(upgrade_worker(catalog, &mut state, "ada").unwrap(), expected);
        }
        assert_eq!(state.prestige_tokens, 1_000 - 3 - 158);
        assert_eq!(
            upgrade_worker(catalog, &mut state, "ada").unwrap_err(),
            Rejection::from(InvalidReason::MaxLevel)
        );
        assert_eq!(
            upgrade_worker(catalog, &mut state, "bram").unwrap_err(),
            Rejection::from(InvalidReason::WorkerNotOwned)
        );
    }

    #[test]
    fn seed_buffer_limits_types_and_clamps() {
        let catalog = standard();
        let mut state = farmhand_state();
        buy_worker(catalog, &mut state, "ada").unwrap();
        for plant in ["wheat", "carrot", "potato", "tomato"] {
            state.add_seeds(plant, 50);
        }
        assert_eq!(give_seeds(catalog, &mut state, "ada", "wheat", 5).unwrap(), 5);
        assert_eq!(give_seeds(catalog, &mut state, "ada", "carrot", 5).unwrap(), 5);
        assert_eq!(give_seeds(catalog, &mut state, "ada", "potato", 5).unwrap(), 5);
        let before = state.clone();
        assert_eq!(
            give_seeds(catalog, &mut state, "ada", "tomato", 1).unwrap_err(),
            Rejection::from(CapacityLimit::WorkerSeedTypes)
        );
        assert_eq!(state, before);

        // 30 capacity, 15 buffered: a request for 40 moves 15.
        assert_eq!(give_seeds(catalog, &mut state, "ada", "wheat", 40).unwrap(), 15);
        assert_eq!(state.seeds("wheat"), 30);
        assert_eq!(
            give_seeds(catalog, &mut state, "ada", "wheat", 1).unwrap_err(),
            Rejection::from(CapacityLimit::WorkerSeedBuffer)
        );
        assert_eq!(
            give_seeds(catalog, &mut state, "ada", "corn", 1).unwrap_err(),
            Rejection::from(InvalidReason::NoSeeds)
        );
    }

    #[test]
    fn jobs_start_from_buffer_and_respect_slots() {
        let catalog = standard();
        let mut state = farmhand_state();
        buy_worker(catalog, &mut state, "ada").unwrap();
        state.add_seeds("carrot", 3);
        give_seeds(catalog, &mut state, "ada", "carrot", 3).unwrap();

        assert_eq!(auto_replant_pass(catalog, &mut state, 1_000), 1);
        assert_eq!(auto_replant_pass(catalog, &mut state, 3_000), 0);
        let worker = state.worker("ada").unwrap();
        assert_eq!(worker.active_jobs[0].duration_ms, 60_000);
        assert_eq!(worker.buffered(), 2);
        assert!(worker.ready_jobs(60_999).is_empty());
        assert_eq!(worker.ready_jobs(61_000), vec![0]);

        state.worker_mut("ada").unwrap().level = 3;
        assert_eq!(fill_worker_slots(catalog, &mut state, "ada", 2_000).unwrap(), 1);
        let worker = state.worker("ada").unwrap();
        assert_eq!(worker.active_jobs[1].duration_ms, 54_000);
    }

    #[test]
    fn summary_merges_lines() {
        let mut summary = WorkerSummary::default();
        let gold = VariantCombo::single("gold");
        summary.record("corn", &gold, 100);
        summary.record("corn", &gold, 100);
        summary.record("corn", &VariantCombo::normal(), 40);
        assert_eq!(summary.lines.len(), 2);
        assert_eq!(summary.total_items(), 3);
        assert_eq!(summary.total_value(), 240);
        let worker = WorkerEntity {
            level: 3,
            ..WorkerEntity::hired("ada")
        };
        assert_eq!(worker_item_value(100, &worker), 120);
    }
}
