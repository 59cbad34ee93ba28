//! Centralized balance and tuning constants for Greenacre engine logic.
//!
//! Catalog content (plants, variants, tracks) lives in [`crate::catalog`];
//! the values here are the fixed mechanics around it. Keeping them together
//! means pacing only changes through reviewed code.

// Clock --------------------------------------------------------------------
pub const TICK_MS: u64 = 1_000;
pub const AUTO_HARVEST_INTERVAL_MS: u64 = 500;
pub const AUTO_HARVEST_MIN_GAP_MS: u64 = 1_000;
pub const AUTO_WATER_INTERVAL_MS: u64 = 1_000;
pub const AUTO_WATER_MIN_GAP_MS: u64 = 3_000;
pub const AUTO_WATER_MIN_REMAINING_MS: u64 = 10_000;
pub const WORKER_TICK_MS: u64 = 2_000;
pub const AUTOSAVE_INTERVAL_MS: u64 = 5_000;

// Field simulation ---------------------------------------------------------
pub const MAX_GROW_CAP_MS: u64 = 3_600_000;
pub const STAGE_TWO_PROGRESS: f64 = 0.33;
pub const STAGE_THREE_PROGRESS: f64 = 0.66;
pub const MAX_FIELDS: usize = 12;
pub const BASE_START_FIELDS: usize = 3;
pub const FIELD_BASE_COST: u64 = 250;
pub const FIELD_COST_GROWTH: f64 = 3.0;

// Reward model -------------------------------------------------------------
pub const NORMAL_VARIANT: &str = "normal";
pub const COMBO_SEPARATOR: char = '+';
pub const MAX_STACKED_VARIANTS: usize = 3;
pub const STACK_SECOND_ROLL_SCALAR: f64 = 0.4;
pub const STACK_THIRD_ROLL_SCALAR: f64 = 0.15;
pub const EVENT_FOCUS_MULTIPLIER: f64 = 4.0;
pub const EVENT_OTHER_MULTIPLIER: f64 = 2.0;
pub const PRESTIGE_VALUE_STEP: f64 = 0.1;
pub const INDEX_BONUS_STEP: f64 = 0.01;
pub const INDEX_BONUS_BUCKETS: f64 = 10.0;
/// Lowest variant counted as "rare" by the rare-only auto-sell mode.
pub const RARE_AUTO_SELL_FLOOR: &str = "gold";

// Timed events -------------------------------------------------------------
pub const EVENT_DURATION_MS: u64 = 300_000;
pub const EVENT_INTERVAL_MS: u64 = 1_800_000;

// Watering -----------------------------------------------------------------
pub const WATER_CHAIN_WINDOW_MS: u64 = 2_000;
pub const WATER_CHAIN_STEP_MS: u64 = 250;
pub const WATER_CHAIN_MAX_STEPS: u32 = 8;

// Prestige -----------------------------------------------------------------
pub const REBIRTH_BASE_COST: u64 = 50_000;
pub const REBIRTH_COST_GROWTH: f64 = 1.35;
pub const BASE_STARTING_CURRENCY: u64 = 50;

// Offline ------------------------------------------------------------------
pub const MAX_OFFLINE_HOURS: u64 = 12;
pub const MS_PER_HOUR: u64 = 3_600_000;
pub const BASE_OFFLINE_EFFICIENCY: f64 = 0.5;
pub const OFFLINE_TIER_STEP: f64 = 0.1;

// Workers ------------------------------------------------------------------
pub const WORKER_MIN_LEVEL: u32 = 1;
pub const WORKER_MAX_LEVEL: u32 = 10;
pub const WORKER_MAX_SEED_TYPES: usize = 3;
pub const WORKER_BUFFER_BASE: u64 = 20;
pub const WORKER_BUFFER_PER_LEVEL: u64 = 10;
pub const WORKER_TIME_STEP: f64 = 0.05;
pub const WORKER_VALUE_STEP: f64 = 0.1;

// Persistence --------------------------------------------------------------
pub const STATE_KEY: &str = "greenacre.state.v3";
pub const HARVEST_KEY: &str = "greenacre.harvest.v3";
pub const PREFS_KEY: &str = "greenacre.prefs.v2";
pub const LEGACY_STATE_KEYS: &[&str] = &["greenacre.state.v2", "greenacre.save"];
pub const LEGACY_PREFS_KEYS: &[&str] = &["greenacre.sound"];
pub const BACKUP_SUFFIX: &str = ".backup";
pub const CURRENT_SAVE_VERSION: u32 = 3;
