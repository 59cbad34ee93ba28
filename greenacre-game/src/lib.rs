//! Greenacre Game Engine
//!
//! Platform-agnostic progression and simulation engine for the Greenacre idle
//! farming game. This crate provides field growth, the variant reward model,
//! prestige, automation, workers, offline catch-up and save handling without
//! any UI or platform-specific dependencies.

pub mod automation;
pub mod catalog;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod field;
pub mod market;
pub mod numbers;
pub mod offline;
pub mod persistence;
pub mod prestige;
pub mod reward;
pub mod rng;
pub mod schedule;
pub mod session;
pub mod state;
pub mod upgrades;
pub mod watering;
pub mod workers;

// Re-export commonly used types
pub use automation::{AutoSellMode, AutomationSettings, AutomationToggle};
pub use catalog::{
    AutomationFeature, Catalog, CatalogError, EventDef, MilestoneKey, PlantDef, PlantId, ShopTrack,
    VariantDef, VariantId, WaterTrack,
};
pub use engine::{
    EngineConfig, FarmEngine, FarmSnapshot, HarvestOutcome, PlantOutcome, TickReport,
    WaterOutcome, WorkerCollection,
};
pub use error::{
    ActionResult, CapacityLimit, Currency, InvalidReason, NotFound, PersistenceError, Rejection,
};
pub use events::{ActiveEvent, EventChange};
pub use field::{Field, FieldProgress};
pub use market::{FieldPurchase, SaleOutcome, SeedPurchase, SellFilter};
pub use offline::OfflineReport;
pub use persistence::{LoadedSave, MemoryStorage, SaveAdapter};
pub use prestige::{PrestigeOutcome, PrestigePlan, PrestigePreview, rebirth_cost};
pub use reward::{RollContext, VariantCombo, calculate_value, roll_stacked, roll_variant};
pub use rng::{RandomSource, RngBundle, RngStream};
pub use schedule::{Scheduler, TimerKind};
pub use session::{AdvanceReport, BootReport, FarmSession};
pub use state::{HarvestInventory, LifetimeStats, PlayerState, Preferences};
pub use upgrades::UpgradePurchase;
pub use workers::{SummaryChoice, SummaryResolution, WorkerEntity, WorkerSummary};

/// Trait for abstracting durable key-value storage
/// Platform-specific implementations should provide this
pub trait GameStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the blob stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Store a blob under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be written.
    fn write(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Remove the blob under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be removed.
    fn clear(&self, key: &str) -> Result<(), Self::Error>;
}

impl<T: GameStorage + ?Sized> GameStorage for &T {
    type Error = T::Error;

    fn read(&self, key: &str) -> Result<Option<String>, Self::Error> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        (**self).write(key, value)
    }

    fn clear(&self, key: &str) -> Result<(), Self::Error> {
        (**self).clear(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::fmt;

    #[derive(Debug)]
    struct Offline;

    impl fmt::Display for Offline {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("storage offline")
        }
    }

    impl std::error::Error for Offline {}

    /// Backend whose writes fail until switched back on, and whose next
    /// `failing_reads` reads fail.
    #[derive(Debug, Default)]
    struct FlakyStorage {
        blobs: RefCell<HashMap<String, String>>,
        offline: Cell<bool>,
        failing_reads: Cell<u32>,
    }

    impl GameStorage for FlakyStorage {
        type Error = Offline;

        fn read(&self, key: &str) -> Result<Option<String>, Self::Error> {
            if self.failing_reads.get() > 0 {
                self.failing_reads.set(self.failing_reads.get() - 1);
                return Err(Offline);
            }
            Ok(self.blobs.borrow().get(key).cloned())
        }

        fn write(&self, key: &str, value: &str) -> Result<(), Self::Error> {
            if self.offline.get() {
                return Err(Offline);
            }
            self.blobs
                .borrow_mut()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn clear(&self, key: &str) -> Result<(), Self::Error> {
            self.blobs.borrow_mut().remove(key);
            Ok(())
        }
    }

    #[test]
    fn session_round_trips_through_a_borrowed_backend() {
        let storage = FlakyStorage::default();
        let mut session = FarmSession::boot(&storage, EngineConfig { seed: 3 }, 0);
        session.with_engine_mut(|engine| {
            engine.buy_seed("wheat", 2).unwrap();
        });
        assert!(session.shutdown(1_000));

        let resumed = FarmSession::boot(&storage, EngineConfig::default(), 2_000);
        assert!(!resumed.boot_report().first_run);
        assert_eq!(resumed.state().seeds("wheat"), 2);
        assert_ne!(resumed.state().seed, 3);
    }

    #[test]
    fn unreadable_backend_never_overwrites_the_save() {
        let storage = FlakyStorage::default();
        let mut session = FarmSession::boot(&storage, EngineConfig { seed: 3 }, 0);
        session.with_engine_mut(|engine| {
            engine.with_state_mut(|state| {
                state.currency = 123_456;
                state.prestige_count = 7;
            });
        });
        assert!(session.shutdown(1_000));
        let stored = storage.blobs.borrow().clone();

        storage.failing_reads.set(1);
        let mut blind = FarmSession::boot(&storage, EngineConfig::default(), 2_000);
        assert!(blind.boot_report().first_run);
        assert!(blind.boot_report().saves_held);
        assert_eq!(blind.state().currency, 50);
        let report = blind.advance_to(10_000);
        assert_eq!((report.saves, report.save_failures), (0, 1));
        assert!(!blind.shutdown(12_000));
        assert_eq!(*storage.blobs.borrow(), stored);

        let resumed = FarmSession::boot(&storage, EngineConfig::default(), 20_000);
        assert!(!resumed.boot_report().saves_held);
        assert_eq!(resumed.state().currency, 123_456);
        assert_eq!(resumed.state().prestige_count, 7);
    }

    #[test]
    fn released_saves_replace_the_unread_save() {
        let storage = FlakyStorage::default();
        let mut session = FarmSession::boot(&storage, EngineConfig::default(), 0);
        session.with_engine_mut(|engine| engine.with_state_mut(|state| state.currency = 900));
        assert!(session.shutdown(1_000));

        storage.failing_reads.set(1);
        let mut blind = FarmSession::boot(&storage, EngineConfig::default(), 2_000);
        assert!(!blind.save_now());
        blind.release_saves();
        assert!(blind.save_now());
        let loaded = SaveAdapter::new(&storage).load().unwrap();
        assert_eq!(loaded.state.currency, 50);
    }

    #[test]
    fn failed_autosaves_are_retried() {
        let storage = FlakyStorage::default();
        let mut session = FarmSession::boot(&storage, EngineConfig::default(), 0);
        storage.offline.set(true);
        let report = session.advance_to(5_000);
        assert_eq!(report.save_failures, 1);

        storage.offline.set(false);
        let report = session.advance_to(10_000);
        assert_eq!(report.saves, 1);
        let loaded = SaveAdapter::new(&storage).load().unwrap();
        assert_eq!(loaded.state.last_saved_at_ms, 10_000);
    }
}
