//! `FarmSession`: an engine bound to storage and the periodic timers.
use serde::Serialize;

use crate::GameStorage;
use crate::engine::{EngineConfig, FarmEngine, HarvestOutcome, WaterOutcome, WorkerCollection};
use crate::error::{ActionResult, PersistenceError};
use crate::events::EventChange;
use crate::offline::{OfflineReport, reconcile};
use crate::persistence::SaveAdapter;
use crate::prestige::PrestigeOutcome;
use crate::schedule::{Scheduler, TimerKind};
use crate::state::PlayerState;

/// How the session started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BootReport {
    /// No readable save was found.
    pub first_run: bool,
    pub migrated_from: Option<u32>,
    /// Catch-up applied for the time the game was closed.
    pub offline: Option<OfflineReport>,
    /// Blobs copied to their backup keys because this build could not read
    /// the save.
    pub backed_up: usize,
    /// The save could not be read or backed up, so nothing is written until
    /// [`FarmSession::release_saves`].
    pub saves_held: bool,
}

/// Everything the timers did during one [`FarmSession::advance_to`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceReport {
    pub growth_ticks: u32,
    pub fields_ripened: Vec<usize>,
    pub events: Vec<EventChange>,
    pub harvests: Vec<HarvestOutcome>,
    pub waterings: Vec<WaterOutcome>,
    pub worker_collections: Vec<WorkerCollection>,
    pub jobs_started: usize,
    pub saves: u32,
    pub save_failures: u32,
}

#[derive(Debug)]
pub struct FarmSession<S: GameStorage> {
    engine: FarmEngine,
    saves: SaveAdapter<S>,
    scheduler: Scheduler,
    boot: BootReport,
}

impl<S: GameStorage> FarmSession<S> {
    /// Load (or start) a game at `now_ms`, apply offline catch-up once and
    /// write the result straight back.
    ///
    /// A damaged save is replaced by a new farm. A save from a newer build
    /// or one that fails to migrate is copied to backup keys first. When the
    /// backend cannot be read, or the backup fails, the new farm runs
    /// without saving so the stored save stays untouched.
    #[must_use]
    pub fn boot(storage: S, config: EngineConfig, now_ms: u64) -> Self {
        let saves = SaveAdapter::new(storage);
        let mut boot = BootReport {
            first_run: true,
            migrated_from: None,
            offline: None,
            backed_up: 0,
            saves_held: false,
        };
        let loaded = match saves.try_load() {
            Ok(loaded) => loaded,
            Err(err) if err.is_damaged() => {
                log::warn!("save is damaged, starting a new farm: {err}");
                None
            }
            Err(err @ PersistenceError::Storage(_)) => {
                log::error!("save could not be read, holding saves: {err}");
                boot.saves_held = true;
                None
            }
            Err(err) => {
                match saves.back_up() {
                    Ok(copied) => {
                        log::warn!("save unreadable ({err}), kept {copied} blob(s) as backups");
                        boot.backed_up = copied;
                    }
                    Err(backup_err) => {
                        log::error!(
                            "save unreadable ({err}) and not backed up ({backup_err}), holding saves"
                        );
                        boot.saves_held = true;
                    }
                }
                None
            }
        };
        let engine = match loaded {
            Some(loaded) => {
                let mut state = loaded.state;
                boot.offline = Some(reconcile(&mut state, now_ms));
                boot.first_run = false;
                boot.migrated_from = loaded.migrated_from;
                FarmEngine::from_state(state, loaded.prefs, now_ms)
            }
            None => {
                log::info!("no readable save, starting a new farm");
                FarmEngine::new(config, now_ms)
            }
        };
        let mut session = Self {
            engine,
            saves,
            scheduler: Scheduler::new(now_ms),
            boot,
        };
        session.save_now();
        session
    }

    /// Let saves overwrite the stored save that could not be read at boot.
    pub fn release_saves(&mut self) {
        if self.boot.saves_held {
            log::info!("saves released, the unread save will be replaced");
        }
        self.boot.saves_held = false;
    }

    #[must_use]
    pub const fn boot_report(&self) -> &BootReport {
        &self.boot
    }

    #[must_use]
    pub const fn engine(&self) -> &FarmEngine {
        &self.engine
    }

    #[must_use]
    pub const fn state(&self) -> &PlayerState {
        self.engine.state()
    }

    /// Run an operation against the engine at its current clock.
    pub fn with_engine_mut<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut FarmEngine) -> R,
    {
        f(&mut self.engine)
    }

    /// Catch the timers up to `now_ms`, then run an operation at that time.
    pub fn act<F, R>(&mut self, now_ms: u64, f: F) -> (AdvanceReport, R)
    where
        F: FnOnce(&mut FarmEngine) -> R,
    {
        let report = self.advance_to(now_ms);
        (report, f(&mut self.engine))
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        self.saves.storage()
    }

    #[must_use]
    pub fn into_state(self) -> PlayerState {
        self.engine.into_state()
    }

    /// Fire every timer due up to `now_ms` in time order, each with the
    /// engine clock set to its due time.
    pub fn advance_to(&mut self, now_ms: u64) -> AdvanceReport {
        let mut report = AdvanceReport::default();
        while let Some((kind, due_ms)) = self.scheduler.pop_due(now_ms) {
            self.engine.set_clock(due_ms);
            match kind {
                TimerKind::Growth => {
                    let tick = self.engine.growth_tick();
                    report.growth_ticks += 1;
                    report.fields_ripened.extend(tick.fields_ripened);
                    report.events.extend(tick.event);
                }
                TimerKind::AutoHarvest => report.harvests.extend(self.engine.auto_harvest_pass()),
                TimerKind::AutoWater => report.waterings.extend(self.engine.auto_water_pass()),
                TimerKind::Workers => {
                    report
                        .worker_collections
                        .extend(self.engine.auto_collect_pass());
                    report.jobs_started += self.engine.worker_pass();
                }
                TimerKind::Autosave => {
                    if self.save_now() {
                        report.saves += 1;
                    } else {
                        report.save_failures += 1;
                    }
                }
            }
        }
        self.engine.set_clock(now_ms);
        report
    }

    /// Stamp the save time, move the rolls onto the next seed and write
    /// every blob. A failure is logged and left for the next autosave to
    /// retry.
    pub fn save_now(&mut self) -> bool {
        let now = self.engine.now_ms();
        self.engine.with_state_mut(|state| state.last_saved_at_ms = now);
        self.engine.rotate_seed();
        if self.boot.saves_held {
            log::debug!("save skipped, saves are held");
            return false;
        }
        match self.saves.save(self.engine.state(), self.engine.prefs()) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("save failed, retrying on the next autosave: {err}");
                false
            }
        }
    }

    /// Rebirth and save immediately.
    ///
    /// # Errors
    ///
    /// See [`FarmEngine::do_prestige`].
    pub fn do_prestige(&mut self, steps: u32) -> ActionResult<PrestigeOutcome> {
        let outcome = self.engine.do_prestige(steps)?;
        self.save_now();
        Ok(outcome)
    }

    /// Final catch-up and save. Returns whether the save succeeded.
    pub fn shutdown(mut self, now_ms: u64) -> bool {
        self.advance_to(now_ms);
        self.save_now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::STATE_KEY;
    use crate::persistence::MemoryStorage;
    use crate::rng::next_seed;

    const CONFIG: EngineConfig = EngineConfig { seed: 11 };

    #[test]
    fn first_boot_writes_a_save() {
        let storage = MemoryStorage::new();
        let session = FarmSession::boot(storage.clone(), CONFIG, 1_000);
        assert!(session.boot_report().first_run);
        assert!(session.boot_report().offline.is_none());
        assert!(storage.get(STATE_KEY).is_some());
        assert_eq!(session.state().seed, next_seed(11, 1_000));
    }

    #[test]
    fn advancing_runs_growth_and_autosave() {
        let storage = MemoryStorage::new();
        let mut session = FarmSession::boot(storage, CONFIG, 0);
        session.with_engine_mut(|engine| {
            engine.buy_seed("carrot", 1).unwrap();
            engine.plant(0, "carrot").unwrap();
        });

        let report = session.advance_to(1_000);
        assert_eq!(report.growth_ticks, 1);
        assert_eq!(session.state().fields[0].remaining_grow_ms, 59_000);

        let report = session.advance_to(5_000);
        assert_eq!(report.growth_ticks, 4);
        assert_eq!(report.saves, 1);
        assert_eq!(session.state().last_saved_at_ms, 5_000);
        assert_eq!(session.engine().now_ms(), 5_000);
    }

    #[test]
    fn reboot_applies_offline_growth_once() {
        let storage = MemoryStorage::new();
        let mut session = FarmSession::boot(storage.clone(), CONFIG, 0);
        session.with_engine_mut(|engine| {
            engine.buy_seed("carrot", 1).unwrap();
            engine.plant(0, "carrot").unwrap();
        });
        assert!(session.shutdown(0));

        let resumed = FarmSession::boot(storage.clone(), CONFIG, 100_000);
        let offline = resumed.boot_report().offline.unwrap();
        assert!(!resumed.boot_report().first_run);
        assert_eq!(offline.effective_ms, 50_000);
        assert_eq!(resumed.state().fields[0].remaining_grow_ms, 10_000);
        drop(resumed);

        let again = FarmSession::boot(storage, CONFIG, 100_000);
        assert_eq!(again.boot_report().offline.unwrap().effective_ms, 0);
        assert_eq!(again.state().fields[0].remaining_grow_ms, 10_000);
    }

    #[test]
    fn act_catches_up_before_the_operation() {
        let mut session = FarmSession::boot(MemoryStorage::new(), CONFIG, 0);
        session.with_engine_mut(|engine| {
            engine.buy_seed("wheat", 1).unwrap();
            engine.plant(0, "wheat").unwrap();
        });
        let (report, harvest) = session.act(30_000, |engine| engine.harvest(0));
        assert_eq!(report.fields_ripened, vec![0]);
        assert!(harvest.is_ok());
    }
}
