//! Save blobs over a [`GameStorage`] backend.
//!
//! Current saves live under three keys, each wrapped in a checksummed
//! envelope. Older layouts are found under legacy keys, upgraded through an
//! ordered chain of JSON rewrites, written back under the current keys and
//! then cleared.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::Infallible;
use std::hash::Hasher;
use std::rc::Rc;
use twox_hash::XxHash64;

use crate::GameStorage;
use crate::constants::{
    BACKUP_SUFFIX, CURRENT_SAVE_VERSION, HARVEST_KEY, LEGACY_PREFS_KEYS, LEGACY_STATE_KEYS,
    PREFS_KEY, STATE_KEY,
};
use crate::error::PersistenceError;
use crate::state::{HarvestInventory, PlayerState, Preferences};

/// XxHash64 (seed 0) of a payload string.
#[must_use]
pub fn checksum(payload: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(payload.as_bytes());
    hasher.finish()
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    checksum: u64,
    payload: String,
}

impl Envelope {
    fn seal(payload: String) -> Self {
        Self {
            version: CURRENT_SAVE_VERSION,
            checksum: checksum(&payload),
            payload,
        }
    }

    fn open(raw: &str, key: &str) -> Result<(u32, String), PersistenceError> {
        let envelope: Self = serde_json::from_str(raw).map_err(corrupt(key))?;
        if checksum(&envelope.payload) != envelope.checksum {
            return Err(PersistenceError::Checksum {
                key: key.to_string(),
            });
        }
        if envelope.version > CURRENT_SAVE_VERSION {
            return Err(PersistenceError::FutureVersion(envelope.version));
        }
        Ok((envelope.version, envelope.payload))
    }
}

fn corrupt(key: &str) -> impl FnOnce(serde_json::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Corrupt {
        key: key.to_string(),
        source,
    }
}

/// Key a blob is copied to by [`SaveAdapter::back_up`].
#[must_use]
pub fn backup_key(key: &str) -> String {
    format!("{key}{BACKUP_SUFFIX}")
}

fn storage_error<E>(err: E) -> PersistenceError
where
    E: std::error::Error + Send + Sync + 'static,
{
    PersistenceError::Storage(anyhow::Error::new(err))
}

/// Values lifted out of the state blob by migrations and stored elsewhere now.
#[derive(Debug, Default)]
struct Carried {
    harvested: Option<Value>,
    sound_enabled: Option<bool>,
}

type MigrationStep = fn(&mut Map<String, Value>, &mut Carried);

/// Each entry upgrades a blob from the listed version to the next one.
const MIGRATIONS: [(u32, MigrationStep); 2] = [(1, migrate_v1_to_v2), (2, migrate_v2_to_v3)];

fn rename(blob: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = blob.remove(from) {
        blob.entry(to).or_insert(value);
    }
}

/// v1 used camel-cased keys, had no field ownership flag and a single
/// automation boolean.
fn migrate_v1_to_v2(blob: &mut Map<String, Value>, _carried: &mut Carried) {
    rename(blob, "coins", "currency");
    rename(blob, "rebirths", "prestige_count");
    if let Some(auto_harvest) = blob.remove("autoHarvest") {
        let mut automation = Map::new();
        automation.insert("auto_harvest".to_string(), auto_harvest);
        blob.insert("automation".to_string(), Value::Object(automation));
    }
    if let Some(Value::Array(fields)) = blob.get_mut("fields") {
        for field in fields.iter_mut().filter_map(Value::as_object_mut) {
            field.entry("unlocked").or_insert(Value::Bool(true));
        }
    }
    blob.insert("version".to_string(), Value::from(2));
}

/// v3 split the harvest inventory and the sound flag into their own blobs.
fn migrate_v2_to_v3(blob: &mut Map<String, Value>, carried: &mut Carried) {
    if let Some(harvested) = blob.remove("harvested") {
        carried.harvested = Some(harvested);
    }
    if let Some(sound) = blob.remove("sound_on") {
        carried.sound_enabled = sound.as_bool();
    }
    blob.entry("workers").or_insert_with(|| Value::Array(Vec::new()));
    blob.entry("automation").or_insert_with(|| Value::Object(Map::new()));
    blob.remove("version");
}

fn migrate(value: Value, from: u32) -> Result<(Value, Carried), PersistenceError> {
    let Value::Object(mut blob) = value else {
        return Err(PersistenceError::Migration {
            from,
            reason: "save is not a JSON object".to_string(),
        });
    };
    let mut carried = Carried::default();
    let mut version = from;
    while version < CURRENT_SAVE_VERSION {
        let (_, step) = MIGRATIONS
            .iter()
            .find(|(step_from, _)| *step_from == version)
            .ok_or_else(|| PersistenceError::Migration {
                from: version,
                reason: "no migration step".to_string(),
            })?;
        step(&mut blob, &mut carried);
        log::debug!("save migrated v{version} -> v{}", version + 1);
        version += 1;
    }
    Ok((Value::Object(blob), carried))
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, PersistenceError> {
    serde_json::from_value(value).map_err(corrupt(key))
}

/// A save found in storage.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSave {
    pub state: PlayerState,
    pub prefs: Preferences,
    /// Set when the save came through the migration chain.
    pub migrated_from: Option<u32>,
}

/// Reads and writes the save blobs through a storage backend.
#[derive(Debug)]
pub struct SaveAdapter<S> {
    storage: S,
}

impl<S: GameStorage> SaveAdapter<S> {
    #[must_use]
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    #[must_use]
    pub fn into_inner(self) -> S {
        self.storage
    }

    /// Load the save, or `None` for a first run.
    ///
    /// Unreadable saves (corrupt JSON, checksum mismatch, a version from a
    /// newer build, backend failures) are logged and treated as a first run.
    #[must_use]
    pub fn load(&self) -> Option<LoadedSave> {
        match self.try_load() {
            Ok(loaded) => loaded,
            Err(err) => {
                log::warn!("save could not be read, starting fresh: {err}");
                None
            }
        }
    }

    /// Load the save, reporting why it could not be read.
    ///
    /// # Errors
    ///
    /// Returns the first [`PersistenceError`] hit while reading the state blob
    /// or while writing back a migrated legacy save.
    pub fn try_load(&self) -> Result<Option<LoadedSave>, PersistenceError> {
        if let Some(raw) = self.read(STATE_KEY)? {
            let (version, payload) = Envelope::open(&raw, STATE_KEY)?;
            let value: Value = serde_json::from_str(&payload).map_err(corrupt(STATE_KEY))?;
            let loaded = self.assemble(STATE_KEY, value, version)?;
            return Ok(Some(loaded));
        }

        for key in LEGACY_STATE_KEYS {
            let Some(raw) = self.read(key)? else {
                continue;
            };
            let value: Value = serde_json::from_str(&raw).map_err(corrupt(key))?;
            let version = value
                .get("version")
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(1);
            if version > CURRENT_SAVE_VERSION {
                return Err(PersistenceError::FutureVersion(version));
            }
            let loaded = self.assemble(key, value, version)?;
            self.save(&loaded.state, &loaded.prefs)?;
            self.clear(key)?;
            for prefs_key in LEGACY_PREFS_KEYS {
                self.clear(prefs_key)?;
            }
            log::info!("migrated save from `{key}` (version {version})");
            return Ok(Some(loaded));
        }
        Ok(None)
    }

    fn assemble(
        &self,
        key: &str,
        value: Value,
        version: u32,
    ) -> Result<LoadedSave, PersistenceError> {
        let (value, carried) = migrate(value, version)?;
        let mut state: PlayerState = decode(key, value)?;
        state.harvested = match carried.harvested {
            Some(inline) => decode(key, inline)?,
            None => self.load_harvest(),
        };
        Ok(LoadedSave {
            state,
            prefs: self.load_prefs(carried.sound_enabled),
            migrated_from: (version < CURRENT_SAVE_VERSION).then_some(version),
        })
    }

    fn load_harvest(&self) -> HarvestInventory {
        self.read_harvest().unwrap_or_else(|err| {
            log::warn!("harvest inventory unreadable, starting empty: {err}");
            HarvestInventory::default()
        })
    }

    fn read_harvest(&self) -> Result<HarvestInventory, PersistenceError> {
        let Some(raw) = self.read(HARVEST_KEY)? else {
            return Ok(HarvestInventory::default());
        };
        let (_, payload) = Envelope::open(&raw, HARVEST_KEY)?;
        serde_json::from_str(&payload).map_err(corrupt(HARVEST_KEY))
    }

    fn load_prefs(&self, legacy_sound: Option<bool>) -> Preferences {
        match self.read_prefs() {
            Ok(Some(prefs)) => prefs.sanitized(),
            Ok(None) => Preferences {
                sound_enabled: legacy_sound.unwrap_or(true),
                ..Preferences::default()
            },
            Err(err) => {
                log::warn!("preferences unreadable, using defaults: {err}");
                Preferences::default()
            }
        }
    }

    fn read_prefs(&self) -> Result<Option<Preferences>, PersistenceError> {
        if let Some(raw) = self.read(PREFS_KEY)? {
            let (_, payload) = Envelope::open(&raw, PREFS_KEY)?;
            return serde_json::from_str(&payload)
                .map(Some)
                .map_err(corrupt(PREFS_KEY));
        }
        for key in LEGACY_PREFS_KEYS {
            let Some(raw) = self.read(key)? else {
                continue;
            };
            // The oldest builds stored a bare sound flag.
            let prefs = match serde_json::from_str::<Value>(&raw).map_err(corrupt(key))? {
                Value::Bool(sound_enabled) => Preferences {
                    sound_enabled,
                    ..Preferences::default()
                },
                other => decode(key, other)?,
            };
            return Ok(Some(prefs));
        }
        Ok(None)
    }

    /// Write state, harvest inventory and preferences.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Storage`] when the backend rejects a write
    /// and [`PersistenceError::Serialize`] if a blob cannot be encoded.
    pub fn save(&self, state: &PlayerState, prefs: &Preferences) -> Result<(), PersistenceError> {
        self.write_blob(STATE_KEY, state)?;
        self.write_blob(HARVEST_KEY, &state.harvested)?;
        self.write_blob(PREFS_KEY, prefs)
    }

    /// Copy every save blob present, current and legacy, to its
    /// [`backup_key`]. Returns how many were copied.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Storage`] if a blob cannot be read or
    /// copied.
    pub fn back_up(&self) -> Result<usize, PersistenceError> {
        let keys = [STATE_KEY, HARVEST_KEY, PREFS_KEY]
            .into_iter()
            .chain(LEGACY_STATE_KEYS.iter().copied())
            .chain(LEGACY_PREFS_KEYS.iter().copied());
        let mut copied = 0;
        for key in keys {
            if let Some(raw) = self.read(key)? {
                self.storage
                    .write(&backup_key(key), &raw)
                    .map_err(storage_error)?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    fn write_blob<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let envelope = Envelope::seal(serde_json::to_string(value)?);
        let raw = serde_json::to_string(&envelope)?;
        self.storage.write(key, &raw).map_err(storage_error)
    }

    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.storage.read(key).map_err(storage_error)
    }

    fn clear(&self, key: &str) -> Result<(), PersistenceError> {
        self.storage.clear(key).map_err(storage_error)
    }
}

/// In-memory backend. Clones share the same blobs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    blobs: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.blobs.borrow().get(key).cloned()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl GameStorage for MemoryStorage {
    type Error = Infallible;

    fn read(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.get(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Self::Error> {
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
