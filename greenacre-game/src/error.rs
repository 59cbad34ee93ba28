//! Rejection taxonomy for engine operations and persistence failures.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which balance a purchase draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Coins,
    Tokens,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Coins => "coins",
            Self::Tokens => "tokens",
        })
    }
}

/// Reasons an operation was a no-op against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidReason {
    #[error("field is locked")]
    FieldLocked,
    #[error("field is already planted")]
    FieldOccupied,
    #[error("field has nothing planted")]
    FieldEmpty,
    #[error("crop is not ripe yet")]
    NotRipe,
    #[error("crop is already ripe")]
    AlreadyRipe,
    #[error("field is already watered")]
    AlreadyWatered,
    #[error("watering is cooling down")]
    WaterCooldown,
    #[error("watering throttled after rapid use")]
    WaterThrottled,
    #[error("no seeds of that plant")]
    NoSeeds,
    #[error("plant requires more rebirths")]
    PlantLocked,
    #[error("amount must be positive")]
    ZeroAmount,
    #[error("nothing to sell")]
    NothingToSell,
    #[error("field already owned")]
    FieldAlreadyOwned,
    #[error("fields must be bought in order")]
    FieldOutOfOrder,
    #[error("field is already permanent")]
    AlreadyPermanent,
    #[error("upgrade already at max level")]
    MaxLevel,
    #[error("feature not unlocked yet")]
    FeatureLocked,
    #[error("feature already unlocked")]
    AlreadyUnlocked,
    #[error("worker already owned")]
    WorkerOwned,
    #[error("worker not owned")]
    WorkerNotOwned,
    #[error("job still growing")]
    JobNotReady,
    #[error("no pending harvest summary")]
    NoPendingSummary,
    #[error("bulk rebirth needs a higher rebirth count")]
    BulkPrestigeLocked,
}

/// Bounded resources that can reject further input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapacityLimit {
    #[error("worker seed buffer holds the maximum plant types")]
    WorkerSeedTypes,
    #[error("worker seed buffer is full")]
    WorkerSeedBuffer,
    #[error("worker has no free job slots")]
    WorkerJobSlots,
    #[error("all fields are owned")]
    FieldCount,
}

/// Catalog lookups that failed; these indicate integrity bugs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFound {
    #[error("unknown plant `{0}`")]
    Plant(String),
    #[error("unknown variant `{0}`")]
    Variant(String),
    #[error("unknown event `{0}`")]
    Event(String),
    #[error("unknown upgrade track `{0}`")]
    Track(String),
    #[error("unknown worker `{0}`")]
    Worker(String),
    #[error("no field at index {0}")]
    Field(usize),
    #[error("no job at index {0}")]
    Job(usize),
    #[error("no bulk rebirth option for {0} steps")]
    PrestigeOption(u32),
}

/// Outcome of a rejected engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("insufficient {currency}: need {required}, have {available}")]
    InsufficientFunds {
        currency: Currency,
        required: u64,
        available: u64,
    },
    #[error("invalid state: {0}")]
    InvalidState(InvalidReason),
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(CapacityLimit),
    #[error("not found: {0}")]
    NotFound(NotFound),
}

impl Rejection {
    /// Build a not-found rejection, logging it loudly.
    #[must_use]
    pub fn not_found(missing: NotFound) -> Self {
        log::error!("catalog integrity: {missing}");
        Self::NotFound(missing)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<InvalidReason> for Rejection {
    fn from(reason: InvalidReason) -> Self {
        Self::InvalidState(reason)
    }
}

impl From<CapacityLimit> for Rejection {
    fn from(limit: CapacityLimit) -> Self {
        Self::CapacityExceeded(limit)
    }
}

impl From<NotFound> for Rejection {
    fn from(missing: NotFound) -> Self {
        Self::not_found(missing)
    }
}

/// Result type returned by every engine operation.
pub type ActionResult<T> = Result<T, Rejection>;

/// Ensure `available >= required`, otherwise reject with insufficient funds.
///
/// # Errors
///
/// Returns [`Rejection::InsufficientFunds`] when the balance is short.
pub fn require_funds(currency: Currency, required: u64, available: u64) -> ActionResult<()> {
    if available < required {
        return Err(Rejection::InsufficientFunds {
            currency,
            required,
            available,
        });
    }
    Ok(())
}

/// Errors raised by the persistence adapter.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage backend failed: {0}")]
    Storage(#[source] anyhow::Error),
    #[error("blob under `{key}` is not valid JSON")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("checksum mismatch for `{key}`")]
    Checksum { key: String },
    #[error("cannot migrate save from version {from}: {reason}")]
    Migration { from: u32, reason: String },
    #[error("save version {0} is newer than this build")]
    FutureVersion(u32),
    #[error("failed to serialize save: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PersistenceError {
    /// The blob was read but its contents are unusable.
    #[must_use]
    pub const fn is_damaged(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::Checksum { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_funds_reports_shortfall() {
        assert!(require_funds(Currency::Coins, 10, 10).is_ok());
        let err = require_funds(Currency::Tokens, 5, 2).unwrap_err();
        assert_eq!(
            err,
            Rejection::InsufficientFunds {
                currency: Currency::Tokens,
                required: 5,
                available: 2,
            }
        );
        assert_eq!(err.to_string(), "insufficient tokens: need 5, have 2");
    }

    #[test]
    fn not_found_is_flagged() {
        let err: Rejection = NotFound::Plant("kale".into()).into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: unknown plant `kale`");
    }
}
