//! Timed events: a weighted random pick every interval, live for a fixed window.
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, EventDef, VariantId};
use crate::constants::{EVENT_DURATION_MS, EVENT_INTERVAL_MS};
use crate::numbers::{floor_f64_to_u64, u64_to_f64};
use crate::rng::{RandomSource, RngStream};
use crate::state::PlayerState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEvent {
    pub event_id: String,
    pub focus_variant: VariantId,
    pub started_at_ms: u64,
}

impl ActiveEvent {
    #[must_use]
    pub const fn ends_at_ms(&self) -> u64 {
        self.started_at_ms.saturating_add(EVENT_DURATION_MS)
    }

    #[must_use]
    pub const fn is_live(&self, now_ms: u64) -> bool {
        now_ms >= self.started_at_ms && now_ms < self.ends_at_ms()
    }

    #[must_use]
    pub const fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.ends_at_ms().saturating_sub(now_ms)
    }
}

/// What the event bookkeeping did on a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventChange {
    Started(ActiveEvent),
    Ended { event_id: String },
}

/// Pick an event by weight. `None` when the catalog has no weighted events.
pub fn pick_event<'a, R>(catalog: &'a Catalog, rng: &mut R) -> Option<&'a EventDef>
where
    R: RandomSource + ?Sized,
{
    let total: u64 = catalog.events.iter().map(|e| u64::from(e.weight)).sum();
    if total == 0 {
        return None;
    }
    let draw = rng.next_unit(RngStream::Events);
    let mut roll = floor_f64_to_u64(draw * u64_to_f64(total)).min(total - 1);
    for event in &catalog.events {
        let weight = u64::from(event.weight);
        if weight == 0 {
            continue;
        }
        if roll < weight {
            return Some(event);
        }
        roll -= weight;
    }
    None
}

/// The event in effect at `now_ms`, if any. Pure query; expiry is applied by [`tick_events`].
#[must_use]
pub fn active_event(state: &PlayerState, now_ms: u64) -> Option<&ActiveEvent> {
    state
        .active_event
        .as_ref()
        .filter(|event| event.is_live(now_ms))
}

/// Expire the running event or start the next one when it is due.
pub fn tick_events<R>(
    state: &mut PlayerState,
    catalog: &Catalog,
    now_ms: u64,
    rng: &mut R,
) -> Option<EventChange>
where
    R: RandomSource + ?Sized,
{
    if let Some(event) = state.active_event.as_ref() {
        if event.is_live(now_ms) {
            return None;
        }
        let event_id = event.event_id.clone();
        state.active_event = None;
        log::debug!("event {event_id} ended");
        return Some(EventChange::Ended { event_id });
    }
    if now_ms < state.next_event_at_ms {
        return None;
    }
    state.next_event_at_ms = now_ms.saturating_add(EVENT_INTERVAL_MS);
    let def = pick_event(catalog, rng)?;
    let started = ActiveEvent {
        event_id: def.id.clone(),
        focus_variant: def.focus_variant.clone(),
        started_at_ms: now_ms,
    };
    log::info!("event {} started, focus {}", def.id, def.focus_variant);
    state.active_event = Some(started.clone());
    Some(EventChange::Started(started))
}
