//! Generation tracking for the single live turn of a conversation.
//!
//! The `(generation, active turn, deactivated)` triple lives behind one mutex so
//! no reader can observe a new active turn paired with an old generation.

use std::sync::{Mutex, MutexGuard};

use turn_events::TurnId;

/// Monotonically increasing token identifying which turn's events are accepted.
pub type Generation = u64;

/// A `(turn, generation)` pair captured when a turn began.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnTicket {
    pub turn_id: TurnId,
    pub generation: Generation,
}

#[derive(Debug, Default)]
struct TrackerState {
    generation: Generation,
    active_turn: Option<TurnId>,
    deactivated: bool,
}

#[derive(Debug, Default)]
pub struct GenerationTracker {
    state: Mutex<TrackerState>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms acceptance for `turn_id` and returns the new generation.
    ///
    /// Events still in flight for any earlier turn fail validation afterwards.
    pub fn begin_turn(&self, turn_id: TurnId) -> Generation {
        let mut state = self.lock_state();
        state.deactivated = false;
        state.active_turn = Some(turn_id);
        state.generation += 1;
        state.generation
    }

    /// Stops accepting events for every turn until the next `begin_turn`.
    pub fn deactivate(&self) {
        let mut state = self.lock_state();
        state.deactivated = true;
        state.active_turn = None;
        state.generation += 1;
    }

    pub fn is_live(&self, turn_id: &TurnId) -> bool {
        let state = self.lock_state();
        !state.deactivated && state.active_turn.as_ref() == Some(turn_id)
    }

    /// Returns true when `ticket` still names the live turn at its generation.
    pub fn is_current(&self, ticket: &TurnTicket) -> bool {
        let state = self.lock_state();
        !state.deactivated
            && state.generation == ticket.generation
            && state.active_turn.as_ref() == Some(&ticket.turn_id)
    }

    /// Returns the live `(turn, generation)` pair, if any.
    pub fn ticket(&self) -> Option<TurnTicket> {
        let state = self.lock_state();
        if state.deactivated {
            return None;
        }

        state.active_turn.clone().map(|turn_id| TurnTicket {
            turn_id,
            generation: state.generation,
        })
    }

    pub fn generation(&self) -> Generation {
        self.lock_state().generation
    }

    pub fn active_turn(&self) -> Option<TurnId> {
        let state = self.lock_state();
        if state.deactivated {
            None
        } else {
            state.active_turn.clone()
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        lock_unpoisoned(&self.state)
    }
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
