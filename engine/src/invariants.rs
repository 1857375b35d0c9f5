//! State invariants — sanity checks that detect engine bugs.
//!
//! None of these should ever fire on a state produced by the engine.
//! They are bug detectors, not gameplay rules: the engine runs them after
//! every change in debug builds and snapshot restore runs them always.

use crate::types::*;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    pub message: String,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invariant violation: {}", self.message)
    }
}

impl std::error::Error for InvariantViolation {}

/// Check every invariant. Returns the violations found, empty if sound.
#[must_use]
pub fn check_invariants(state: &GameState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut fail = |message: String| violations.push(InvariantViolation { message });

    // Territories
    for t in state.territories.values() {
        if let Some(owner) = &t.owner {
            match state.players.get(owner) {
                None => fail(format!("{} is owned by unknown player {owner}", t.id)),
                Some(p) if p.eliminated => fail(format!("{} is owned by eliminated player {owner}", t.id)),
                _ => {}
            }
        }
        if t.total_boats() > t.coastal_tiles {
            fail(format!("{} holds {} boats on {} coastal tiles", t.id, t.total_boats(), t.coastal_tiles));
        }
        for (water, n) in &t.boats {
            if !t.borders_water(water) {
                fail(format!("{} has {n} boats on {water}, which it does not border", t.id));
            }
        }
    }

    // Players
    for p in state.players.values() {
        if p.attacks_remaining > ATTACKS_PER_ROUND {
            fail(format!("{} has {} attacks left", p.id, p.attacks_remaining));
        }
        for kind in [CardKind::Attack, CardKind::Defense] {
            if p.hand(kind).len() > HAND_LIMIT {
                fail(format!("{} holds {} {kind:?} cards", p.id, p.hand(kind).len()));
            }
        }
        if let Some(site) = &p.stockpile_territory {
            if !state.territories.get(site).is_some_and(|t| t.is_owned_by(&p.id)) {
                fail(format!("{}'s stockpile sits on {site}, which they do not own", p.id));
            }
        }
    }

    // Turn order
    let mut seen = BTreeSet::new();
    for id in &state.player_order {
        if !state.players.contains_key(id) {
            fail(format!("turn order lists unknown player {id}"));
        }
        if !seen.insert(id) {
            fail(format!("{id} appears twice in the turn order"));
        }
    }

    let all_out = state.players.values().all(|p| p.eliminated);
    if state.winner.is_none() && !all_out {
        if state.player_order.get(state.turn_index) != Some(&state.current_player) {
            fail(format!("turn index {} does not point at {}", state.turn_index, state.current_player));
        }
        match state.players.get(&state.current_player) {
            None => fail(format!("current player {} does not exist", state.current_player)),
            Some(p) if p.eliminated => fail(format!("current player {} is eliminated", p.id)),
            _ => {}
        }
    }

    // Phase bookkeeping
    if state.production_pending && state.phase != Phase::Production {
        fail(format!("production pending during {}", state.phase));
    }
    if state.pending_trade.is_some() && state.phase != Phase::Trade {
        fail(format!("trade offer pending during {}", state.phase));
    }
    if state.round == 0 && state.phase != Phase::TerritorySelection {
        fail(format!("round 0 in {}", state.phase));
    }

    violations
}
