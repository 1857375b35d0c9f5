// ═══════════════════════════════════════════════════════════════════════
// Navigation — stockpile reachability and unit movement
// Land moves go through owned territory; boats carry things across the
// water body they sit in and never leave it.
// ═══════════════════════════════════════════════════════════════════════

use crate::error::{GameError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use tracing::debug;

// ── Stockpile ──────────────────────────────────────────────────────────

/// Water bodies where `player` has at least one boat.
fn boat_waters(state: &GameState, player: &PlayerId) -> BTreeSet<WaterBodyId> {
    state
        .territories_owned_by(player)
        .flat_map(|t| t.boats.iter().filter(|(_, n)| **n > 0).map(|(w, _)| w.clone()))
        .collect()
}

/// Every owned territory connected to `start` by owned land or by water
/// the player has a boat on. Includes `start`.
pub fn reachable_by_supply(state: &GameState, player: &PlayerId, start: &TerritoryId) -> BTreeSet<TerritoryId> {
    let mut visited: BTreeSet<TerritoryId> = BTreeSet::new();
    let Some(first) = state.territories.get(start) else { return visited };
    if !first.is_owned_by(player) {
        return visited;
    }

    let waters = boat_waters(state, player);
    let mut queue: VecDeque<TerritoryId> = VecDeque::new();
    visited.insert(start.clone());
    queue.push_back(start.clone());

    while let Some(current) = queue.pop_front() {
        let Some(t) = state.territories.get(&current) else { continue };

        let by_land = t.adjacent.iter();
        let by_water = t
            .water_bodies
            .iter()
            .filter(|w| waters.contains(*w))
            .filter_map(|w| state.water_bodies.get(w))
            .flat_map(|w| w.territories.iter());

        for next in by_land.chain(by_water) {
            if visited.contains(next) {
                continue;
            }
            if state.territories.get(next).is_some_and(|n| n.is_owned_by(player)) {
                visited.insert(next.clone());
                queue.push_back(next.clone());
            }
        }
    }

    visited
}

/// Where the stockpile could be moved to this Shipment.
pub fn stockpile_destinations(state: &GameState, player: &PlayerId) -> Vec<TerritoryId> {
    let Some(from) = state.players.get(player).and_then(|p| p.stockpile_territory.clone()) else {
        return Vec::new();
    };
    reachable_by_supply(state, player, &from)
        .into_iter()
        .filter(|t| *t != from)
        .collect()
}

/// First placement (or re-placement after capture) of a stockpile.
pub fn place_stockpile(state: &mut GameState, player: &PlayerId, territory: &TerritoryId) -> Result<()> {
    state.owned_territory(player, territory)?;
    if state.player(player)?.has_stockpile_placed() {
        return Err(GameError::InvalidTarget(format!("{player} has already placed a stockpile")));
    }
    state.player_mut(player)?.stockpile_territory = Some(territory.clone());
    debug!(%player, %territory, "stockpile placed");
    Ok(())
}

pub fn move_stockpile(state: &mut GameState, player: &PlayerId, to: &TerritoryId) -> Result<()> {
    state.owned_territory(player, to)?;
    let Some(from) = state.player(player)?.stockpile_territory.clone() else {
        return Err(GameError::InvalidTarget(format!("{player} has no stockpile on the map")));
    };
    if from == *to {
        return Err(GameError::InvalidTarget("stockpile is already there".into()));
    }
    if !reachable_by_supply(state, player, &from).contains(to) {
        return Err(GameError::Unreachable(to.clone()));
    }
    state.player_mut(player)?.stockpile_territory = Some(to.clone());
    debug!(%player, %from, %to, "stockpile moved");
    Ok(())
}

// ── Hops ───────────────────────────────────────────────────────────────

/// Land hops from `from` to `to` (1 or 2). A two-hop path must pass
/// through a territory `player` owns. `to` itself may belong to anyone.
pub fn land_hops(state: &GameState, player: &PlayerId, from: &TerritoryId, to: &TerritoryId) -> Option<u8> {
    let start = state.territories.get(from)?;
    if from == to {
        return None;
    }
    if start.is_adjacent(to) {
        return Some(1);
    }
    let via = start.adjacent.iter().any(|mid| {
        state
            .territories
            .get(mid)
            .is_some_and(|m| m.is_owned_by(player) && m.is_adjacent(to))
    });
    via.then_some(2)
}

// ── Unit moves ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitMove {
    Horse { from: TerritoryId, to: TerritoryId, carry_weapon: bool },
    Weapon { from: TerritoryId, to: TerritoryId },
    Boat {
        from: TerritoryId,
        to: TerritoryId,
        water_body: WaterBodyId,
        carry_horse: bool,
        carry_weapon: bool,
    },
}

/// What actually moved. Carried units can be left behind when the
/// destination already has one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub moved: Vec<UnitKind>,
    pub left_behind: Vec<UnitKind>,
}

fn owned_pair<'a>(
    state: &'a GameState,
    player: &PlayerId,
    from: &TerritoryId,
    to: &TerritoryId,
) -> Result<(&'a Territory, &'a Territory)> {
    let src = state.owned_territory(player, from)?;
    let dst = state.owned_territory(player, to)?;
    if from == to {
        return Err(GameError::InvalidTarget("source and destination are the same".into()));
    }
    Ok((src, dst))
}

fn check_horse_move(state: &GameState, player: &PlayerId, from: &TerritoryId, to: &TerritoryId, carry_weapon: bool) -> Result<()> {
    let (src, dst) = owned_pair(state, player, from, to)?;
    if !src.has_horse {
        return Err(GameError::InvalidTarget(format!("no horse in {from}")));
    }
    if carry_weapon && !src.has_weapon {
        return Err(GameError::InvalidTarget(format!("no weapon in {from}")));
    }
    if land_hops(state, player, from, to).is_none() {
        return Err(GameError::Unreachable(to.clone()));
    }
    if dst.has_horse || (carry_weapon && dst.has_weapon) {
        return Err(GameError::SlotOccupied(to.clone()));
    }
    Ok(())
}

fn check_weapon_move(state: &GameState, player: &PlayerId, from: &TerritoryId, to: &TerritoryId) -> Result<()> {
    let (src, dst) = owned_pair(state, player, from, to)?;
    if !src.has_weapon {
        return Err(GameError::InvalidTarget(format!("no weapon in {from}")));
    }
    if !src.is_adjacent(to) {
        return Err(GameError::Unreachable(to.clone()));
    }
    if dst.has_weapon {
        return Err(GameError::SlotOccupied(to.clone()));
    }
    Ok(())
}

fn check_boat_move(
    state: &GameState,
    player: &PlayerId,
    from: &TerritoryId,
    to: &TerritoryId,
    water: &WaterBodyId,
    carry_horse: bool,
    carry_weapon: bool,
) -> Result<()> {
    let (src, dst) = owned_pair(state, player, from, to)?;
    if src.boats_in(water) == 0 {
        return Err(GameError::InvalidTarget(format!("no boat from {from} on {water}")));
    }
    if carry_horse && !src.has_horse {
        return Err(GameError::InvalidTarget(format!("no horse in {from}")));
    }
    if carry_weapon && !src.has_weapon {
        return Err(GameError::InvalidTarget(format!("no weapon in {from}")));
    }
    if !dst.is_coastal() || !dst.borders_water(water) {
        return Err(GameError::Unreachable(to.clone()));
    }
    if !dst.has_boat_capacity() {
        return Err(GameError::SlotOccupied(to.clone()));
    }
    Ok(())
}

/// Move one horse, weapon or boat. Validates everything first.
pub fn move_unit(state: &mut GameState, player: &PlayerId, mv: &UnitMove) -> Result<MoveOutcome> {
    let mut outcome = MoveOutcome::default();
    match mv {
        UnitMove::Horse { from, to, carry_weapon } => {
            check_horse_move(state, player, from, to, *carry_weapon)?;
            state.territory_mut(from)?.has_horse = false;
            state.territory_mut(to)?.has_horse = true;
            outcome.moved.push(UnitKind::Horse);
            if *carry_weapon {
                state.territory_mut(from)?.has_weapon = false;
                state.territory_mut(to)?.has_weapon = true;
                outcome.moved.push(UnitKind::Weapon);
            }
        }
        UnitMove::Weapon { from, to } => {
            check_weapon_move(state, player, from, to)?;
            state.territory_mut(from)?.has_weapon = false;
            state.territory_mut(to)?.has_weapon = true;
            outcome.moved.push(UnitKind::Weapon);
        }
        UnitMove::Boat { from, to, water_body, carry_horse, carry_weapon } => {
            check_boat_move(state, player, from, to, water_body, *carry_horse, *carry_weapon)?;
            let (dst_horse, dst_weapon) = {
                let dst = state.territory(to)?;
                (dst.has_horse, dst.has_weapon)
            };

            state.territory_mut(from)?.remove_boat(water_body);
            state.territory_mut(to)?.add_boat(water_body);
            outcome.moved.push(UnitKind::Boat);

            if *carry_horse {
                if dst_horse {
                    outcome.left_behind.push(UnitKind::Horse);
                } else {
                    state.territory_mut(from)?.has_horse = false;
                    state.territory_mut(to)?.has_horse = true;
                    outcome.moved.push(UnitKind::Horse);
                }
            }
            if *carry_weapon {
                if dst_weapon {
                    outcome.left_behind.push(UnitKind::Weapon);
                } else {
                    state.territory_mut(from)?.has_weapon = false;
                    state.territory_mut(to)?.has_weapon = true;
                    outcome.moved.push(UnitKind::Weapon);
                }
            }
        }
    }
    debug!(%player, ?mv, ?outcome, "unit moved");
    Ok(outcome)
}

// ── Queries ────────────────────────────────────────────────────────────

pub fn horse_destinations(state: &GameState, player: &PlayerId, from: &TerritoryId) -> Vec<TerritoryId> {
    state
        .territories_owned_by(player)
        .filter(|t| !t.has_horse && t.id != *from)
        .filter(|t| land_hops(state, player, from, &t.id).is_some())
        .map(|t| t.id.clone())
        .collect()
}

pub fn weapon_destinations(state: &GameState, player: &PlayerId, from: &TerritoryId) -> Vec<TerritoryId> {
    let Some(src) = state.territories.get(from) else { return Vec::new() };
    src.adjacent
        .iter()
        .filter(|n| {
            state
                .territories
                .get(*n)
                .is_some_and(|t| t.is_owned_by(player) && !t.has_weapon)
        })
        .cloned()
        .collect()
}

pub fn boat_destinations(state: &GameState, player: &PlayerId, from: &TerritoryId, water: &WaterBodyId) -> Vec<TerritoryId> {
    let Some(w) = state.water_bodies.get(water) else { return Vec::new() };
    w.territories
        .iter()
        .filter(|id| *id != from)
        .filter(|id| {
            state.territories.get(*id).is_some_and(|t| {
                t.is_owned_by(player) && t.is_coastal() && t.has_boat_capacity()
            })
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovableUnit {
    Horse { from: TerritoryId, destinations: Vec<TerritoryId>, can_carry_weapon: bool },
    Weapon { from: TerritoryId, destinations: Vec<TerritoryId> },
    Boat { from: TerritoryId, water_body: WaterBodyId, destinations: Vec<TerritoryId> },
}

/// Every unit `player` could move this Shipment, with its destinations.
pub fn movable_units(state: &GameState, player: &PlayerId) -> Vec<MovableUnit> {
    let mut units = Vec::new();
    for t in state.territories_owned_by(player) {
        if t.has_horse {
            let destinations = horse_destinations(state, player, &t.id);
            if !destinations.is_empty() {
                units.push(MovableUnit::Horse {
                    from: t.id.clone(),
                    destinations,
                    can_carry_weapon: t.has_weapon,
                });
            }
        }
        if t.has_weapon {
            let destinations = weapon_destinations(state, player, &t.id);
            if !destinations.is_empty() {
                units.push(MovableUnit::Weapon { from: t.id.clone(), destinations });
            }
        }
        for (water, count) in &t.boats {
            if *count == 0 {
                continue;
            }
            let destinations = boat_destinations(state, player, &t.id, water);
            if !destinations.is_empty() {
                units.push(MovableUnit::Boat {
                    from: t.id.clone(),
                    water_body: water.clone(),
                    destinations,
                });
            }
        }
    }
    units
}
