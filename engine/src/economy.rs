// ═══════════════════════════════════════════════════════════════════════
// Economy — production yields, build costs and construction
// ═══════════════════════════════════════════════════════════════════════

use crate::error::{GameError, Result};
use crate::types::*;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

// ── Production ─────────────────────────────────────────────────────────

/// One line of a production report. Computed up front so a collaborator
/// can animate it before the engine applies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionYield {
    Resource {
        player: PlayerId,
        territory: TerritoryId,
        resource: StockResource,
        amount: u32,
    },
    Horse {
        player: PlayerId,
        source: TerritoryId,
        placed_on: TerritoryId,
    },
}

/// True if `t` or a neighbour owned by the same player has a city.
fn city_boosted(state: &GameState, t: &Territory, owner: &PlayerId) -> bool {
    t.has_city
        || t.adjacent.iter().any(|n| {
            state
                .territories
                .get(n)
                .is_some_and(|nt| nt.is_owned_by(owner) && nt.has_city)
        })
}

/// Work out what every living player's land yields this round.
/// Pure apart from the random choice of where spilled-over horses go.
pub fn compute_production<R: Rng + ?Sized>(state: &GameState, rng: &mut R) -> Vec<ProductionYield> {
    let mut yields = Vec::new();
    let mut horses_planned: BTreeSet<TerritoryId> = BTreeSet::new();

    for t in state.territories.values() {
        let Some(owner) = &t.owner else { continue };
        if state.players.get(owner).map_or(true, |p| p.eliminated) {
            continue;
        }

        match t.resource {
            Resource::Grassland => {
                if !t.has_horse && !horses_planned.contains(&t.id) {
                    horses_planned.insert(t.id.clone());
                    yields.push(ProductionYield::Horse {
                        player: owner.clone(),
                        source: t.id.clone(),
                        placed_on: t.id.clone(),
                    });
                    continue;
                }
                let candidates: Vec<&TerritoryId> = t
                    .adjacent
                    .iter()
                    .filter(|n| {
                        state.territories.get(*n).is_some_and(|nt| {
                            nt.is_owned_by(owner) && !nt.has_horse && !horses_planned.contains(*n)
                        })
                    })
                    .collect();
                if let Some(&dest) = candidates.choose(rng) {
                    horses_planned.insert(dest.clone());
                    yields.push(ProductionYield::Horse {
                        player: owner.clone(),
                        source: t.id.clone(),
                        placed_on: dest.clone(),
                    });
                }
            }
            other => {
                let Some(resource) = other.stock() else { continue };
                let amount = if city_boosted(state, t, owner) { 2 } else { 1 };
                yields.push(ProductionYield::Resource {
                    player: owner.clone(),
                    territory: t.id.clone(),
                    resource,
                    amount,
                });
            }
        }
    }

    yields
}

/// Credit a previously computed production report.
pub fn apply_production(state: &mut GameState, yields: &[ProductionYield]) {
    for y in yields {
        match y {
            ProductionYield::Resource { player, resource, amount, .. } => {
                if let Some(p) = state.players.get_mut(player) {
                    *p.stockpile.get_mut(*resource) += amount;
                }
            }
            ProductionYield::Horse { player, placed_on, .. } => {
                if let Some(t) = state.territories.get_mut(placed_on) {
                    if t.is_owned_by(player) {
                        t.has_horse = true;
                    }
                }
            }
        }
    }
}

// ── Build costs ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Structure {
    City,
    Weapon,
    Boat,
}

/// Either the exact resource bundle or the flat gold price. Never a mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Payment {
    Resources,
    Gold,
}

impl Structure {
    pub fn cost(self, payment: Payment) -> Stockpile {
        match (self, payment) {
            (Structure::City, Payment::Resources) => Stockpile::new(1, 1, 1, 1),
            (Structure::City, Payment::Gold) => Stockpile::new(0, 4, 0, 0),
            (Structure::Weapon, Payment::Resources) => Stockpile::new(1, 0, 1, 0),
            (Structure::Weapon, Payment::Gold) => Stockpile::new(0, 2, 0, 0),
            (Structure::Boat, Payment::Resources) => Stockpile::new(0, 0, 0, 3),
            (Structure::Boat, Payment::Gold) => Stockpile::new(0, 3, 0, 0),
        }
    }

    /// Payment methods `stock` can cover for this structure.
    pub fn affordable(self, stock: &Stockpile) -> Vec<Payment> {
        [Payment::Resources, Payment::Gold]
            .into_iter()
            .filter(|&p| stock.can_afford(&self.cost(p)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub structure: Structure,
    pub territory: TerritoryId,
    pub payment: Payment,
    /// Required for boats: which bordering water body to launch into.
    pub water_body: Option<WaterBodyId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildOption {
    City { territory: TerritoryId, payments: Vec<Payment> },
    Weapon { territory: TerritoryId, payments: Vec<Payment> },
    Boat { territory: TerritoryId, water_body: WaterBodyId, payments: Vec<Payment> },
}

/// Check the site can take the structure. Does not look at the purse.
fn check_site(state: &GameState, player: &PlayerId, req: &BuildRequest) -> Result<()> {
    let t = state.owned_territory(player, &req.territory)?;
    match req.structure {
        Structure::City if t.has_city => Err(GameError::SlotOccupied(t.id.clone())),
        Structure::Weapon if t.has_weapon => Err(GameError::SlotOccupied(t.id.clone())),
        Structure::Boat => {
            let Some(water) = &req.water_body else {
                return Err(GameError::InvalidTarget("a boat needs a water body".into()));
            };
            if !state.water_bodies.contains_key(water) {
                return Err(GameError::UnknownWaterBody(water.clone()));
            }
            if !t.is_coastal() || !t.borders_water(water) {
                return Err(GameError::InvalidTarget(format!(
                    "{} does not border {}",
                    t.id, water
                )));
            }
            if !t.has_boat_capacity() {
                return Err(GameError::SlotOccupied(t.id.clone()));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Construct a city, weapon or boat during the Development phase.
pub fn build(state: &mut GameState, player: &PlayerId, req: &BuildRequest) -> Result<()> {
    state.require_turn(player, Phase::Development)?;
    check_site(state, player, req)?;

    let cost = req.structure.cost(req.payment);
    state.player_mut(player)?.stockpile.pay(&cost)?;

    let t = state.territory_mut(&req.territory)?;
    match req.structure {
        Structure::City => t.has_city = true,
        Structure::Weapon => t.has_weapon = true,
        Structure::Boat => {
            if let Some(water) = &req.water_body {
                t.add_boat(water);
            }
        }
    }
    debug!(%player, territory = %req.territory, structure = ?req.structure, "built");
    Ok(())
}

/// Every structure `player` could build right now, with the payment
/// methods they can cover.
pub fn build_options(state: &GameState, player: &PlayerId) -> Vec<BuildOption> {
    let Some(p) = state.players.get(player) else {
        return Vec::new();
    };
    let stock = &p.stockpile;
    let mut options = Vec::new();

    for t in state.territories_owned_by(player) {
        if !t.has_city {
            let payments = Structure::City.affordable(stock);
            if !payments.is_empty() {
                options.push(BuildOption::City { territory: t.id.clone(), payments });
            }
        }
        if !t.has_weapon {
            let payments = Structure::Weapon.affordable(stock);
            if !payments.is_empty() {
                options.push(BuildOption::Weapon { territory: t.id.clone(), payments });
            }
        }
        if t.is_coastal() && t.has_boat_capacity() {
            let payments = Structure::Boat.affordable(stock);
            if !payments.is_empty() {
                for w in &t.water_bodies {
                    options.push(BuildOption::Boat {
                        territory: t.id.clone(),
                        water_body: w.clone(),
                        payments: payments.clone(),
                    });
                }
            }
        }
    }

    options
}
