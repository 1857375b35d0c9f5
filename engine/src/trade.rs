// ═══════════════════════════════════════════════════════════════════════
// Trade — bilateral offers between players (3+ player games only)
// Both sides must hold exactly what they put on the table. Horses are
// named by the territory they stand on and land where the receiver says.
// ═══════════════════════════════════════════════════════════════════════

use crate::error::{GameError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TradeBundle {
    pub coal: u32,
    pub gold: u32,
    pub iron: u32,
    pub timber: u32,
    /// Territories whose horse changes hands.
    pub horses: Vec<TerritoryId>,
}

impl TradeBundle {
    pub fn resources(&self) -> Stockpile {
        Stockpile::new(self.coal, self.gold, self.iron, self.timber)
    }

    pub fn is_empty(&self) -> bool {
        self.resources().is_empty() && self.horses.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub from: PlayerId,
    pub to: PlayerId,
    /// What the proposer hands over.
    pub give: TradeBundle,
    /// What the proposer wants back.
    pub request: TradeBundle,
    /// Where the proposer puts horses received, one per requested horse.
    pub request_horse_destinations: Vec<TerritoryId>,
}

fn check_side(state: &GameState, giver: &PlayerId, bundle: &TradeBundle) -> Result<()> {
    let p = state.player(giver)?;
    if !p.stockpile.can_afford(&bundle.resources()) {
        return Err(GameError::InsufficientResources);
    }
    let mut seen = BTreeSet::new();
    for src in &bundle.horses {
        if !seen.insert(src) {
            return Err(GameError::InvalidTarget(format!("horse in {src} offered twice")));
        }
        let t = state.owned_territory(giver, src)?;
        if !t.has_horse {
            return Err(GameError::InsufficientResources);
        }
    }
    Ok(())
}

/// Destinations must be distinct, owned by the receiver and horse-free
/// once the receiver's own outgoing horses have left.
fn check_destinations(
    state: &GameState,
    receiver: &PlayerId,
    destinations: &[TerritoryId],
    incoming: usize,
    vacated: &[TerritoryId],
) -> Result<()> {
    if destinations.len() != incoming {
        return Err(GameError::InvalidTarget(format!(
            "{incoming} horses need {incoming} destinations, got {}",
            destinations.len()
        )));
    }
    let mut seen = BTreeSet::new();
    for dest in destinations {
        if !seen.insert(dest) {
            return Err(GameError::SlotOccupied(dest.clone()));
        }
        let t = state.owned_territory(receiver, dest)?;
        if t.has_horse && !vacated.contains(dest) {
            return Err(GameError::SlotOccupied(dest.clone()));
        }
    }
    Ok(())
}

/// Everything about an offer except the responder's horse placement.
pub fn validate_offer(state: &GameState, offer: &TradeOffer) -> Result<()> {
    if offer.from == offer.to {
        return Err(GameError::InvalidTarget("cannot trade with yourself".into()));
    }
    if state.player(&offer.to)?.eliminated {
        return Err(GameError::InvalidTarget(format!("{} is eliminated", offer.to)));
    }
    if offer.give.is_empty() && offer.request.is_empty() {
        return Err(GameError::InvalidTarget("empty trade".into()));
    }
    check_side(state, &offer.from, &offer.give)?;
    check_side(state, &offer.to, &offer.request)?;
    check_destinations(
        state,
        &offer.from,
        &offer.request_horse_destinations,
        offer.request.horses.len(),
        &offer.give.horses,
    )
}

/// Store an offer for the other side to answer.
pub fn propose(state: &mut GameState, offer: TradeOffer) -> Result<()> {
    if state.pending_trade.is_some() {
        return Err(GameError::TradePending);
    }
    validate_offer(state, &offer)?;
    debug!(from = %offer.from, to = %offer.to, "trade proposed");
    state.pending_trade = Some(offer);
    Ok(())
}

/// Swap everything. Callers have validated the offer and destinations.
fn execute(state: &mut GameState, offer: &TradeOffer, give_destinations: &[TerritoryId]) -> Result<()> {
    let give = offer.give.resources();
    let request = offer.request.resources();

    let from = state.player_mut(&offer.from)?;
    from.stockpile.pay(&give)?;
    from.stockpile.add(&request);
    let to = state.player_mut(&offer.to)?;
    to.stockpile.pay(&request)?;
    to.stockpile.add(&give);

    // Lift every moving horse before placing any, so vacated spots are free.
    for src in offer.give.horses.iter().chain(&offer.request.horses) {
        state.territory_mut(src)?.has_horse = false;
    }
    for dest in give_destinations.iter().chain(&offer.request_horse_destinations) {
        state.territory_mut(dest)?.has_horse = true;
    }
    Ok(())
}

/// The receiver's answer. On acceptance every precondition is checked
/// again before anything moves.
pub fn respond(
    state: &mut GameState,
    responder: &PlayerId,
    accept: bool,
    horse_destinations: &[TerritoryId],
) -> Result<Option<TradeOffer>> {
    let Some(offer) = state.pending_trade.clone() else {
        return Err(GameError::NoPendingTrade);
    };
    if offer.to != *responder {
        return Err(GameError::NotYourTurn { actor: responder.clone(), current: offer.to.clone() });
    }

    if !accept {
        state.pending_trade = None;
        debug!(from = %offer.from, to = %offer.to, "trade declined");
        return Ok(None);
    }

    validate_offer(state, &offer)?;
    check_destinations(
        state,
        &offer.to,
        horse_destinations,
        offer.give.horses.len(),
        &offer.request.horses,
    )?;

    execute(state, &offer, horse_destinations)?;
    state.pending_trade = None;
    debug!(from = %offer.from, to = %offer.to, "trade completed");
    Ok(Some(offer))
}
