// ═══════════════════════════════════════════════════════════════════════
// Game Engine — action entry point, event stream and read-only queries
//
// Architecture:
//   The engine is a pure state machine. It never does I/O and never
//   waits on anyone. A collaborator serialises actions for one match,
//   calls `apply_action()` for each, and forwards the returned events.
//
// Flow:
//   1. Collaborator picks an `Action` for the acting player
//   2. `apply_action()` gates it on phase and turn, applies it
//      atomically and advances turn/phase/round as needed
//   3. When `ProductionReady` is emitted the collaborator shows it and
//      then calls `acknowledge_production()`
//   4. Repeat until a `GameOver` event
// ═══════════════════════════════════════════════════════════════════════

use crate::combat::{self, AttackPlan, AttackPreview, CombatReport};
use crate::economy::{self, BuildOption, BuildRequest, ProductionYield};
use crate::error::Result;
use crate::invariants;
use crate::navigation::{self, MovableUnit, MoveOutcome, UnitMove};
use crate::phase;
use crate::trade::TradeOffer;
use crate::types::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Everything a player can ask the engine to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    SelectTerritory(TerritoryId),
    PlaceStockpile(TerritoryId),

    ProposeTrade(TradeOffer),
    /// Sent by the receiver of the pending offer, out of turn.
    RespondTrade { accept: bool, horse_destinations: Vec<TerritoryId> },
    PassTrade,

    MoveStockpile(TerritoryId),
    MoveUnit(UnitMove),
    SkipShipment,

    Attack(AttackPlan),

    BuyCard { kind: CardKind, resource: StockResource },
    Build(BuildRequest),

    /// Finish the current turn in Trade, Shipment, Conquest or Development.
    EndTurn,
}

/// What happened, in order, as a result of one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    TerritoryClaimed { player: PlayerId, territory: TerritoryId },
    RoundStarted { round: u32 },
    PhaseChanged { phase: Phase, round: u32 },
    PhaseSkipped(PhaseSkip),
    TurnChanged { player: PlayerId },
    StockpilePlaced { player: PlayerId, territory: TerritoryId },
    ProductionReady(Vec<ProductionYield>),
    ProductionApplied,
    TradeProposed(TradeOffer),
    TradeCompleted(TradeOffer),
    TradeDeclined { from: PlayerId, to: PlayerId },
    StockpileMoved { player: PlayerId, from: TerritoryId, to: TerritoryId },
    UnitMoved { player: PlayerId, unit: UnitMove, outcome: MoveOutcome },
    CombatResolved(CombatReport),
    CardBought { player: PlayerId, card: CombatCard },
    Built { player: PlayerId, request: BuildRequest },
    PlayerEliminated { player: PlayerId },
    GameOver { winner: PlayerId },
}

/// Apply one player action. On error nothing has changed.
pub fn apply_action<R: Rng + ?Sized>(
    state: &mut GameState,
    actor: &PlayerId,
    action: Action,
    rng: &mut R,
) -> Result<Vec<GameEvent>> {
    debug!(%actor, phase = %state.phase, ?action, "action");
    let events = match action {
        Action::SelectTerritory(t) => phase::select_territory(state, actor, &t, rng),
        Action::PlaceStockpile(t) => phase::place_stockpile(state, actor, &t, rng),
        Action::ProposeTrade(offer) => phase::propose_trade(state, actor, offer),
        Action::RespondTrade { accept, horse_destinations } => {
            phase::respond_trade(state, actor, accept, &horse_destinations, rng)
        }
        Action::PassTrade => phase::pass_trade(state, actor, rng),
        Action::MoveStockpile(to) => phase::move_stockpile(state, actor, &to, rng),
        Action::MoveUnit(mv) => phase::move_unit(state, actor, &mv, rng),
        Action::SkipShipment => phase::skip_shipment(state, actor, rng),
        Action::Attack(plan) => phase::attack(state, actor, &plan, rng),
        Action::BuyCard { kind, resource } => phase::buy_card(state, actor, kind, resource, rng),
        Action::Build(req) => phase::build(state, actor, &req),
        Action::EndTurn => phase::end_turn(state, actor, rng),
    }?;
    audit(state);
    Ok(events)
}

/// Collaborator barrier: the production report has been shown, credit it.
pub fn acknowledge_production<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R) -> Result<Vec<GameEvent>> {
    let events = phase::acknowledge_production(state, rng)?;
    audit(state);
    Ok(events)
}

/// Invariant sweep after every successful change. Violations are engine
/// defects, so they are logged rather than returned.
fn audit(state: &GameState) {
    if cfg!(debug_assertions) {
        for v in invariants::check_invariants(state) {
            error!(game = %state.id, violation = %v.message, "invariant violated");
        }
    }
}

// ── Queries ────────────────────────────────────────────────────────────
// None of these mutate state.

pub fn is_game_over(state: &GameState) -> bool {
    state.is_game_over()
}

pub fn winner(state: &GameState) -> Option<&PlayerId> {
    state.winner.as_ref()
}

pub fn city_count(state: &GameState, player: &PlayerId) -> u32 {
    state.city_count(player)
}

pub fn attackable_targets(state: &GameState, player: &PlayerId) -> Vec<TerritoryId> {
    combat::attackable_targets(state, player)
}

pub fn preview_attack(state: &GameState, player: &PlayerId, plan: &AttackPlan) -> Result<AttackPreview> {
    combat::preview_attack(state, player, plan)
}

pub fn stockpile_destinations(state: &GameState, player: &PlayerId) -> Vec<TerritoryId> {
    navigation::stockpile_destinations(state, player)
}

pub fn movable_units(state: &GameState, player: &PlayerId) -> Vec<MovableUnit> {
    navigation::movable_units(state, player)
}

pub fn build_options(state: &GameState, player: &PlayerId) -> Vec<BuildOption> {
    economy::build_options(state, player)
}

/// Unclaimed territories, while selection is running.
pub fn selectable_territories(state: &GameState) -> Vec<TerritoryId> {
    if state.phase != Phase::TerritorySelection {
        return Vec::new();
    }
    state
        .territories
        .values()
        .filter(|t| t.owner.is_none())
        .map(|t| t.id.clone())
        .collect()
}

/// The player the engine is waiting on. During Trade with an offer on
/// the table that is the receiver, not the proposer.
pub fn awaiting(state: &GameState) -> Option<&PlayerId> {
    if state.winner.is_some() || state.production_pending {
        return None;
    }
    match (&state.phase, &state.pending_trade) {
        (Phase::Trade, Some(offer)) => Some(&offer.to),
        _ => Some(&state.current_player),
    }
}
