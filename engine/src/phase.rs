// ═══════════════════════════════════════════════════════════════════════
// Phase state machine — turn order, phase sequencing, rounds, victory
//
// Round flow:
//   TerritorySelection (once) → Production → Trade (3+ players) →
//   Shipment → Conquest → Development (from year 2) → next round
//
// Every handler here validates first and mutates second, so a rejected
// action leaves the state untouched. Only this module changes `phase`,
// `current_player` and `round`.
// ═══════════════════════════════════════════════════════════════════════

use crate::cards;
use crate::combat::{self, AttackPlan};
use crate::economy::{self, BuildRequest};
use crate::engine::GameEvent;
use crate::error::{GameError, Result};
use crate::navigation::{self, UnitMove};
use crate::trade::{self, TradeOffer};
use crate::types::*;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

/// Probability that the game master skips an eligible phase.
pub const SKIP_CHANCE: f64 = 0.25;

const PRODUCTION_SKIPS: &[&str] = &[
    "A drought withered the fields",
    "Miners went on strike",
    "Floods washed out the roads to the mines",
];
const TRADE_SKIPS: &[&str] = &[
    "Pirates closed the trade routes",
    "The merchants' guild declared a holiday",
    "A plague emptied the markets",
];
const SHIPMENT_SKIPS: &[&str] = &[
    "Storms kept every cart and boat at home",
    "Bandits raided the supply lines",
    "The bridges were washed away",
];

// ── Turn order ─────────────────────────────────────────────────────────

/// First living player at or after `start` who passes `eligible`.
/// With `wrap` the scan covers the whole order once; without it the
/// scan stops at the end of the order.
fn scan_players<F>(state: &GameState, start: usize, wrap: bool, eligible: F) -> Option<usize>
where
    F: Fn(&Player) -> bool,
{
    let n = state.player_order.len();
    if n == 0 {
        return None;
    }
    let steps = if wrap { n } else { n.saturating_sub(start) };
    (0..steps)
        .map(|step| (start + step) % n)
        .find(|&i| {
            state
                .players
                .get(&state.player_order[i])
                .is_some_and(|p| !p.eliminated && eligible(p))
        })
}

fn set_turn(state: &mut GameState, index: usize, events: &mut Vec<GameEvent>) {
    let Some(player) = state.player_order.get(index).cloned() else { return };
    state.turn_index = index;
    state.current_player = player.clone();
    events.push(GameEvent::TurnChanged { player });
}

fn reset_attacks(state: &mut GameState) {
    for p in state.players.values_mut() {
        p.attacks_remaining = if p.eliminated { 0 } else { ATTACKS_PER_ROUND };
    }
}

/// Move to the next player in the current phase, or close the phase.
fn advance_turn<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R, events: &mut Vec<GameEvent>) {
    if state.winner.is_some() {
        return;
    }
    let next = match state.phase {
        Phase::Conquest => {
            let n = state.player_order.len().max(1);
            scan_players(state, (state.turn_index + 1) % n, true, |p| p.attacks_remaining > 0)
        }
        Phase::Trade | Phase::Shipment | Phase::Development => {
            scan_players(state, state.turn_index + 1, false, |_| true)
        }
        Phase::TerritorySelection | Phase::Production => return,
    };
    match next {
        Some(i) => set_turn(state, i, events),
        None => finish_phase(state, rng, events),
    }
}

fn finish_phase<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R, events: &mut Vec<GameEvent>) {
    match state.phase {
        Phase::Trade => enter_phase(state, Phase::Shipment, rng, events),
        Phase::Shipment => enter_phase(state, Phase::Conquest, rng, events),
        // Year 1 has no Development.
        Phase::Conquest if state.round <= 1 => end_round(state, rng, events),
        Phase::Conquest => enter_phase(state, Phase::Development, rng, events),
        Phase::Development => end_round(state, rng, events),
        Phase::TerritorySelection | Phase::Production => {}
    }
}

fn enter_phase<R: Rng + ?Sized>(state: &mut GameState, phase: Phase, rng: &mut R, events: &mut Vec<GameEvent>) {
    state.phase = phase;
    info!(round = state.round, %phase, "phase started");
    events.push(GameEvent::PhaseChanged { phase, round: state.round });

    match phase {
        Phase::Production => start_production(state, rng, events),
        Phase::Conquest => {
            reset_attacks(state);
            match scan_players(state, 0, true, |p| p.attacks_remaining > 0) {
                Some(i) => set_turn(state, i, events),
                None => finish_phase(state, rng, events),
            }
        }
        Phase::Trade | Phase::Shipment | Phase::Development => {
            state.pending_trade = None;
            match scan_players(state, 0, false, |_| true) {
                Some(i) => set_turn(state, i, events),
                None => finish_phase(state, rng, events),
            }
        }
        Phase::TerritorySelection => {}
    }
}

// ── Rounds ─────────────────────────────────────────────────────────────

/// Roll the chained skips for a new round and return the phase it opens
/// with. Each skip earns a roll for the next eligible phase; the first
/// phase that survives stops the chain.
fn roll_phase_skips<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R, events: &mut Vec<GameEvent>) -> Phase {
    if state.round <= 1 || state.settings.chance_level == ChanceLevel::Low {
        return Phase::Production;
    }

    let mut chain = vec![Phase::Production];
    if state.trade_enabled() {
        chain.push(Phase::Trade);
    }
    chain.push(Phase::Shipment);

    for phase in chain {
        if !rng.gen_bool(SKIP_CHANCE) {
            return phase;
        }
        let reasons = match phase {
            Phase::Production => PRODUCTION_SKIPS,
            Phase::Trade => TRADE_SKIPS,
            _ => SHIPMENT_SKIPS,
        };
        let reason = reasons.choose(rng).copied().unwrap_or("The game master intervened").to_string();
        info!(round = state.round, %phase, %reason, "phase skipped");
        let skip = PhaseSkip { phase, reason };
        state.skipped_phases.push(skip.clone());
        events.push(GameEvent::PhaseSkipped(skip));
    }
    Phase::Conquest
}

fn begin_round<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R, events: &mut Vec<GameEvent>) {
    state.skipped_phases.clear();
    state.pending_trade = None;
    info!(round = state.round, "round started");
    events.push(GameEvent::RoundStarted { round: state.round });
    let first = roll_phase_skips(state, rng, events);
    enter_phase(state, first, rng, events);
}

fn end_round<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R, events: &mut Vec<GameEvent>) {
    state.round += 1;

    let players = &state.players;
    state
        .player_order
        .retain(|id| players.get(id).is_some_and(|p| !p.eliminated));
    if !state.player_order.is_empty() {
        state.player_order.rotate_left(1);
    }
    reset_attacks(state);

    if let Some(leader) = victory_leader(state) {
        declare_winner(state, leader, events);
        return;
    }
    begin_round(state, rng, events);
}

// ── Victory ────────────────────────────────────────────────────────────

/// The one living player strictly ahead on cities with at least the
/// threshold. Ties at the top never win.
pub fn victory_leader(state: &GameState) -> Option<PlayerId> {
    let mut best: Option<(PlayerId, u32)> = None;
    let mut tied = false;
    for id in state.living_players() {
        let cities = state.city_count(&id);
        match &best {
            Some((_, top)) if cities < *top => {}
            Some((_, top)) if cities == *top => tied = true,
            _ => {
                best = Some((id, cities));
                tied = false;
            }
        }
    }
    let (leader, cities) = best?;
    (!tied && cities >= state.settings.victory_cities).then_some(leader)
}

fn declare_winner(state: &mut GameState, winner: PlayerId, events: &mut Vec<GameEvent>) {
    info!(%winner, round = state.round, "game over");
    state.winner = Some(winner.clone());
    events.push(GameEvent::GameOver { winner });
}

/// The last player holding territory wins on the spot.
fn check_last_standing(state: &mut GameState, events: &mut Vec<GameEvent>) -> bool {
    let living = state.living_players();
    match living.as_slice() {
        [only] => {
            declare_winner(state, only.clone(), events);
            true
        }
        _ => false,
    }
}

// ── Territory selection ────────────────────────────────────────────────

pub fn select_territory<R: Rng + ?Sized>(
    state: &mut GameState,
    actor: &PlayerId,
    territory: &TerritoryId,
    rng: &mut R,
) -> Result<Vec<GameEvent>> {
    state.require_turn(actor, Phase::TerritorySelection)?;
    if let Some(owner) = &state.territory(territory)?.owner {
        return Err(GameError::InvalidTarget(format!("{territory} is already held by {owner}")));
    }

    let mut events = Vec::new();
    state.territory_mut(territory)?.owner = Some(actor.clone());
    debug!(player = %actor, %territory, "territory claimed");
    events.push(GameEvent::TerritoryClaimed { player: actor.clone(), territory: territory.clone() });

    // Leftovers stay neutral once there are fewer than one per player.
    if state.unclaimed_count() < state.living_players().len() {
        state.round = 1;
        state.player_order.shuffle(rng);
        info!(neutral = state.unclaimed_count(), "territory selection complete");
        begin_round(state, rng, &mut events);
        return Ok(events);
    }

    let n = state.player_order.len().max(1);
    match scan_players(state, (state.turn_index + 1) % n, true, |_| true) {
        Some(i) => set_turn(state, i, &mut events),
        None => warn!(phase = %state.phase, "no player left to select a territory"),
    }
    Ok(events)
}

// ── Production ─────────────────────────────────────────────────────────

/// A living player who holds land but has no stockpile on the map.
fn needs_stockpile(state: &GameState, player: &Player) -> bool {
    !player.has_stockpile_placed() && state.territory_count(&player.id) > 0
}

/// Either hold production for stockpile placement or compute the yields
/// and wait for acknowledgement. Players who must place act first, in
/// seating order, without disturbing `player_order`.
fn start_production<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R, events: &mut Vec<GameEvent>) {
    if let Some(i) = scan_players(state, 0, false, |p| needs_stockpile(state, p)) {
        state.stockpile_placement_pending = true;
        set_turn(state, i, events);
        return;
    }

    state.stockpile_placement_pending = false;
    if let Some(i) = scan_players(state, 0, false, |_| true) {
        set_turn(state, i, events);
    }
    let yields = economy::compute_production(state, rng);
    debug!(round = state.round, lines = yields.len(), "production computed");
    state.pending_production = yields.clone();
    state.production_pending = true;
    events.push(GameEvent::ProductionReady(yields));
}

pub fn place_stockpile<R: Rng + ?Sized>(
    state: &mut GameState,
    actor: &PlayerId,
    territory: &TerritoryId,
    rng: &mut R,
) -> Result<Vec<GameEvent>> {
    state.require_turn(actor, Phase::Production)?;
    if !state.stockpile_placement_pending {
        return Err(GameError::WrongPhase { phase: state.phase });
    }
    navigation::place_stockpile(state, actor, territory)?;

    let mut events = vec![GameEvent::StockpilePlaced { player: actor.clone(), territory: territory.clone() }];
    start_production(state, rng, &mut events);
    Ok(events)
}

/// Credit the stored production once the collaborator has shown it,
/// then move on to Trade or Shipment.
pub fn acknowledge_production<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R) -> Result<Vec<GameEvent>> {
    if state.winner.is_some() {
        return Err(GameError::GameOver);
    }
    if state.phase != Phase::Production || !state.production_pending {
        return Err(GameError::WrongPhase { phase: state.phase });
    }

    let yields = std::mem::take(&mut state.pending_production);
    economy::apply_production(state, &yields);
    state.production_pending = false;

    let mut events = vec![GameEvent::ProductionApplied];
    let next = if state.trade_enabled() { Phase::Trade } else { Phase::Shipment };
    enter_phase(state, next, rng, &mut events);
    Ok(events)
}

// ── Trade ──────────────────────────────────────────────────────────────

pub fn propose_trade(state: &mut GameState, actor: &PlayerId, offer: TradeOffer) -> Result<Vec<GameEvent>> {
    state.require_turn(actor, Phase::Trade)?;
    if offer.from != *actor {
        return Err(GameError::InvalidTarget("offers are made in your own name".into()));
    }
    trade::propose(state, offer.clone())?;
    Ok(vec![GameEvent::TradeProposed(offer)])
}

/// The receiver answers the pending offer. Either way the proposer's
/// turn is over.
pub fn respond_trade<R: Rng + ?Sized>(
    state: &mut GameState,
    responder: &PlayerId,
    accept: bool,
    horse_destinations: &[TerritoryId],
    rng: &mut R,
) -> Result<Vec<GameEvent>> {
    if state.winner.is_some() {
        return Err(GameError::GameOver);
    }
    if state.phase != Phase::Trade {
        return Err(GameError::WrongPhase { phase: state.phase });
    }
    let Some(pending) = state.pending_trade.clone() else {
        return Err(GameError::NoPendingTrade);
    };

    let mut events = match trade::respond(state, responder, accept, horse_destinations)? {
        Some(offer) => vec![GameEvent::TradeCompleted(offer)],
        None => vec![GameEvent::TradeDeclined { from: pending.from, to: pending.to }],
    };
    advance_turn(state, rng, &mut events);
    Ok(events)
}

pub fn pass_trade<R: Rng + ?Sized>(state: &mut GameState, actor: &PlayerId, rng: &mut R) -> Result<Vec<GameEvent>> {
    state.require_turn(actor, Phase::Trade)?;
    if state.pending_trade.is_some() {
        return Err(GameError::TradePending);
    }
    let mut events = Vec::new();
    advance_turn(state, rng, &mut events);
    Ok(events)
}

// ── Shipment ───────────────────────────────────────────────────────────

pub fn move_stockpile<R: Rng + ?Sized>(
    state: &mut GameState,
    actor: &PlayerId,
    to: &TerritoryId,
    rng: &mut R,
) -> Result<Vec<GameEvent>> {
    state.require_turn(actor, Phase::Shipment)?;
    let from = state.player(actor)?.stockpile_territory.clone();
    navigation::move_stockpile(state, actor, to)?;

    let mut events = Vec::new();
    if let Some(from) = from {
        events.push(GameEvent::StockpileMoved { player: actor.clone(), from, to: to.clone() });
    }
    advance_turn(state, rng, &mut events);
    Ok(events)
}

pub fn move_unit<R: Rng + ?Sized>(
    state: &mut GameState,
    actor: &PlayerId,
    mv: &UnitMove,
    rng: &mut R,
) -> Result<Vec<GameEvent>> {
    state.require_turn(actor, Phase::Shipment)?;
    let outcome = navigation::move_unit(state, actor, mv)?;
    let mut events = vec![GameEvent::UnitMoved { player: actor.clone(), unit: mv.clone(), outcome }];
    advance_turn(state, rng, &mut events);
    Ok(events)
}

pub fn skip_shipment<R: Rng + ?Sized>(state: &mut GameState, actor: &PlayerId, rng: &mut R) -> Result<Vec<GameEvent>> {
    state.require_turn(actor, Phase::Shipment)?;
    let mut events = Vec::new();
    advance_turn(state, rng, &mut events);
    Ok(events)
}

// ── Conquest ───────────────────────────────────────────────────────────

pub fn attack<R: Rng + ?Sized>(
    state: &mut GameState,
    actor: &PlayerId,
    plan: &AttackPlan,
    rng: &mut R,
) -> Result<Vec<GameEvent>> {
    state.require_turn(actor, Phase::Conquest)?;
    let budget = state.player(actor)?.attacks_remaining;
    if budget == 0 {
        return Err(GameError::NoAttacksRemaining);
    }

    let report = combat::attack(state, actor, plan, rng)?;

    // Losing the opening attack forfeits the second one.
    let opening = budget == ATTACKS_PER_ROUND;
    let p = state.player_mut(actor)?;
    p.attacks_remaining = if p.eliminated || (opening && !report.attacker_won) { 0 } else { budget - 1 };
    let out_of_attacks = p.attacks_remaining == 0;

    let eliminated = report.eliminated.clone();
    let mut events = vec![GameEvent::CombatResolved(report)];
    events.extend(eliminated.into_iter().map(|player| GameEvent::PlayerEliminated { player }));

    if check_last_standing(state, &mut events) {
        return Ok(events);
    }
    if out_of_attacks {
        advance_turn(state, rng, &mut events);
    }
    Ok(events)
}

// ── Development ────────────────────────────────────────────────────────

pub fn buy_card<R: Rng + ?Sized>(
    state: &mut GameState,
    actor: &PlayerId,
    kind: CardKind,
    resource: StockResource,
    rng: &mut R,
) -> Result<Vec<GameEvent>> {
    let card = cards::buy_card(state, actor, kind, resource, rng)?;
    Ok(vec![GameEvent::CardBought { player: actor.clone(), card }])
}

pub fn build(state: &mut GameState, actor: &PlayerId, req: &BuildRequest) -> Result<Vec<GameEvent>> {
    economy::build(state, actor, req)?;
    Ok(vec![GameEvent::Built { player: actor.clone(), request: req.clone() }])
}

/// Finish the actor's turn in whichever phase is running. In Conquest
/// this gives up any attacks left.
pub fn end_turn<R: Rng + ?Sized>(state: &mut GameState, actor: &PlayerId, rng: &mut R) -> Result<Vec<GameEvent>> {
    match state.phase {
        Phase::Trade => pass_trade(state, actor, rng),
        Phase::Shipment => skip_shipment(state, actor, rng),
        Phase::Conquest | Phase::Development => {
            state.require_turn(actor, state.phase)?;
            state.player_mut(actor)?.attacks_remaining = 0;
            let mut events = Vec::new();
            advance_turn(state, rng, &mut events);
            Ok(events)
        }
        Phase::TerritorySelection | Phase::Production => Err(GameError::WrongPhase { phase: state.phase }),
    }
}
