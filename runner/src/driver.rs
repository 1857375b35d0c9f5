// ═══════════════════════════════════════════════════════════════════════
// Random Driver — picks a random legal action for whoever the engine is
// waiting on, and plays whole matches with it.
// A soak harness for the engine, not an opponent.
// ═══════════════════════════════════════════════════════════════════════

use conquest_engine::cards::CARD_PRICE;
use conquest_engine::combat::{adjacency_strength, AttackPlan};
use conquest_engine::economy::{BuildOption, BuildRequest, Structure};
use conquest_engine::engine::{self, Action, GameEvent};
use conquest_engine::navigation::{MovableUnit, UnitMove};
use conquest_engine::trade::{TradeBundle, TradeOffer};
use conquest_engine::types::*;
use conquest_engine::{acknowledge_production, apply_action, GameError};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{actor} tried {action} and was refused: {source}")]
    Rejected {
        actor: PlayerId,
        action: String,
        #[source]
        source: GameError,
    },
    #[error("no decision to make in {phase} of round {round}")]
    Stuck { phase: Phase, round: u32 },
    #[error("match exceeded {0} steps without a winner")]
    StepLimit(usize),
}

pub struct RandomDriver {
    rng: ChaCha8Rng,
}

impl RandomDriver {
    pub fn new(seed: u64) -> Self {
        RandomDriver { rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    /// The next action and who sends it. `None` when nobody can act.
    pub fn choose(&mut self, state: &GameState) -> Option<(PlayerId, Action)> {
        if state.winner.is_some() || state.production_pending {
            return None;
        }
        if let Some(offer) = &state.pending_trade {
            let accept = self.rng.gen_bool(0.5);
            return Some((offer.to.clone(), Action::RespondTrade { accept, horse_destinations: Vec::new() }));
        }

        let me = state.current_player.clone();
        let action = match state.phase {
            Phase::TerritorySelection => {
                Action::SelectTerritory(engine::selectable_territories(state).choose(&mut self.rng)?.clone())
            }
            Phase::Production => {
                let owned: Vec<TerritoryId> = state.territories_owned_by(&me).map(|t| t.id.clone()).collect();
                Action::PlaceStockpile(owned.choose(&mut self.rng)?.clone())
            }
            Phase::Trade => self.trade(state, &me),
            Phase::Shipment => self.shipment(state, &me),
            Phase::Conquest => self.conquest(state, &me),
            Phase::Development => self.development(state, &me),
        };
        Some((me, action))
    }

    fn trade(&mut self, state: &GameState, me: &PlayerId) -> Action {
        let partners: Vec<PlayerId> = state.living_players().into_iter().filter(|p| p != me).collect();
        let stock = state.players.get(me).map(|p| p.stockpile).unwrap_or_default();
        let spare: Vec<StockResource> = StockResource::ALL.into_iter().filter(|r| stock.get(*r) > 0).collect();

        let (Some(to), Some(&resource)) = (partners.choose(&mut self.rng), spare.choose(&mut self.rng)) else {
            return Action::PassTrade;
        };
        if !self.rng.gen_bool(0.5) {
            return Action::PassTrade;
        }
        let mut give = TradeBundle::default();
        match resource {
            StockResource::Coal => give.coal = 1,
            StockResource::Gold => give.gold = 1,
            StockResource::Iron => give.iron = 1,
            StockResource::Timber => give.timber = 1,
        }
        Action::ProposeTrade(TradeOffer {
            from: me.clone(),
            to: to.clone(),
            give,
            request: TradeBundle::default(),
            request_horse_destinations: Vec::new(),
        })
    }

    fn shipment(&mut self, state: &GameState, me: &PlayerId) -> Action {
        let units = engine::movable_units(state, me);
        let depots = engine::stockpile_destinations(state, me);
        match self.rng.gen_range(0..3) {
            0 if !units.is_empty() => {
                let unit = &units[self.rng.gen_range(0..units.len())];
                self.unit_move(state, unit).map_or(Action::SkipShipment, Action::MoveUnit)
            }
            1 if !depots.is_empty() => depots
                .choose(&mut self.rng)
                .map_or(Action::SkipShipment, |to| Action::MoveStockpile(to.clone())),
            _ => Action::SkipShipment,
        }
    }

    fn unit_move(&mut self, state: &GameState, unit: &MovableUnit) -> Option<UnitMove> {
        let mv = match unit {
            MovableUnit::Horse { from, destinations, can_carry_weapon } => {
                let to = destinations.choose(&mut self.rng)?.clone();
                let free = state.territories.get(&to).is_some_and(|t| !t.has_weapon);
                let carry_weapon = *can_carry_weapon && free && self.rng.gen_bool(0.5);
                UnitMove::Horse { from: from.clone(), to, carry_weapon }
            }
            MovableUnit::Weapon { from, destinations } => UnitMove::Weapon {
                from: from.clone(),
                to: destinations.choose(&mut self.rng)?.clone(),
            },
            MovableUnit::Boat { from, water_body, destinations } => {
                let src = state.territories.get(from)?;
                UnitMove::Boat {
                    from: from.clone(),
                    to: destinations.choose(&mut self.rng)?.clone(),
                    water_body: water_body.clone(),
                    carry_horse: src.has_horse && self.rng.gen_bool(0.5),
                    carry_weapon: src.has_weapon && self.rng.gen_bool(0.5),
                }
            }
        };
        Some(mv)
    }

    /// Random allies who border the target, each picking a side.
    fn rally_allies(&mut self, state: &GameState, me: &PlayerId, plan: &mut AttackPlan) {
        let defender = state.territories.get(&plan.target).and_then(|t| t.owner.clone());
        for ally in state.living_players() {
            if ally == *me || Some(&ally) == defender.as_ref() {
                continue;
            }
            if adjacency_strength(state, &ally, &plan.target) == 0 {
                continue;
            }
            match self.rng.gen_range(0..3) {
                0 => plan.attacker_allies.push(ally),
                1 => plan.defender_allies.push(ally),
                _ => {}
            }
        }
    }

    fn conquest(&mut self, state: &GameState, me: &PlayerId) -> Action {
        let targets: Vec<TerritoryId> = engine::attackable_targets(state, me)
            .into_iter()
            .filter(|t| engine::preview_attack(state, me, &AttackPlan::new(t.clone())).is_ok())
            .collect();
        let Some(target) = targets.choose(&mut self.rng).cloned() else {
            return Action::EndTurn;
        };
        if !self.rng.gen_bool(0.8) {
            return Action::EndTurn;
        }

        let mut plan = AttackPlan::new(target.clone());
        self.rally_allies(state, me, &mut plan);
        if state.settings.cards_enabled() && self.rng.gen_bool(0.5) {
            if let Some(p) = state.players.get(me) {
                plan.attack_cards = p.attack_cards.iter().map(|c| c.id).collect();
            }
            let owner = state.territories.get(&target).and_then(|t| t.owner.as_ref());
            if let Some(d) = owner.and_then(|o| state.players.get(o)) {
                plan.defense_cards = d.defense_cards.iter().map(|c| c.id).collect();
            }
        }

        match engine::preview_attack(state, me, &plan) {
            Ok(preview) => {
                debug!(attacker = %me, %target, odds = preview.win_probability, "attack planned");
                Action::Attack(plan)
            }
            Err(_) => Action::Attack(AttackPlan::new(target)),
        }
    }

    fn development(&mut self, state: &GameState, me: &PlayerId) -> Action {
        let options = engine::build_options(state, me);
        if let Some(option) = options.choose(&mut self.rng) {
            if self.rng.gen_bool(0.6) {
                return Action::Build(build_request(option));
            }
        }

        let Some(p) = state.players.get(me) else { return Action::EndTurn };
        if !state.settings.cards_enabled() || !self.rng.gen_bool(0.5) {
            return Action::EndTurn;
        }
        let kind = if self.rng.gen_bool(0.5) { CardKind::Attack } else { CardKind::Defense };
        let fund = StockResource::ALL.into_iter().find(|r| p.stockpile.get(*r) >= CARD_PRICE);
        match fund {
            Some(resource) if p.hand(kind).len() < HAND_LIMIT => Action::BuyCard { kind, resource },
            _ => Action::EndTurn,
        }
    }
}

fn build_request(option: &BuildOption) -> BuildRequest {
    let (structure, territory, payments, water_body) = match option {
        BuildOption::City { territory, payments } => (Structure::City, territory, payments, None),
        BuildOption::Weapon { territory, payments } => (Structure::Weapon, territory, payments, None),
        BuildOption::Boat { territory, water_body, payments } => {
            (Structure::Boat, territory, payments, Some(water_body.clone()))
        }
    };
    BuildRequest {
        structure,
        territory: territory.clone(),
        payment: payments.first().copied().unwrap_or(conquest_engine::economy::Payment::Gold),
        water_body,
    }
}

// ── Matches ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub territories: usize,
    pub cities: u32,
    pub eliminated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub seed: u64,
    pub winner: Option<PlayerId>,
    pub rounds: u32,
    pub steps: usize,
    pub battles: u32,
    pub skipped_phases: u32,
    pub players: Vec<PlayerSummary>,
}

/// Drive `state` until someone wins or `max_steps` is reached.
/// Engine randomness and driver choices use separate streams.
pub fn run_match(state: &mut GameState, seed: u64, max_steps: usize) -> Result<MatchSummary, DriverError> {
    let mut engine_rng = ChaCha8Rng::seed_from_u64(seed);
    let mut driver = RandomDriver::new(seed.wrapping_add(1));
    let mut steps = 0;
    let mut battles = 0;
    let mut skipped_phases = 0;

    while state.winner.is_none() {
        if steps >= max_steps {
            return Err(DriverError::StepLimit(max_steps));
        }
        steps += 1;

        let events = if state.production_pending {
            acknowledge_production(state, &mut engine_rng).map_err(|source| DriverError::Rejected {
                actor: state.current_player.clone(),
                action: "AcknowledgeProduction".into(),
                source,
            })?
        } else {
            let Some((actor, action)) = driver.choose(state) else {
                return Err(DriverError::Stuck { phase: state.phase, round: state.round });
            };
            let label = format!("{action:?}");
            apply_action(state, &actor, action, &mut engine_rng)
                .map_err(|source| DriverError::Rejected { actor, action: label, source })?
        };

        for event in &events {
            match event {
                GameEvent::CombatResolved(_) => battles += 1,
                GameEvent::PhaseSkipped(_) => skipped_phases += 1,
                GameEvent::RoundStarted { round } => debug!(round, "round started"),
                _ => {}
            }
        }
    }

    let summary = summarize(state, seed, steps, battles, skipped_phases);
    info!(seed, winner = ?summary.winner, rounds = summary.rounds, steps, "match finished");
    Ok(summary)
}

fn summarize(state: &GameState, seed: u64, steps: usize, battles: u32, skipped_phases: u32) -> MatchSummary {
    let players = state
        .players
        .values()
        .map(|p| PlayerSummary {
            id: p.id.clone(),
            territories: state.territory_count(&p.id),
            cities: state.city_count(&p.id),
            eliminated: p.eliminated,
        })
        .collect();
    MatchSummary {
        seed,
        winner: state.winner.clone(),
        rounds: state.round,
        steps,
        battles,
        skipped_phases,
        players,
    }
}
