// ═══════════════════════════════════════════════════════════════════════
// Combat — strength calculation, resolution and post-combat transfer
//
// Pipeline for one attack:
//   1. Validate the plan (target, brought unit, allies, cards)
//   2. Base strengths from adjacency, the target itself, brought units
//      and allies
//   3. Card pipeline (expert games): bribe → negation → synergy →
//      multipliers → flat bonuses → floor at zero
//   4. Roll according to the chance level
//   5. Transfer ownership, capture or destroy units, seize stockpiles,
//      check elimination
// ═══════════════════════════════════════════════════════════════════════

use crate::cards;
use crate::error::{GameError, Result};
use crate::navigation;
use crate::types::*;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Gold a defender pays for a Bribe to succeed.
pub const BRIBE_COST: u32 = 3;

// ── Plans ──────────────────────────────────────────────────────────────

/// A unit moved into the attack from its home territory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroughtUnit {
    Horse { from: TerritoryId, carry_weapon: bool },
    Weapon { from: TerritoryId },
    Boat {
        from: TerritoryId,
        water_body: WaterBodyId,
        carry_horse: bool,
        carry_weapon: bool,
    },
}

impl BroughtUnit {
    pub fn origin(&self) -> &TerritoryId {
        match self {
            BroughtUnit::Horse { from, .. }
            | BroughtUnit::Weapon { from }
            | BroughtUnit::Boat { from, .. } => from,
        }
    }

    /// Unit kinds travelling with this attack, carrier first.
    pub fn kinds(&self) -> Vec<UnitKind> {
        match self {
            BroughtUnit::Horse { carry_weapon, .. } => {
                let mut v = vec![UnitKind::Horse];
                if *carry_weapon {
                    v.push(UnitKind::Weapon);
                }
                v
            }
            BroughtUnit::Weapon { .. } => vec![UnitKind::Weapon],
            BroughtUnit::Boat { carry_horse, carry_weapon, .. } => {
                let mut v = vec![UnitKind::Boat];
                if *carry_horse {
                    v.push(UnitKind::Horse);
                }
                if *carry_weapon {
                    v.push(UnitKind::Weapon);
                }
                v
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackPlan {
    pub target: TerritoryId,
    pub brought: Option<BroughtUnit>,
    /// Third parties who voted to back the attacker.
    pub attacker_allies: Vec<PlayerId>,
    /// Third parties who voted to back the defender.
    pub defender_allies: Vec<PlayerId>,
    pub attack_cards: Vec<u32>,
    pub defense_cards: Vec<u32>,
}

impl AttackPlan {
    pub fn new(target: impl Into<TerritoryId>) -> Self {
        AttackPlan {
            target: target.into(),
            brought: None,
            attacker_allies: Vec::new(),
            defender_allies: Vec::new(),
            attack_cards: Vec::new(),
            defense_cards: Vec::new(),
        }
    }

    pub fn bringing(mut self, unit: BroughtUnit) -> Self {
        self.brought = Some(unit);
        self
    }
}

// ── Strength ───────────────────────────────────────────────────────────

/// Where a side's classic strength comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StrengthBreakdown {
    /// The contested territory's own defenses (defender only).
    pub territory: u32,
    /// Owned territories bordering the target.
    pub adjacency: u32,
    /// Brought units not already counted through adjacency.
    pub brought: u32,
    pub allies: u32,
}

impl StrengthBreakdown {
    pub fn total(&self) -> u32 {
        self.territory + self.adjacency + self.brought + self.allies
    }
}

/// Strength `player` lends to a battle at `target` from bordering land.
pub fn adjacency_strength(state: &GameState, player: &PlayerId, target: &TerritoryId) -> u32 {
    let Some(t) = state.territories.get(target) else { return 0 };
    t.adjacent
        .iter()
        .filter_map(|n| state.territories.get(n))
        .filter(|n| n.is_owned_by(player))
        .map(Territory::support_strength)
        .sum()
}

/// The target's own defenses: itself, its city, units and boats.
pub fn territory_defense(t: &Territory) -> u32 {
    t.support_strength() + UnitKind::Boat.strength() * t.total_boats()
}

fn brought_strength(state: &GameState, unit: &BroughtUnit, target: &TerritoryId) -> u32 {
    let from_adjacent = state
        .territories
        .get(unit.origin())
        .is_some_and(|t| t.is_adjacent(target));
    // Units on adjacent land are already in the adjacency sum. Boats never are.
    let gated = |k: UnitKind| if from_adjacent { 0 } else { k.strength() };
    match unit {
        BroughtUnit::Horse { carry_weapon, .. } => {
            gated(UnitKind::Horse) + if *carry_weapon { gated(UnitKind::Weapon) } else { 0 }
        }
        BroughtUnit::Weapon { .. } => gated(UnitKind::Weapon),
        BroughtUnit::Boat { carry_horse, carry_weapon, .. } => {
            UnitKind::Boat.strength()
                + if *carry_horse { gated(UnitKind::Horse) } else { 0 }
                + if *carry_weapon { gated(UnitKind::Weapon) } else { 0 }
        }
    }
}

// ── Validation ─────────────────────────────────────────────────────────

/// A validated battle with its classic strengths.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Battle {
    defender: Option<PlayerId>,
    attack: StrengthBreakdown,
    defense: StrengthBreakdown,
}

/// Can a boat of `player` sitting in `from` on `water` land at `target`?
fn boat_reaches(player: &PlayerId, from: &Territory, water: &WaterBodyId, target: &Territory) -> bool {
    from.is_owned_by(player) && from.boats_in(water) > 0 && target.borders_water(water)
}

fn check_brought(state: &GameState, attacker: &PlayerId, unit: &BroughtUnit, target: &Territory) -> Result<()> {
    let src = state.owned_territory(attacker, unit.origin())?;
    match unit {
        BroughtUnit::Horse { from, carry_weapon } => {
            if !src.has_horse {
                return Err(GameError::InvalidTarget(format!("no horse in {from}")));
            }
            if *carry_weapon && !src.has_weapon {
                return Err(GameError::InvalidTarget(format!("no weapon in {from}")));
            }
            if navigation::land_hops(state, attacker, from, &target.id).is_none() {
                return Err(GameError::Unreachable(target.id.clone()));
            }
        }
        BroughtUnit::Weapon { from } => {
            if !src.has_weapon {
                return Err(GameError::InvalidTarget(format!("no weapon in {from}")));
            }
            if !src.is_adjacent(&target.id) {
                return Err(GameError::Unreachable(target.id.clone()));
            }
        }
        BroughtUnit::Boat { from, water_body, carry_horse, carry_weapon } => {
            if src.boats_in(water_body) == 0 {
                return Err(GameError::InvalidTarget(format!("no boat from {from} on {water_body}")));
            }
            if *carry_horse && !src.has_horse {
                return Err(GameError::InvalidTarget(format!("no horse in {from}")));
            }
            if *carry_weapon && !src.has_weapon {
                return Err(GameError::InvalidTarget(format!("no weapon in {from}")));
            }
            if !boat_reaches(attacker, src, water_body, target) {
                return Err(GameError::Unreachable(target.id.clone()));
            }
            if !target.has_boat_capacity() {
                return Err(GameError::SlotOccupied(target.id.clone()));
            }
        }
    }
    Ok(())
}

fn check_allies(
    state: &GameState,
    attacker: &PlayerId,
    defender: Option<&PlayerId>,
    plan: &AttackPlan,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for ally in plan.attacker_allies.iter().chain(&plan.defender_allies) {
        if !seen.insert(ally) {
            return Err(GameError::InvalidTarget(format!("{ally} cannot back a battle twice")));
        }
        let p = state.player(ally)?;
        if p.eliminated || ally == attacker || Some(ally) == defender {
            return Err(GameError::InvalidTarget(format!("{ally} cannot ally in this battle")));
        }
        if adjacency_strength(state, ally, &plan.target) == 0 {
            return Err(GameError::InvalidTarget(format!("{ally} does not border {}", plan.target)));
        }
    }
    Ok(())
}

fn check_plan_cards(state: &GameState, attacker: &PlayerId, defender: Option<&PlayerId>, plan: &AttackPlan) -> Result<()> {
    if plan.attack_cards.is_empty() && plan.defense_cards.is_empty() {
        return Ok(());
    }
    if !state.settings.cards_enabled() {
        return Err(GameError::CardsDisabled);
    }
    cards::check_cards(state.player(attacker)?, CardKind::Attack, &plan.attack_cards)?;
    if !plan.defense_cards.is_empty() {
        let Some(defender) = defender else {
            return Err(GameError::InvalidTarget("an unclaimed territory plays no cards".into()));
        };
        cards::check_cards(state.player(defender)?, CardKind::Defense, &plan.defense_cards)?;
    }
    Ok(())
}

fn assess(state: &GameState, attacker: &PlayerId, plan: &AttackPlan) -> Result<Battle> {
    let target = state.territory(&plan.target)?;
    if target.is_owned_by(attacker) {
        return Err(GameError::InvalidTarget(format!("{} is already yours", target.id)));
    }
    let defender = target.owner.clone();

    let adjacency = adjacency_strength(state, attacker, &target.id);
    let borders_own_land = target
        .adjacent
        .iter()
        .any(|n| state.territories.get(n).is_some_and(|t| t.is_owned_by(attacker)));
    let by_boat = matches!(plan.brought, Some(BroughtUnit::Boat { .. }));
    if !borders_own_land && !by_boat {
        return Err(GameError::Unreachable(target.id.clone()));
    }

    let brought = match &plan.brought {
        Some(unit) => {
            check_brought(state, attacker, unit, target)?;
            brought_strength(state, unit, &target.id)
        }
        None => 0,
    };

    check_allies(state, attacker, defender.as_ref(), plan)?;
    check_plan_cards(state, attacker, defender.as_ref(), plan)?;

    let ally_sum = |allies: &[PlayerId]| -> u32 {
        allies.iter().map(|a| adjacency_strength(state, a, &target.id)).sum()
    };

    let attack = StrengthBreakdown {
        territory: 0,
        adjacency,
        brought,
        allies: ally_sum(&plan.attacker_allies),
    };
    let defense = StrengthBreakdown {
        territory: territory_defense(target),
        adjacency: defender.as_ref().map_or(0, |d| adjacency_strength(state, d, &target.id)),
        brought: 0,
        allies: ally_sum(&plan.defender_allies),
    };

    Ok(Battle { defender, attack, defense })
}

// ── Resolution ─────────────────────────────────────────────────────────

/// Attacker's chance of winning given final strengths.
pub fn win_probability(chance: ChanceLevel, attack: u32, defense: u32) -> f64 {
    match chance {
        ChanceLevel::Low => {
            if attack >= defense { 1.0 } else { 0.0 }
        }
        ChanceLevel::Medium => {
            if attack > defense {
                1.0
            } else if attack == defense {
                0.5
            } else {
                0.0
            }
        }
        ChanceLevel::High => {
            if attack == 0 && defense == 0 {
                0.5
            } else {
                f64::from(attack) / f64::from(attack + defense)
            }
        }
    }
}

/// Decide a battle. Low never touches the random source.
pub fn resolve_roll<R: Rng + ?Sized>(chance: ChanceLevel, attack: u32, defense: u32, rng: &mut R) -> bool {
    match chance {
        ChanceLevel::Low => attack >= defense,
        ChanceLevel::Medium => attack > defense || (attack == defense && rng.gen_bool(0.5)),
        ChanceLevel::High => rng.gen_bool(win_probability(chance, attack, defense)),
    }
}

// ── Cards ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BribeOutcome {
    #[default]
    NotPlayed,
    Paid,
    Fizzled,
}

/// What the card pipeline did to the classic strengths.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CardAdjustments {
    pub bribe: BribeOutcome,
    /// Attack cards cancelled by Shield Wall.
    pub shield_walled: Vec<u32>,
    /// Adjacent attacker weapons whose bonus Sabotage removed.
    pub sabotaged_weapons: u32,
    pub synergy: u32,
    pub attack_doubled: bool,
    pub defense_doubled: bool,
    pub attack_flat: u32,
    pub defense_flat: u32,
    pub final_attack: u32,
    pub final_defense: u32,
}

fn has_effect(cards: &[CombatCard], effect: CardEffect) -> bool {
    cards.iter().any(|c| c.effect == effect)
}

fn is_synergy(effect: CardEffect) -> bool {
    matches!(effect, CardEffect::RallyCavalry | CardEffect::Arsenal | CardEffect::NavalBombardment)
}

/// Boats `player` keeps on water that borders `target`.
fn boats_bordering(state: &GameState, player: &PlayerId, target: &Territory) -> u32 {
    state
        .territories_owned_by(player)
        .map(|t| {
            t.boats
                .iter()
                .filter(|(w, _)| target.borders_water(w))
                .map(|(_, n)| *n)
                .sum::<u32>()
        })
        .sum()
}

/// Steps 2–6 of the card pipeline. Shield Wall must already have been
/// applied to `attack_cards`; the bribe outcome is passed through.
fn card_adjustments(
    state: &GameState,
    attacker: &PlayerId,
    target: &Territory,
    battle: &Battle,
    attack_cards: &[CombatCard],
    defense_cards: &[CombatCard],
    bribe: BribeOutcome,
    shield_walled: Vec<u32>,
) -> CardAdjustments {
    let adjacent_own: Vec<&Territory> = target
        .adjacent
        .iter()
        .filter_map(|n| state.territories.get(n))
        .filter(|t| t.is_owned_by(attacker))
        .collect();

    let sabotaged_weapons = if has_effect(defense_cards, CardEffect::Sabotage) {
        adjacent_own.iter().filter(|t| t.has_weapon).count() as u32
    } else {
        0
    };

    let synergy: u32 = attack_cards
        .iter()
        .map(|c| match c.effect {
            CardEffect::RallyCavalry => c.value * adjacent_own.iter().filter(|t| t.has_horse).count() as u32,
            CardEffect::Arsenal => c.value * adjacent_own.iter().filter(|t| t.has_weapon).count() as u32,
            CardEffect::NavalBombardment => c.value * boats_bordering(state, attacker, target),
            _ => 0,
        })
        .sum();

    let attack_doubled = has_effect(attack_cards, CardEffect::DoubleAttack);
    let defense_doubled = has_effect(defense_cards, CardEffect::DoubleDefense);
    let flat = |cards: &[CombatCard]| -> u32 {
        cards.iter().filter(|c| !is_synergy(c.effect)).map(|c| c.value).sum()
    };
    let attack_flat = flat(attack_cards);
    let defense_flat = flat(defense_cards);

    // Multipliers apply to the classic base only, not to card deltas.
    let base_attack = i64::from(battle.attack.total()) * if attack_doubled { 2 } else { 1 };
    let base_defense = i64::from(battle.defense.total()) * if defense_doubled { 2 } else { 1 };
    let sabotage = i64::from(sabotaged_weapons * UnitKind::Weapon.strength());

    let final_attack = (base_attack + i64::from(synergy) - sabotage + i64::from(attack_flat)).max(0);
    let final_defense = (base_defense + i64::from(defense_flat)).max(0);

    CardAdjustments {
        bribe,
        shield_walled,
        sabotaged_weapons,
        synergy,
        attack_doubled,
        defense_doubled,
        attack_flat,
        defense_flat,
        final_attack: u32::try_from(final_attack).unwrap_or(u32::MAX),
        final_defense: u32::try_from(final_defense).unwrap_or(u32::MAX),
    }
}

fn held_cards(player: &Player, kind: CardKind, ids: &[u32]) -> Vec<CombatCard> {
    ids.iter()
        .filter_map(|id| player.hand(kind).iter().find(|c| c.id == *id).cloned())
        .collect()
}

// ── Queries ────────────────────────────────────────────────────────────

/// Territories `player` may attack: bordering their land, or reachable
/// by one of their boats.
pub fn attackable_targets(state: &GameState, player: &PlayerId) -> Vec<TerritoryId> {
    let mut targets = BTreeSet::new();
    for own in state.territories_owned_by(player) {
        for n in &own.adjacent {
            if state.territories.get(n).is_some_and(|t| !t.is_owned_by(player)) {
                targets.insert(n.clone());
            }
        }
        for (water, count) in &own.boats {
            if *count == 0 {
                continue;
            }
            let Some(w) = state.water_bodies.get(water) else { continue };
            for shore in &w.territories {
                if state.territories.get(shore).is_some_and(|t| !t.is_owned_by(player)) {
                    targets.insert(shore.clone());
                }
            }
        }
    }
    targets.into_iter().collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackPreview {
    pub attacker: PlayerId,
    pub defender: Option<PlayerId>,
    pub target: TerritoryId,
    pub attack: StrengthBreakdown,
    pub defense: StrengthBreakdown,
    /// Present when cards are in play. Shield Wall is random and left out.
    pub cards: Option<CardAdjustments>,
    pub final_attack: u32,
    pub final_defense: u32,
    pub win_probability: f64,
}

/// Strength breakdown and odds for a plan, without changing anything.
pub fn preview_attack(state: &GameState, attacker: &PlayerId, plan: &AttackPlan) -> Result<AttackPreview> {
    let battle = assess(state, attacker, plan)?;
    let target = state.territory(&plan.target)?;

    let cards = if plan.attack_cards.is_empty() && plan.defense_cards.is_empty() {
        None
    } else {
        let attack_cards = held_cards(state.player(attacker)?, CardKind::Attack, &plan.attack_cards);
        let defense_cards = match &battle.defender {
            Some(d) => held_cards(state.player(d)?, CardKind::Defense, &plan.defense_cards),
            None => Vec::new(),
        };
        let bribe = bribe_outcome(state, battle.defender.as_ref(), &defense_cards);
        Some(card_adjustments(state, attacker, target, &battle, &attack_cards, &defense_cards, bribe, Vec::new()))
    };

    let (final_attack, final_defense) = match &cards {
        Some(c) => (c.final_attack, c.final_defense),
        None => (battle.attack.total(), battle.defense.total()),
    };
    let win_probability = if cards.as_ref().is_some_and(|c| c.bribe == BribeOutcome::Paid) {
        0.0
    } else {
        win_probability(state.settings.chance_level, final_attack, final_defense)
    };

    Ok(AttackPreview {
        attacker: attacker.clone(),
        defender: battle.defender,
        target: plan.target.clone(),
        attack: battle.attack,
        defense: battle.defense,
        cards,
        final_attack,
        final_defense,
        win_probability,
    })
}

fn bribe_outcome(state: &GameState, defender: Option<&PlayerId>, defense_cards: &[CombatCard]) -> BribeOutcome {
    if !has_effect(defense_cards, CardEffect::Bribe) {
        return BribeOutcome::NotPlayed;
    }
    let gold = defender
        .and_then(|d| state.players.get(d))
        .map_or(0, |p| p.stockpile.gold);
    if gold >= BRIBE_COST {
        BribeOutcome::Paid
    } else {
        BribeOutcome::Fizzled
    }
}

// ── Attack ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatReport {
    pub attacker: PlayerId,
    pub defender: Option<PlayerId>,
    pub target: TerritoryId,
    pub attack: StrengthBreakdown,
    pub defense: StrengthBreakdown,
    pub cards: Option<CardAdjustments>,
    pub final_attack: u32,
    pub final_defense: u32,
    pub win_probability: f64,
    pub attacker_won: bool,
    /// Defending units that changed hands with the territory.
    pub captured: Vec<UnitKind>,
    pub captured_boats: u32,
    /// Brought units now standing in the captured territory.
    pub relocated: Vec<UnitKind>,
    /// Brought units lost in a failed attack.
    pub destroyed: Vec<UnitKind>,
    pub stockpile_captured: Option<Stockpile>,
    pub cards_returned: usize,
    /// Territory the defender took back with Counter-Attack.
    pub counter_seized: Option<TerritoryId>,
    pub eliminated: Vec<PlayerId>,
}

/// Mark a player out if they hold no territory. Returns true if newly out.
pub fn check_elimination(state: &mut GameState, player: &PlayerId) -> bool {
    if state.territory_count(player) > 0 {
        return false;
    }
    let Some(p) = state.players.get_mut(player) else { return false };
    if p.eliminated {
        return false;
    }
    p.eliminated = true;
    p.attacks_remaining = 0;
    p.stockpile_territory = None;
    info!(%player, "player eliminated");
    true
}

/// Hand `territory` to `new_owner`, seizing a stockpile kept there.
fn transfer_territory(state: &mut GameState, territory: &TerritoryId, new_owner: &PlayerId) -> Result<Option<Stockpile>> {
    let old_owner = state.territory(territory)?.owner.clone();
    state.territory_mut(territory)?.owner = Some(new_owner.clone());

    let Some(old) = old_owner else { return Ok(None) };
    let loser = state.player_mut(&old)?;
    if loser.stockpile_territory.as_ref() != Some(territory) {
        return Ok(None);
    }
    loser.stockpile_territory = None;
    let seized = loser.stockpile.take_all();
    state.player_mut(new_owner)?.stockpile.add(&seized);
    Ok(Some(seized))
}

fn remove_brought(state: &mut GameState, unit: &BroughtUnit) -> Result<()> {
    let src = state.territory_mut(unit.origin())?;
    match unit {
        BroughtUnit::Horse { carry_weapon, .. } => {
            src.has_horse = false;
            if *carry_weapon {
                src.has_weapon = false;
            }
        }
        BroughtUnit::Weapon { .. } => src.has_weapon = false,
        BroughtUnit::Boat { water_body, carry_horse, carry_weapon, .. } => {
            src.remove_boat(water_body);
            if *carry_horse {
                src.has_horse = false;
            }
            if *carry_weapon {
                src.has_weapon = false;
            }
        }
    }
    Ok(())
}

/// Fight one battle and apply its consequences. The caller owns turn
/// order and the attack budget.
pub fn attack<R: Rng + ?Sized>(
    state: &mut GameState,
    attacker: &PlayerId,
    plan: &AttackPlan,
    rng: &mut R,
) -> Result<CombatReport> {
    let battle = assess(state, attacker, plan)?;
    let chance = state.settings.chance_level;
    let uses_cards = !plan.attack_cards.is_empty() || !plan.defense_cards.is_empty();

    // Everything is validated; from here on the battle happens.
    let mut attack_cards = cards::take_cards(state.player_mut(attacker)?, CardKind::Attack, &plan.attack_cards)?;
    let defense_cards = match &battle.defender {
        Some(d) => cards::take_cards(state.player_mut(d)?, CardKind::Defense, &plan.defense_cards)?,
        None => Vec::new(),
    };

    let mut adjustments = None;
    let mut bribed = false;
    if uses_cards {
        let bribe = bribe_outcome(state, battle.defender.as_ref(), &defense_cards);
        if bribe == BribeOutcome::Paid {
            if let Some(d) = &battle.defender {
                state.player_mut(d)?.stockpile.gold -= BRIBE_COST;
            }
            bribed = true;
        }

        let mut shield_walled = Vec::new();
        for _ in defense_cards.iter().filter(|c| c.effect == CardEffect::ShieldWall) {
            if attack_cards.is_empty() {
                break;
            }
            let idx = rng.gen_range(0..attack_cards.len());
            shield_walled.push(attack_cards.remove(idx).id);
        }

        let target = state.territory(&plan.target)?;
        adjustments = Some(card_adjustments(
            state,
            attacker,
            target,
            &battle,
            &attack_cards,
            &defense_cards,
            bribe,
            shield_walled,
        ));
    }

    let (final_attack, final_defense) = match &adjustments {
        Some(c) => (c.final_attack, c.final_defense),
        None => (battle.attack.total(), battle.defense.total()),
    };
    let win_probability = if bribed { 0.0 } else { win_probability(chance, final_attack, final_defense) };
    let attacker_won = !bribed && resolve_roll(chance, final_attack, final_defense, rng);

    let mut report = CombatReport {
        attacker: attacker.clone(),
        defender: battle.defender.clone(),
        target: plan.target.clone(),
        attack: battle.attack,
        defense: battle.defense,
        cards: adjustments,
        final_attack,
        final_defense,
        win_probability,
        attacker_won,
        captured: Vec::new(),
        captured_boats: 0,
        relocated: Vec::new(),
        destroyed: Vec::new(),
        stockpile_captured: None,
        cards_returned: 0,
        counter_seized: None,
        eliminated: Vec::new(),
    };

    if attacker_won {
        conquer(state, attacker, plan, &mut report)?;
        if has_effect(&attack_cards, CardEffect::Blitz) {
            let back: Vec<CombatCard> = attack_cards
                .into_iter()
                .filter(|c| c.effect != CardEffect::Blitz)
                .collect();
            report.cards_returned = cards::return_cards(state.player_mut(attacker)?, CardKind::Attack, back);
        }
    } else {
        if let Some(unit) = &plan.brought {
            if !has_effect(&attack_cards, CardEffect::SafeRetreat) {
                remove_brought(state, unit)?;
                report.destroyed = unit.kinds();
            }
        }
        if let Some(defender) = &battle.defender {
            if has_effect(&defense_cards, CardEffect::CounterAttack) {
                counter_attack(state, attacker, defender, &plan.target, rng, &mut report)?;
            }
        }
    }

    info!(
        %attacker,
        target = %plan.target,
        attack = final_attack,
        defense = final_defense,
        won = attacker_won,
        "battle resolved"
    );
    Ok(report)
}

fn conquer(state: &mut GameState, attacker: &PlayerId, plan: &AttackPlan, report: &mut CombatReport) -> Result<()> {
    let arriving = plan.brought.as_ref().map(BroughtUnit::kinds).unwrap_or_default();
    let target = state.territory(&plan.target)?;

    for kind in [UnitKind::Horse, UnitKind::Weapon] {
        if target.has_unit(kind) && !arriving.contains(&kind) {
            report.captured.push(kind);
        }
    }
    report.captured_boats = target.total_boats();

    if let Some(unit) = &plan.brought {
        remove_brought(state, unit)?;
        let t = state.territory_mut(&plan.target)?;
        for kind in unit.kinds() {
            match kind {
                UnitKind::Horse => t.has_horse = true,
                UnitKind::Weapon => t.has_weapon = true,
                UnitKind::Boat => {
                    if let BroughtUnit::Boat { water_body, .. } = unit {
                        t.add_boat(water_body);
                    }
                }
            }
        }
        report.relocated = unit.kinds();
    }

    report.stockpile_captured = transfer_territory(state, &plan.target, attacker)?;
    if let Some(defender) = &report.defender {
        if check_elimination(state, defender) {
            report.eliminated.push(defender.clone());
        }
    }
    debug!(%attacker, target = %plan.target, captured = ?report.captured, "territory conquered");
    Ok(())
}

fn counter_attack<R: Rng + ?Sized>(
    state: &mut GameState,
    attacker: &PlayerId,
    defender: &PlayerId,
    target: &TerritoryId,
    rng: &mut R,
    report: &mut CombatReport,
) -> Result<()> {
    let candidates: Vec<TerritoryId> = state
        .territory(target)?
        .adjacent
        .iter()
        .filter(|n| state.territories.get(*n).is_some_and(|t| t.is_owned_by(attacker)))
        .cloned()
        .collect();
    let Some(seized) = candidates.choose(rng).cloned() else { return Ok(()) };

    if let Some(stock) = transfer_territory(state, &seized, defender)? {
        report.stockpile_captured = Some(stock);
    }
    if check_elimination(state, attacker) {
        report.eliminated.push(attacker.clone());
    }
    debug!(%defender, territory = %seized, "counter-attack seized territory");
    report.counter_seized = Some(seized);
    Ok(())
}
