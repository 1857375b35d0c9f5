// ═══════════════════════════════════════════════════════════════════════
// Combat cards — weighted catalogs, drawing, buying and hand handling
// ═══════════════════════════════════════════════════════════════════════

use crate::error::{GameError, Result};
use crate::types::*;
use rand::Rng;
use tracing::debug;

/// Static description of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardDef {
    pub name: &'static str,
    pub description: &'static str,
    pub rarity: Rarity,
    pub effect: CardEffect,
    pub value: u32,
    /// Draw weight out of `CATALOG_WEIGHT`.
    pub weight: u32,
}

pub const CATALOG_WEIGHT: u32 = 1000;

/// Resource units one card costs.
pub const CARD_PRICE: u32 = 2;

macro_rules! card {
    ($name:expr, $rarity:ident, $effect:ident, $value:expr, $weight:expr, $desc:expr) => {
        CardDef {
            name: $name,
            description: $desc,
            rarity: Rarity::$rarity,
            effect: CardEffect::$effect,
            value: $value,
            weight: $weight,
        }
    };
}

// ── Catalogs ───────────────────────────────────────────────────────────

pub static ATTACK_CATALOG: [CardDef; 9] = [
    card!("Reinforcements",     Common,   Flat,             1, 300, "+1 attack"),
    card!("War Drums",          Common,   Flat,             2, 220, "+2 attack"),
    card!("Siege Ladders",      Uncommon, Flat,             3, 120, "+3 attack"),
    card!("Rally Cavalry",      Uncommon, RallyCavalry,     2,  90, "+2 per adjacent horse"),
    card!("Arsenal",            Uncommon, Arsenal,          2,  80, "+2 per adjacent weapon"),
    card!("Naval Bombardment",  Rare,     NavalBombardment, 2,  60, "+2 per boat on bordering water"),
    card!("Blitz",              Rare,     Blitz,            1,  50, "+1 attack; on victory your other cards return to hand"),
    card!("Safe Retreat",       Rare,     SafeRetreat,      0,  40, "a brought unit survives defeat"),
    card!("Double Attack",      Epic,     DoubleAttack,     0,  40, "doubles base attack strength"),
];

pub static DEFENSE_CATALOG: [CardDef; 9] = [
    card!("Fortify",            Common,   Flat,             1, 300, "+1 defense"),
    card!("Stone Walls",        Common,   Flat,             2, 220, "+2 defense"),
    card!("Militia Levy",       Uncommon, Flat,             3, 120, "+3 defense"),
    card!("Shield Wall",        Uncommon, ShieldWall,       0, 100, "cancels one random attack card"),
    card!("Watchtower",         Uncommon, Flat,             2,  40, "+2 defense"),
    card!("Sabotage",           Rare,     Sabotage,         0,  80, "attacker loses adjacent weapon bonuses"),
    card!("Bribe",              Rare,     Bribe,            0,  60, "pay 3 gold to win outright"),
    card!("Counter-Attack",     Epic,     CounterAttack,    0,  40, "on victory, seize a territory next to the battle"),
    card!("Double Defense",     Epic,     DoubleDefense,    0,  40, "doubles base defense strength"),
];

pub fn catalog(kind: CardKind) -> &'static [CardDef] {
    match kind {
        CardKind::Attack => &ATTACK_CATALOG,
        CardKind::Defense => &DEFENSE_CATALOG,
    }
}

impl CardDef {
    pub fn instantiate(&self, kind: CardKind, id: u32) -> CombatCard {
        CombatCard {
            id,
            name: self.name.to_string(),
            description: self.description.to_string(),
            kind,
            rarity: self.rarity,
            effect: self.effect,
            value: self.value,
        }
    }
}

// ── Drawing ────────────────────────────────────────────────────────────

/// Pick a catalog entry by weight.
pub fn draw_def<R: Rng + ?Sized>(kind: CardKind, rng: &mut R) -> &'static CardDef {
    let cards = catalog(kind);
    let total: u32 = cards.iter().map(|c| c.weight).sum();
    let mut roll = rng.gen_range(0..total);
    for c in cards {
        if roll < c.weight {
            return c;
        }
        roll -= c.weight;
    }
    &cards[cards.len() - 1]
}

pub fn draw_card<R: Rng + ?Sized>(kind: CardKind, rng: &mut R, id: u32) -> CombatCard {
    draw_def(kind, rng).instantiate(kind, id)
}

// ── Buying ─────────────────────────────────────────────────────────────

/// Pay 2 of one stockpile resource for a random card of `kind`.
pub fn buy_card<R: Rng + ?Sized>(
    state: &mut GameState,
    player: &PlayerId,
    kind: CardKind,
    resource: StockResource,
    rng: &mut R,
) -> Result<CombatCard> {
    state.require_turn(player, Phase::Development)?;
    if !state.settings.cards_enabled() {
        return Err(GameError::CardsDisabled);
    }

    let p = state.player(player)?;
    if p.hand(kind).len() >= HAND_LIMIT {
        return Err(GameError::HandFull);
    }
    if p.stockpile.get(resource) < CARD_PRICE {
        return Err(GameError::InsufficientResources);
    }

    let id = state.next_card_id;
    state.next_card_id += 1;
    let card = draw_card(kind, rng, id);

    let p = state.player_mut(player)?;
    *p.stockpile.get_mut(resource) -= CARD_PRICE;
    p.hand_mut(kind).push(card.clone());
    debug!(%player, card = %card.name, "bought card");
    Ok(card)
}

// ── Hands ──────────────────────────────────────────────────────────────

/// Check every id is in the hand, with no repeats.
pub fn check_cards(player: &Player, kind: CardKind, ids: &[u32]) -> Result<()> {
    let hand = player.hand(kind);
    for (i, id) in ids.iter().enumerate() {
        if ids[..i].contains(id) || !hand.iter().any(|c| c.id == *id) {
            return Err(GameError::CardNotInHand(*id));
        }
    }
    Ok(())
}

/// Remove the listed cards from the hand. All or nothing.
pub fn take_cards(player: &mut Player, kind: CardKind, ids: &[u32]) -> Result<Vec<CombatCard>> {
    check_cards(player, kind, ids)?;
    let hand = player.hand_mut(kind);
    let mut taken = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(pos) = hand.iter().position(|c| c.id == *id) {
            taken.push(hand.remove(pos));
        }
    }
    Ok(taken)
}

/// Give cards back, stopping at the hand limit. Returns how many fit.
pub fn return_cards(player: &mut Player, kind: CardKind, cards: Vec<CombatCard>) -> usize {
    let hand = player.hand_mut(kind);
    let mut returned = 0;
    for c in cards {
        if hand.len() >= HAND_LIMIT {
            break;
        }
        hand.push(c);
        returned += 1;
    }
    returned
}
