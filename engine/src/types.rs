// ═══════════════════════════════════════════════════════════════════════
// Core types — entities of a single match
// Territories, water bodies, players and stockpiles are plain data
// holders with small invariant-preserving mutators. Everything is keyed
// by id so ownership can change hands without touching pointers.
// ═══════════════════════════════════════════════════════════════════════

use crate::error::{GameError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ── Identifiers ────────────────────────────────────────────────────────

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

string_id!(
    /// Stable player identifier, assigned by the lobby.
    PlayerId
);
string_id!(
    /// Territory identifier from the map graph.
    TerritoryId
);
string_id!(
    /// Water body identifier from the map graph.
    WaterBodyId
);

// ── Enums ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    TerritorySelection,
    Production,
    Trade,
    Shipment,
    Conquest,
    Development,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::TerritorySelection => write!(f, "Territory Selection"),
            Phase::Production => write!(f, "Production"),
            Phase::Trade => write!(f, "Trade"),
            Phase::Shipment => write!(f, "Shipment"),
            Phase::Conquest => write!(f, "Conquest"),
            Phase::Development => write!(f, "Development"),
        }
    }
}

/// Controls tie-breaking and how probabilistic combat is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChanceLevel {
    Low,
    Medium,
    High,
}

/// Expert games add combat cards on top of the classic rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameLevel {
    Beginner,
    Expert,
}

/// What a territory produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Resource {
    #[default]
    None,
    Coal,
    Gold,
    Iron,
    Timber,
    /// Grassland breeds horses instead of filling the stockpile.
    Grassland,
}

impl Resource {
    /// The stockpile counter this resource feeds, if any.
    pub fn stock(self) -> Option<StockResource> {
        match self {
            Resource::Coal => Some(StockResource::Coal),
            Resource::Gold => Some(StockResource::Gold),
            Resource::Iron => Some(StockResource::Iron),
            Resource::Timber => Some(StockResource::Timber),
            Resource::None | Resource::Grassland => None,
        }
    }
}

/// Resources that can be banked in a stockpile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StockResource {
    Coal,
    Gold,
    Iron,
    Timber,
}

impl StockResource {
    pub const ALL: [StockResource; 4] = [
        StockResource::Coal,
        StockResource::Gold,
        StockResource::Iron,
        StockResource::Timber,
    ];
}

impl fmt::Display for StockResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockResource::Coal => write!(f, "coal"),
            StockResource::Gold => write!(f, "gold"),
            StockResource::Iron => write!(f, "iron"),
            StockResource::Timber => write!(f, "timber"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerColor {
    Red,
    Blue,
    Green,
    Yellow,
    Purple,
    Orange,
    Black,
}

impl PlayerColor {
    pub const ALL: [PlayerColor; 7] = [
        PlayerColor::Red,
        PlayerColor::Blue,
        PlayerColor::Green,
        PlayerColor::Yellow,
        PlayerColor::Purple,
        PlayerColor::Orange,
        PlayerColor::Black,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Personality {
    Aggressive,
    Defensive,
    Balanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerKind {
    Human,
    Ai(Personality),
}

/// A player's standing answer when asked to join someone else's battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AllianceVote {
    Attacker,
    Defender,
    #[default]
    Neutral,
}

/// Map-placed unit types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    Horse,
    Weapon,
    Boat,
}

impl UnitKind {
    /// Flat strength a unit adds to the side it fights for.
    pub fn strength(self) -> u32 {
        match self {
            UnitKind::Horse => 1,
            UnitKind::Weapon => 3,
            UnitKind::Boat => 2,
        }
    }
}

// ── Settings ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub game_level: GameLevel,
    pub chance_level: ChanceLevel,
    /// Cities needed to win (a strict lead is also required).
    pub victory_cities: u32,
    pub map_id: String,
    pub max_players: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            game_level: GameLevel::Beginner,
            chance_level: ChanceLevel::Medium,
            victory_cities: 5,
            map_id: "demo".to_string(),
            max_players: 7,
        }
    }
}

impl Settings {
    pub fn cards_enabled(&self) -> bool {
        self.game_level == GameLevel::Expert
    }
}

// ── Stockpile ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stockpile {
    pub coal: u32,
    pub gold: u32,
    pub iron: u32,
    pub timber: u32,
}

impl Stockpile {
    pub fn new(coal: u32, gold: u32, iron: u32, timber: u32) -> Self {
        Stockpile { coal, gold, iron, timber }
    }

    pub fn get(&self, r: StockResource) -> u32 {
        match r {
            StockResource::Coal => self.coal,
            StockResource::Gold => self.gold,
            StockResource::Iron => self.iron,
            StockResource::Timber => self.timber,
        }
    }

    pub fn get_mut(&mut self, r: StockResource) -> &mut u32 {
        match r {
            StockResource::Coal => &mut self.coal,
            StockResource::Gold => &mut self.gold,
            StockResource::Iron => &mut self.iron,
            StockResource::Timber => &mut self.timber,
        }
    }

    pub fn add(&mut self, other: &Stockpile) {
        self.coal += other.coal;
        self.gold += other.gold;
        self.iron += other.iron;
        self.timber += other.timber;
    }

    pub fn can_afford(&self, cost: &Stockpile) -> bool {
        self.coal >= cost.coal
            && self.gold >= cost.gold
            && self.iron >= cost.iron
            && self.timber >= cost.timber
    }

    /// Subtract `cost`, or fail without touching anything.
    pub fn pay(&mut self, cost: &Stockpile) -> Result<()> {
        if !self.can_afford(cost) {
            return Err(GameError::InsufficientResources);
        }
        self.coal -= cost.coal;
        self.gold -= cost.gold;
        self.iron -= cost.iron;
        self.timber -= cost.timber;
        Ok(())
    }

    /// Empty the stockpile, returning what was in it.
    pub fn take_all(&mut self) -> Stockpile {
        std::mem::take(self)
    }

    pub fn total(&self) -> u32 {
        self.coal + self.gold + self.iron + self.timber
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

// ── Combat cards ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardKind {
    Attack,
    Defense,
}

/// Cosmetic tier; draw odds come from the catalog weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardEffect {
    /// Adds `value` after multipliers.
    Flat,
    DoubleAttack,
    DoubleDefense,
    /// `value` per attacker horse adjacent to the target.
    RallyCavalry,
    /// `value` per attacker weapon adjacent to the target.
    Arsenal,
    /// `value` per attacker boat on water bordering the target.
    NavalBombardment,
    Blitz,
    SafeRetreat,
    ShieldWall,
    Sabotage,
    Bribe,
    CounterAttack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatCard {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub kind: CardKind,
    pub rarity: Rarity,
    pub effect: CardEffect,
    pub value: u32,
}

/// Maximum cards of each kind a player may hold.
pub const HAND_LIMIT: usize = 5;

/// Attacks every player gets per Conquest phase.
pub const ATTACKS_PER_ROUND: u8 = 2;

// ── Player ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: PlayerColor,
    pub kind: PlayerKind,
    pub stockpile: Stockpile,
    /// Territory holding the stockpile; `None` until placed or after capture.
    pub stockpile_territory: Option<TerritoryId>,
    pub attacks_remaining: u8,
    pub eliminated: bool,
    pub alliance_vote: AllianceVote,
    pub attack_cards: Vec<CombatCard>,
    pub defense_cards: Vec<CombatCard>,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, color: PlayerColor, kind: PlayerKind) -> Self {
        Player {
            id,
            name: name.into(),
            color,
            kind,
            stockpile: Stockpile::default(),
            stockpile_territory: None,
            attacks_remaining: ATTACKS_PER_ROUND,
            eliminated: false,
            alliance_vote: AllianceVote::default(),
            attack_cards: Vec::new(),
            defense_cards: Vec::new(),
        }
    }

    pub fn hand(&self, kind: CardKind) -> &Vec<CombatCard> {
        match kind {
            CardKind::Attack => &self.attack_cards,
            CardKind::Defense => &self.defense_cards,
        }
    }

    pub fn hand_mut(&mut self, kind: CardKind) -> &mut Vec<CombatCard> {
        match kind {
            CardKind::Attack => &mut self.attack_cards,
            CardKind::Defense => &mut self.defense_cards,
        }
    }

    pub fn has_stockpile_placed(&self) -> bool {
        self.stockpile_territory.is_some()
    }
}

// ── Territory / Water body ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Territory {
    pub id: TerritoryId,
    pub name: String,
    pub owner: Option<PlayerId>,
    pub resource: Resource,
    pub has_city: bool,
    pub has_weapon: bool,
    pub has_horse: bool,
    /// Boats are partitioned per water body, never territory-global.
    pub boats: BTreeMap<WaterBodyId, u32>,
    pub adjacent: Vec<TerritoryId>,
    /// Coastal cells; caps the total number of boats.
    pub coastal_tiles: u32,
    pub water_bodies: Vec<WaterBodyId>,
}

impl Territory {
    pub fn is_owned_by(&self, player: &PlayerId) -> bool {
        self.owner.as_ref() == Some(player)
    }

    pub fn is_adjacent(&self, other: &TerritoryId) -> bool {
        self.adjacent.contains(other)
    }

    pub fn is_coastal(&self) -> bool {
        self.coastal_tiles > 0 && !self.water_bodies.is_empty()
    }

    pub fn borders_water(&self, water: &WaterBodyId) -> bool {
        self.water_bodies.contains(water)
    }

    pub fn total_boats(&self) -> u32 {
        self.boats.values().sum()
    }

    pub fn boats_in(&self, water: &WaterBodyId) -> u32 {
        self.boats.get(water).copied().unwrap_or(0)
    }

    pub fn has_boat_capacity(&self) -> bool {
        self.total_boats() < self.coastal_tiles
    }

    pub fn has_unit(&self, kind: UnitKind) -> bool {
        match kind {
            UnitKind::Horse => self.has_horse,
            UnitKind::Weapon => self.has_weapon,
            UnitKind::Boat => self.total_boats() > 0,
        }
    }

    pub fn add_boat(&mut self, water: &WaterBodyId) {
        *self.boats.entry(water.clone()).or_insert(0) += 1;
    }

    /// Remove one boat from `water`; false if none was there.
    pub fn remove_boat(&mut self, water: &WaterBodyId) -> bool {
        match self.boats.get_mut(water) {
            Some(n) if *n > 0 => {
                *n -= 1;
                if *n == 0 {
                    self.boats.remove(water);
                }
                true
            }
            _ => false,
        }
    }

    /// Strength this territory lends to its owner in a neighbouring battle.
    pub fn support_strength(&self) -> u32 {
        let mut s = 1;
        if self.has_city {
            s += 2;
        }
        if self.has_weapon {
            s += UnitKind::Weapon.strength();
        }
        if self.has_horse {
            s += UnitKind::Horse.strength();
        }
        s
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterBody {
    pub id: WaterBodyId,
    pub territories: Vec<TerritoryId>,
}

// ── Phase skips ────────────────────────────────────────────────────────

/// A phase the game master skipped this round, with flavour text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSkip {
    pub phase: Phase,
    pub reason: String,
}

// ── Game State ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub id: String,
    pub settings: Settings,
    /// 0 during territory selection, 1 for the first full year.
    pub round: u32,
    pub phase: Phase,
    pub current_player: PlayerId,
    /// Position of `current_player` in `player_order`.
    pub turn_index: usize,
    pub player_order: Vec<PlayerId>,
    pub players: BTreeMap<PlayerId, Player>,
    pub territories: BTreeMap<TerritoryId, Territory>,
    pub water_bodies: BTreeMap<WaterBodyId, WaterBody>,
    /// Informational; cleared when a round starts.
    pub skipped_phases: Vec<PhaseSkip>,
    /// Production computed, waiting for the collaborator to acknowledge.
    pub production_pending: bool,
    /// Some living player must place a stockpile before production.
    pub stockpile_placement_pending: bool,
    pub pending_production: Vec<crate::economy::ProductionYield>,
    pub pending_trade: Option<crate::trade::TradeOffer>,
    pub winner: Option<PlayerId>,
    pub next_card_id: u32,
}

impl GameState {
    pub fn player(&self, id: &PlayerId) -> Result<&Player> {
        self.players
            .get(id)
            .ok_or_else(|| GameError::UnknownPlayer(id.clone()))
    }

    pub fn player_mut(&mut self, id: &PlayerId) -> Result<&mut Player> {
        self.players
            .get_mut(id)
            .ok_or_else(|| GameError::UnknownPlayer(id.clone()))
    }

    pub fn territory(&self, id: &TerritoryId) -> Result<&Territory> {
        self.territories
            .get(id)
            .ok_or_else(|| GameError::UnknownTerritory(id.clone()))
    }

    pub fn territory_mut(&mut self, id: &TerritoryId) -> Result<&mut Territory> {
        self.territories
            .get_mut(id)
            .ok_or_else(|| GameError::UnknownTerritory(id.clone()))
    }

    /// A territory that must be owned by `player`.
    pub fn owned_territory(&self, player: &PlayerId, id: &TerritoryId) -> Result<&Territory> {
        let t = self.territory(id)?;
        if !t.is_owned_by(player) {
            return Err(GameError::NotOwned(id.clone()));
        }
        Ok(t)
    }

    pub fn territories_owned_by<'a>(
        &'a self,
        player: &'a PlayerId,
    ) -> impl Iterator<Item = &'a Territory> + 'a {
        self.territories.values().filter(move |t| t.is_owned_by(player))
    }

    pub fn territory_count(&self, player: &PlayerId) -> usize {
        self.territories_owned_by(player).count()
    }

    pub fn city_count(&self, player: &PlayerId) -> u32 {
        self.territories_owned_by(player).filter(|t| t.has_city).count() as u32
    }

    pub fn unclaimed_count(&self) -> usize {
        self.territories.values().filter(|t| t.owner.is_none()).count()
    }

    /// Players still in the game, in turn order.
    pub fn living_players(&self) -> Vec<PlayerId> {
        self.player_order
            .iter()
            .filter(|id| self.players.get(*id).is_some_and(|p| !p.eliminated))
            .cloned()
            .collect()
    }

    pub fn is_game_over(&self) -> bool {
        self.winner.is_some()
    }

    pub fn trade_enabled(&self) -> bool {
        self.living_players().len() >= 3
    }

    /// Gate for every player action: game running, right phase, actor's turn.
    pub fn require_turn(&self, actor: &PlayerId, phase: Phase) -> Result<()> {
        if self.winner.is_some() {
            return Err(GameError::GameOver);
        }
        self.player(actor)?;
        if self.phase != phase || self.production_pending {
            return Err(GameError::WrongPhase { phase: self.phase });
        }
        if *actor != self.current_player {
            return Err(GameError::NotYourTurn {
                actor: actor.clone(),
                current: self.current_player.clone(),
            });
        }
        Ok(())
    }
}
