// ═══════════════════════════════════════════════════════════════════════
// Game setup — builds the initial GameState from a map and a lobby
// ═══════════════════════════════════════════════════════════════════════

use crate::error::{GameError, Result};
use crate::map::MapDef;
use crate::types::*;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Hard cap on seats, one per player colour.
pub const MAX_PLAYERS: usize = PlayerColor::ALL.len();
pub const MIN_PLAYERS: usize = 2;

/// One seat at the table as handed over by the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSetup {
    pub id: PlayerId,
    pub name: String,
    pub color: PlayerColor,
    pub kind: PlayerKind,
}

impl PlayerSetup {
    pub fn human(id: &str, name: &str, color: PlayerColor) -> Self {
        PlayerSetup { id: PlayerId::from(id), name: name.to_string(), color, kind: PlayerKind::Human }
    }

    pub fn ai(id: &str, name: &str, color: PlayerColor, personality: Personality) -> Self {
        PlayerSetup {
            id: PlayerId::from(id),
            name: name.to_string(),
            color,
            kind: PlayerKind::Ai(personality),
        }
    }
}

fn check_players(settings: &Settings, map: &MapDef, players: &[PlayerSetup]) -> Result<()> {
    let max = usize::from(settings.max_players).min(MAX_PLAYERS);
    if players.len() < MIN_PLAYERS || players.len() > max {
        return Err(GameError::InvalidSetup(format!(
            "{} players, expected {MIN_PLAYERS} to {max}",
            players.len()
        )));
    }

    let mut ids = BTreeSet::new();
    let mut colors = Vec::new();
    for p in players {
        if !ids.insert(&p.id) {
            return Err(GameError::InvalidSetup(format!("duplicate player id {}", p.id)));
        }
        if colors.contains(&p.color) {
            return Err(GameError::InvalidSetup(format!("colour {:?} taken twice", p.color)));
        }
        colors.push(p.color);
    }

    // Selection stops once fewer than one territory per player is left,
    // so everyone is only sure of a first pick with 2n - 1 territories.
    let needed = 2 * players.len() - 1;
    if map.territories.len() < needed {
        return Err(GameError::InvalidSetup(format!(
            "map {} has {} territories, {needed} needed",
            map.id,
            map.territories.len()
        )));
    }
    Ok(())
}

/// Create a match in the territory selection phase. Turn order is
/// shuffled with `rng`.
pub fn create_game<R: Rng + ?Sized>(
    id: impl Into<String>,
    settings: Settings,
    map: &MapDef,
    players: Vec<PlayerSetup>,
    rng: &mut R,
) -> Result<GameState> {
    map.validate().map_err(|e| GameError::InvalidSetup(e.to_string()))?;
    check_players(&settings, map, &players)?;

    let territories: BTreeMap<TerritoryId, Territory> = map
        .territories
        .iter()
        .map(|def| {
            let t = Territory {
                id: def.id.clone(),
                name: def.name.clone(),
                owner: None,
                resource: def.resource,
                has_city: false,
                has_weapon: false,
                has_horse: false,
                boats: BTreeMap::new(),
                adjacent: def.adjacent.clone(),
                coastal_tiles: def.coastal_tiles,
                water_bodies: def.water_bodies.clone(),
            };
            (def.id.clone(), t)
        })
        .collect();

    let water_bodies: BTreeMap<WaterBodyId, WaterBody> = map
        .water_bodies
        .iter()
        .map(|w| (w.id.clone(), WaterBody { id: w.id.clone(), territories: w.territories.clone() }))
        .collect();

    let mut player_order: Vec<PlayerId> = players.iter().map(|p| p.id.clone()).collect();
    player_order.shuffle(rng);

    let players: BTreeMap<PlayerId, Player> = players
        .into_iter()
        .map(|p| (p.id.clone(), Player::new(p.id, p.name, p.color, p.kind)))
        .collect();

    let current_player = player_order[0].clone();
    let id = id.into();
    info!(game = %id, map = %map.id, players = players.len(), "game created");

    Ok(GameState {
        id,
        settings,
        round: 0,
        phase: Phase::TerritorySelection,
        current_player,
        turn_index: 0,
        player_order,
        players,
        territories,
        water_bodies,
        skipped_phases: Vec::new(),
        production_pending: false,
        stockpile_placement_pending: false,
        pending_production: Vec::new(),
        pending_trade: None,
        winner: None,
        next_card_id: 1,
    })
}
