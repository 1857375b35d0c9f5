// ═══════════════════════════════════════════════════════════════════════
// Errors — every rejected action maps to one of these.
// Rejections are per-action: state is untouched and the match goes on.
// ═══════════════════════════════════════════════════════════════════════

use crate::types::{Phase, PlayerId, TerritoryId, WaterBodyId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("it is {current}'s turn, not {actor}'s")]
    NotYourTurn { actor: PlayerId, current: PlayerId },

    #[error("action not allowed during {phase}")]
    WrongPhase { phase: Phase },

    #[error("territory {0} is not yours")]
    NotOwned(TerritoryId),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("unknown territory {0}")]
    UnknownTerritory(TerritoryId),

    #[error("unknown water body {0}")]
    UnknownWaterBody(WaterBodyId),

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("insufficient resources")]
    InsufficientResources,

    #[error("territory {0} already holds that unit")]
    SlotOccupied(TerritoryId),

    #[error("destination {0} is unreachable")]
    Unreachable(TerritoryId),

    #[error("no attacks remaining this round")]
    NoAttacksRemaining,

    #[error("hand is full")]
    HandFull,

    #[error("combat cards are disabled for this game")]
    CardsDisabled,

    #[error("card {0} is not in hand")]
    CardNotInHand(u32),

    #[error("a trade offer is already awaiting an answer")]
    TradePending,

    #[error("no trade offer is pending")]
    NoPendingTrade,

    #[error("the game is over")]
    GameOver,

    #[error("invalid setup: {0}")]
    InvalidSetup(String),
}

pub type Result<T> = std::result::Result<T, GameError>;
