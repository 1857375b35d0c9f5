pub mod types;
pub mod error;
pub mod map;
pub mod setup;
pub mod economy;
pub mod cards;
pub mod navigation;
pub mod trade;
pub mod combat;
pub mod phase;
pub mod engine;
pub mod invariants;
pub mod snapshot;

mod tests;

pub use types::*;
pub use error::{GameError, Result};
pub use map::{MapDef, MapError};
pub use setup::{create_game, PlayerSetup};
pub use engine::{acknowledge_production, apply_action, Action, GameEvent};
