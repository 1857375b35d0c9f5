// ═══════════════════════════════════════════════════════════════════════
// Snapshots — GameState ⇄ JSON for persistence collaborators
// ═══════════════════════════════════════════════════════════════════════

use crate::invariants::{self, InvariantViolation};
use crate::types::GameState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub state: GameState,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot format {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
    #[error("inconsistent snapshot: {}", join_messages(.0))]
    Inconsistent(Vec<InvariantViolation>),
}

fn join_messages(violations: &[InvariantViolation]) -> String {
    violations.iter().map(|v| v.message.as_str()).collect::<Vec<_>>().join("; ")
}

impl Snapshot {
    pub fn of(state: &GameState) -> Self {
        Snapshot { format_version: FORMAT_VERSION, state: state.clone() }
    }
}

pub fn to_json(state: &GameState) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string(&Snapshot::of(state))?)
}

pub fn to_json_pretty(state: &GameState) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string_pretty(&Snapshot::of(state))?)
}

/// Restore a state, refusing documents that break any invariant.
pub fn from_json(json: &str) -> Result<GameState, SnapshotError> {
    let snapshot: Snapshot = serde_json::from_str(json)?;
    if snapshot.format_version != FORMAT_VERSION {
        return Err(SnapshotError::Version { found: snapshot.format_version, expected: FORMAT_VERSION });
    }
    let violations = invariants::check_invariants(&snapshot.state);
    if !violations.is_empty() {
        return Err(SnapshotError::Inconsistent(violations));
    }
    Ok(snapshot.state)
}
