// ═══════════════════════════════════════════════════════════════════════
// Map graph — the immutable topology a match is played on.
// Produced by the external map component (static or procedural) and
// consumed here as a document: territories, adjacency, resources,
// coastal cells and water-body membership.
// ═══════════════════════════════════════════════════════════════════════

use crate::types::{Resource, TerritoryId, WaterBodyId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryDef {
    pub id: TerritoryId,
    pub name: String,
    #[serde(default)]
    pub resource: Resource,
    pub adjacent: Vec<TerritoryId>,
    #[serde(default)]
    pub coastal_tiles: u32,
    #[serde(default)]
    pub water_bodies: Vec<WaterBodyId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterBodyDef {
    pub id: WaterBodyId,
    pub territories: Vec<TerritoryId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapDef {
    pub id: String,
    pub territories: Vec<TerritoryDef>,
    #[serde(default)]
    pub water_bodies: Vec<WaterBodyDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("map has no territories")]
    Empty,
    #[error("duplicate territory id {0}")]
    DuplicateTerritory(TerritoryId),
    #[error("duplicate water body id {0}")]
    DuplicateWaterBody(WaterBodyId),
    #[error("{from} lists unknown neighbour {to}")]
    UnknownNeighbour { from: TerritoryId, to: TerritoryId },
    #[error("{0} is adjacent to itself")]
    SelfAdjacent(TerritoryId),
    #[error("{from} -> {to} adjacency is not mirrored")]
    AsymmetricAdjacency { from: TerritoryId, to: TerritoryId },
    #[error("{territory} borders unknown water body {water}")]
    UnknownWaterBody { territory: TerritoryId, water: WaterBodyId },
    #[error("water body {water} lists unknown territory {territory}")]
    UnknownShore { water: WaterBodyId, territory: TerritoryId },
    #[error("{territory} and water body {water} disagree about their shared border")]
    AsymmetricShore { territory: TerritoryId, water: WaterBodyId },
}

impl MapDef {
    /// Check the graph is internally consistent before a match uses it.
    pub fn validate(&self) -> Result<(), MapError> {
        if self.territories.is_empty() {
            return Err(MapError::Empty);
        }

        let mut by_id: BTreeMap<&TerritoryId, &TerritoryDef> = BTreeMap::new();
        for t in &self.territories {
            if by_id.insert(&t.id, t).is_some() {
                return Err(MapError::DuplicateTerritory(t.id.clone()));
            }
        }

        let mut waters: BTreeMap<&WaterBodyId, BTreeSet<&TerritoryId>> = BTreeMap::new();
        for w in &self.water_bodies {
            if waters.insert(&w.id, w.territories.iter().collect()).is_some() {
                return Err(MapError::DuplicateWaterBody(w.id.clone()));
            }
        }

        for t in &self.territories {
            for n in &t.adjacent {
                if *n == t.id {
                    return Err(MapError::SelfAdjacent(t.id.clone()));
                }
                let Some(other) = by_id.get(n) else {
                    return Err(MapError::UnknownNeighbour { from: t.id.clone(), to: n.clone() });
                };
                if !other.adjacent.contains(&t.id) {
                    return Err(MapError::AsymmetricAdjacency { from: t.id.clone(), to: n.clone() });
                }
            }
            for w in &t.water_bodies {
                let Some(shore) = waters.get(w) else {
                    return Err(MapError::UnknownWaterBody { territory: t.id.clone(), water: w.clone() });
                };
                if !shore.contains(&t.id) {
                    return Err(MapError::AsymmetricShore { territory: t.id.clone(), water: w.clone() });
                }
            }
        }

        for w in &self.water_bodies {
            for tid in &w.territories {
                let Some(t) = by_id.get(tid) else {
                    return Err(MapError::UnknownShore { water: w.id.clone(), territory: tid.clone() });
                };
                if !t.water_bodies.contains(&w.id) {
                    return Err(MapError::AsymmetricShore { territory: tid.clone(), water: w.id.clone() });
                }
            }
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<MapDef, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Small built-in map: three rows of mainland, a northern sea along
    /// the top row and a southern bay joining the bottom-left coast with
    /// two islands.
    pub fn demo() -> MapDef {
        macro_rules! land {
            ($id:expr, $name:expr, $res:ident, coast: $c:expr, water: [$($w:expr),*], adj: [$($a:expr),*]) => {
                TerritoryDef {
                    id: TerritoryId::from($id),
                    name: $name.to_string(),
                    resource: Resource::$res,
                    adjacent: vec![$(TerritoryId::from($a)),*],
                    coastal_tiles: $c,
                    water_bodies: vec![$(WaterBodyId::from($w)),*],
                }
            };
        }

        let territories = vec![
            // Northern coast
            land!("highmoor", "Highmoor", Grassland, coast: 2, water: ["north_sea"], adj: ["ashford", "coldwater"]),
            land!("ashford", "Ashford", Coal, coast: 2, water: ["north_sea"], adj: ["highmoor", "saltmere", "ironridge"]),
            land!("saltmere", "Saltmere", Timber, coast: 3, water: ["north_sea"], adj: ["ashford", "brightwater", "goldvale"]),
            land!("brightwater", "Brightwater", Gold, coast: 2, water: ["north_sea"], adj: ["saltmere", "thornwood"]),
            // Heartland
            land!("coldwater", "Coldwater", Iron, coast: 0, water: [], adj: ["highmoor", "ironridge", "redfield"]),
            land!("ironridge", "Ironridge", Iron, coast: 0, water: [], adj: ["ashford", "coldwater", "goldvale", "marrowdeep"]),
            land!("goldvale", "Goldvale", Gold, coast: 0, water: [], adj: ["saltmere", "ironridge", "thornwood", "oakhollow"]),
            land!("thornwood", "Thornwood", Timber, coast: 0, water: [], adj: ["brightwater", "goldvale", "eastmarch"]),
            // Southern coast
            land!("redfield", "Redfield", Grassland, coast: 2, water: ["south_bay"], adj: ["coldwater", "marrowdeep"]),
            land!("marrowdeep", "Marrowdeep", Coal, coast: 1, water: ["south_bay"], adj: ["ironridge", "redfield", "oakhollow"]),
            land!("oakhollow", "Oakhollow", Timber, coast: 0, water: [], adj: ["goldvale", "marrowdeep", "eastmarch"]),
            land!("eastmarch", "Eastmarch", None, coast: 0, water: [], adj: ["thornwood", "oakhollow"]),
            // Islands
            land!("gullrock", "Gullrock", Gold, coast: 2, water: ["south_bay"], adj: ["farisle"]),
            land!("farisle", "Far Isle", Grassland, coast: 1, water: ["south_bay"], adj: ["gullrock"]),
        ];

        let water_bodies = vec![
            WaterBodyDef {
                id: WaterBodyId::from("north_sea"),
                territories: ["highmoor", "ashford", "saltmere", "brightwater"]
                    .into_iter()
                    .map(TerritoryId::from)
                    .collect(),
            },
            WaterBodyDef {
                id: WaterBodyId::from("south_bay"),
                territories: ["redfield", "marrowdeep", "gullrock", "farisle"]
                    .into_iter()
                    .map(TerritoryId::from)
                    .collect(),
            },
        ];

        MapDef { id: "demo".to_string(), territories, water_bodies }
    }
}
