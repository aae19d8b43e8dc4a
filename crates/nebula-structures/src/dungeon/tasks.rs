//! Persisted dungeon instances, decomposed into per-tile place tasks.

use glam::IVec3;
use nebula_math::Cuboid;
use nebula_voxel::ColumnPos;
use serde::{Deserialize, Serialize};

use crate::schematic::{Facing, Rotation};

/// Region mod-data key holding a [`RegionDungeons`].
pub const DUNGEON_DATA_KEY: &str = "dungeons";

/// One tile of a dungeon instance. Each chunk column it overlaps writes
/// its own slice of it, exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePlaceTask {
    pub tile_code: String,
    pub pos: IVec3,
    pub rotation: Rotation,
    pub bounds: Cuboid,
    /// Set when the first slice is written.
    pub did_generate: bool,
    /// Columns that wrote their slice, sorted.
    #[serde(default)]
    pub columns: Vec<ColumnPos>,
}

/// An opening between two tiles, or a dead end when unfilled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doorway {
    pub pos: IVec3,
    pub facing: Facing,
    pub tag: String,
    pub filled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DungeonPlaceTask {
    pub code: String,
    pub id: u64,
    pub bounds: Cuboid,
    pub tiles: Vec<TilePlaceTask>,
    pub doorways: Vec<Doorway>,
}

impl DungeonPlaceTask {
    pub fn pending(&self) -> usize {
        self.tiles.iter().filter(|t| !t.did_generate).count()
    }

    pub fn unfilled_doorways(&self) -> usize {
        self.doorways.iter().filter(|d| !d.filled).count()
    }

    /// Claims the slice inside `area` of every tile overlapping it that
    /// `column` has not written yet, with the filled doorways next to each.
    pub fn claim_slices(&mut self, column: ColumnPos, area: &Cuboid) -> Vec<ClaimedTile> {
        if !self.bounds.intersects_xz(area) {
            return Vec::new();
        }
        let mut claimed = Vec::new();
        for tile in &mut self.tiles {
            if !tile.bounds.intersects_xz(area) {
                continue;
            }
            let Err(slot) = tile.columns.binary_search(&column) else {
                continue;
            };
            tile.columns.insert(slot, column);
            let first = !tile.did_generate;
            tile.did_generate = true;
            let around = tile.bounds.expand_by(1);
            claimed.push(ClaimedTile {
                dungeon: self.code.clone(),
                tile: tile.clone(),
                first,
                doorways: self
                    .doorways
                    .iter()
                    .filter(|d| d.filled && around.contains(d.pos))
                    .map(|d| d.pos)
                    .collect(),
            });
        }
        claimed
    }
}

/// A tile taken from its region for writing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimedTile {
    pub dungeon: String,
    pub tile: TilePlaceTask,
    /// No other column had written a slice of the tile before.
    pub first: bool,
    pub doorways: Vec<IVec3>,
}

/// Everything the dungeon generator keeps in one region.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDungeons {
    /// Set once the region's dungeons were planned, even if none were.
    pub planned: bool,
    pub dungeons: Vec<DungeonPlaceTask>,
}
