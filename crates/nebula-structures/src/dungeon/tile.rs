//! Dungeon tiles and connector extraction.
//!
//! A tile author marks doorways with the reserved connector block on the
//! faces of the tile's box. Loading runs in two pure stages:
//! [`extract_connectors`] reads the markers and decides which faces hold
//! nothing but markers, then [`apply_trim`] builds the trimmed schematic with
//! the markers removed. Connector positions are always the cell just outside
//! the trimmed box, so two tiles joined at a connector leave a one-cell
//! doorway between them.

use glam::IVec3;
use nebula_voxel::BlockId;
use serde::{Deserialize, Serialize};

use crate::error::StructureError;
use crate::schematic::{BlockSchematic, Facing, Rotation, SchematicLibrary};
use crate::structure::all_rotations;

/// Block code reserved for connector markers.
pub const CONNECTOR_MARKER: &str = "meta-connector";

/// Tag that matches any other tag.
pub const ANY_TAG: &str = "*";

/// Faces in the order markers are assigned when they sit on an edge.
const FACES: [Facing; 6] = [
    Facing::West,
    Facing::East,
    Facing::Down,
    Facing::Up,
    Facing::North,
    Facing::South,
];

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connector {
    pub pos: IVec3,
    pub facing: Facing,
    pub tag: String,
}

impl Connector {
    /// The connector after rotating a tile whose unrotated size is `size`.
    pub fn rotated(&self, rotation: Rotation, size: IVec3) -> Connector {
        Connector {
            pos: rotation.rotate_pos(self.pos, size),
            facing: self.facing.rotate(rotation),
            tag: self.tag.clone(),
        }
    }

    /// Whether `other` can join this connector face to face.
    pub fn accepts(&self, other: &Connector) -> bool {
        self.facing == other.facing.opposite() && tags_match(&self.tag, &other.tag)
    }
}

pub fn tags_match(a: &str, b: &str) -> bool {
    a == ANY_TAG || b == ANY_TAG || a == b
}

/// Faces of a tile box that are trimmed away.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrimFlags(u8);

impl TrimFlags {
    pub fn contains(self, face: Facing) -> bool {
        self.0 & (1 << face as u8) != 0
    }

    pub fn insert(&mut self, face: Facing) {
        self.0 |= 1 << face as u8;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Cells removed from the minimum corner.
    fn low(self) -> IVec3 {
        IVec3::new(
            self.contains(Facing::West) as i32,
            self.contains(Facing::Down) as i32,
            self.contains(Facing::North) as i32,
        )
    }

    /// Cells removed from the maximum corner.
    fn high(self) -> IVec3 {
        IVec3::new(
            self.contains(Facing::East) as i32,
            self.contains(Facing::Up) as i32,
            self.contains(Facing::South) as i32,
        )
    }
}

/// Result of scanning a tile for markers. Positions are untrimmed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectorScan {
    pub connectors: Vec<Connector>,
    pub trim: TrimFlags,
}

fn on_face(p: IVec3, size: IVec3, face: Facing) -> bool {
    match face {
        Facing::West => p.x == 0,
        Facing::East => p.x == size.x - 1,
        Facing::Down => p.y == 0,
        Facing::Up => p.y == size.y - 1,
        Facing::North => p.z == 0,
        Facing::South => p.z == size.z - 1,
    }
}

fn axis_len(size: IVec3, face: Facing) -> i32 {
    match face {
        Facing::West | Facing::East => size.x,
        Facing::Down | Facing::Up => size.y,
        Facing::North | Facing::South => size.z,
    }
}

/// Finds connector markers on the faces of `schematic`. A face is marked for
/// trimming when it holds at least one marker and nothing else but air, and
/// trimming leaves at least one layer on that axis.
pub fn extract_connectors(schematic: &BlockSchematic, marker: BlockId) -> ConnectorScan {
    let size = schematic.size;
    let mut scan = ConnectorScan::default();

    for face in FACES {
        let mut has_marker = false;
        let mut only_markers = true;
        for p in schematic.positions().filter(|&p| on_face(p, size, face)) {
            let block = schematic.get(p);
            if block == marker {
                has_marker = true;
                if !scan.connectors.iter().any(|c| c.pos == p) {
                    scan.connectors.push(Connector {
                        pos: p,
                        facing: face,
                        tag: schematic.attribute(p).unwrap_or(ANY_TAG).to_string(),
                    });
                }
            } else if !block.is_air() {
                only_markers = false;
            }
        }

        let already = i32::from(scan.trim.contains(face.opposite()));
        if has_marker && only_markers && axis_len(size, face) - already > 1 {
            scan.trim.insert(face);
        }
    }
    scan
}

/// Builds the trimmed schematic with markers turned to air, and the
/// connectors moved to the shell cell outside the trimmed box.
pub fn apply_trim(
    schematic: &BlockSchematic,
    scan: &ConnectorScan,
    marker: BlockId,
) -> (BlockSchematic, Vec<Connector>) {
    let low = scan.trim.low();
    let size = schematic.size - low - scan.trim.high();

    let mut trimmed = BlockSchematic::new(schematic.code.clone(), size);
    trimmed.replace_mode = schematic.replace_mode;
    trimmed.offset_y = schematic.offset_y;
    let cells: Vec<IVec3> = trimmed.positions().collect();
    for p in cells {
        let block = schematic.get(p + low);
        trimmed.set(p, if block == marker { BlockId::AIR } else { block });
    }

    let connectors = scan
        .connectors
        .iter()
        .map(|c| {
            let local = c.pos - low;
            let pos = if scan.trim.contains(c.facing) {
                local
            } else {
                local + c.facing.normal()
            };
            Connector {
                pos,
                facing: c.facing,
                tag: c.tag.clone(),
            }
        })
        .collect();
    (trimmed, connectors)
}

// ---------------------------------------------------------------------------
// Tiles
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DungeonTileVariant {
    pub code: String,
    pub schematic: String,
    /// Copies of this tile allowed in one dungeon instance.
    pub max_instances: u32,
}

impl Default for DungeonTileVariant {
    fn default() -> Self {
        Self {
            code: String::new(),
            schematic: String::new(),
            max_instances: 16,
        }
    }
}

/// A loaded tile in all four rotations.
#[derive(Debug)]
pub struct DungeonTile {
    pub code: String,
    pub rotations: [BlockSchematic; 4],
    /// `connectors[r]` belong to `rotations[r]`.
    pub connectors: [Vec<Connector>; 4],
    pub max_instances: u32,
}

impl DungeonTile {
    /// # Errors
    ///
    /// [`StructureError::MissingSchematic`] when the tile's schematic is not
    /// in the library.
    pub fn load(
        variant: &DungeonTileVariant,
        library: &SchematicLibrary,
        marker: BlockId,
    ) -> Result<Self, StructureError> {
        let schematic = library
            .get(&variant.schematic)
            .ok_or_else(|| StructureError::MissingSchematic {
                code: variant.code.clone(),
                schematic: variant.schematic.clone(),
            })?;
        let scan = extract_connectors(schematic, marker);
        let (trimmed, connectors) = apply_trim(schematic, &scan, marker);
        tracing::trace!(
            "Tile {} has {} connectors, trimmed to {}",
            variant.code,
            connectors.len(),
            trimmed.size
        );

        let size = trimmed.size;
        Ok(Self {
            code: variant.code.clone(),
            rotations: all_rotations(&trimmed),
            connectors: Rotation::ALL.map(|r| connectors.iter().map(|c| c.rotated(r, size)).collect()),
            max_instances: variant.max_instances,
        })
    }

    pub fn schematic(&self, rotation: Rotation) -> &BlockSchematic {
        &self.rotations[rotation.quarter_turns()]
    }

    pub fn connectors(&self, rotation: Rotation) -> &[Connector] {
        &self.connectors[rotation.quarter_turns()]
    }
}
