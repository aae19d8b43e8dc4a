//! Block schematics: pre-authored block layouts stamped into the world.

use glam::IVec3;
use nebula_math::Cuboid;
use nebula_voxel::{BlockAccessor, BlockId, BlockRegistry};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::StructureError;

// ---------------------------------------------------------------------------
// Orientation
// ---------------------------------------------------------------------------

/// Horizontal or vertical face direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    /// -Z
    North,
    /// +X
    East,
    /// +Z
    South,
    /// -X
    West,
    Up,
    Down,
}

impl Facing {
    pub const HORIZONTAL: [Facing; 4] = [Facing::North, Facing::East, Facing::South, Facing::West];

    pub fn normal(self) -> IVec3 {
        match self {
            Facing::North => IVec3::NEG_Z,
            Facing::East => IVec3::X,
            Facing::South => IVec3::Z,
            Facing::West => IVec3::NEG_X,
            Facing::Up => IVec3::Y,
            Facing::Down => IVec3::NEG_Y,
        }
    }

    pub fn opposite(self) -> Facing {
        match self {
            Facing::North => Facing::South,
            Facing::East => Facing::West,
            Facing::South => Facing::North,
            Facing::West => Facing::East,
            Facing::Up => Facing::Down,
            Facing::Down => Facing::Up,
        }
    }

    /// Rotates clockwise (seen from above) by `rotation`. Vertical facings
    /// are unchanged.
    pub fn rotate(self, rotation: Rotation) -> Facing {
        let Some(index) = Self::HORIZONTAL.iter().position(|&f| f == self) else {
            return self;
        };
        Self::HORIZONTAL[(index + rotation.quarter_turns()) % 4]
    }
}

/// Clockwise rotation about the Y axis in quarter turns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270];

    pub fn from_quarter_turns(turns: usize) -> Rotation {
        Self::ALL[turns % 4]
    }

    pub fn quarter_turns(self) -> usize {
        self as usize
    }

    pub fn then(self, other: Rotation) -> Rotation {
        Self::from_quarter_turns(self.quarter_turns() + other.quarter_turns())
    }

    /// Size of a box of `size` after rotation.
    pub fn rotate_size(self, size: IVec3) -> IVec3 {
        match self {
            Rotation::R0 | Rotation::R180 => size,
            Rotation::R90 | Rotation::R270 => IVec3::new(size.z, size.y, size.x),
        }
    }

    /// Maps a local position inside a box of `size` to its position inside
    /// the rotated box. Positions outside the box (connector shells) map
    /// with the same affine transform.
    pub fn rotate_pos(self, p: IVec3, size: IVec3) -> IVec3 {
        match self {
            Rotation::R0 => p,
            Rotation::R90 => IVec3::new(size.z - 1 - p.z, p.y, p.x),
            Rotation::R180 => IVec3::new(size.x - 1 - p.x, p.y, size.z - 1 - p.z),
            Rotation::R270 => IVec3::new(p.z, p.y, size.x - 1 - p.x),
        }
    }
}

// ---------------------------------------------------------------------------
// Schematic data
// ---------------------------------------------------------------------------

/// How a schematic's blocks combine with what is already in the world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplaceMode {
    /// Every cell, air included, overwrites the world.
    ReplaceAll,
    /// Air cells leave the world untouched.
    #[default]
    ReplaceAllNoAir,
    /// Only world air is replaced.
    ReplaceOnlyAir,
}

/// A corridor exit: cells on the schematic edge and the direction they open to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pathway {
    pub cells: Vec<IVec3>,
    pub facing: Facing,
}

/// A schematic as handed over by the asset loader, with block codes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchematicData {
    pub code: String,
    pub size: IVec3,
    pub palette: Vec<String>,
    /// Palette index per cell, ordered x fastest, then z, then y.
    pub blocks: Vec<u32>,
    /// Free-form tags attached to cells (connector targets).
    pub block_attributes: Vec<(IVec3, String)>,
    /// Cells that must sit in stone or soil when placed underground.
    pub probes: Vec<IVec3>,
    pub pathways: Vec<Pathway>,
    pub replace_mode: ReplaceMode,
    /// Vertical shift applied on placement.
    pub offset_y: i32,
}

/// A schematic with resolved block IDs.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockSchematic {
    pub code: String,
    pub size: IVec3,
    blocks: Vec<BlockId>,
    /// Sorted by position.
    pub attributes: Vec<(IVec3, String)>,
    pub probes: Vec<IVec3>,
    pub pathways: Vec<Pathway>,
    pub replace_mode: ReplaceMode,
    pub offset_y: i32,
}

impl BlockSchematic {
    /// An all-air schematic.
    pub fn new(code: impl Into<String>, size: IVec3) -> Self {
        let size = size.max(IVec3::ZERO);
        Self {
            code: code.into(),
            size,
            blocks: vec![BlockId::AIR; (size.x * size.y * size.z) as usize],
            attributes: Vec::new(),
            probes: Vec::new(),
            pathways: Vec::new(),
            replace_mode: ReplaceMode::default(),
            offset_y: 0,
        }
    }

    /// Resolves every palette entry against `registry`.
    ///
    /// # Errors
    ///
    /// [`StructureError::UnresolvedBlock`] for an unknown palette code,
    /// [`StructureError::InvalidSchematic`] for a block list that does not
    /// match the size or a palette index out of range.
    pub fn resolve(data: &SchematicData, registry: &BlockRegistry) -> Result<Self, StructureError> {
        let invalid = |reason: String| StructureError::InvalidSchematic {
            code: data.code.clone(),
            reason,
        };
        if data.size.min_element() <= 0 {
            return Err(invalid(format!("non-positive size {}", data.size)));
        }
        let volume = (data.size.x * data.size.y * data.size.z) as usize;
        if data.blocks.len() != volume {
            return Err(invalid(format!("{} blocks for volume {volume}", data.blocks.len())));
        }

        let palette = data
            .palette
            .iter()
            .map(|code| {
                registry
                    .resolve(code)
                    .map_err(|source| StructureError::UnresolvedBlock {
                        schematic: data.code.clone(),
                        code: code.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let blocks = data
            .blocks
            .iter()
            .map(|&i| {
                palette
                    .get(i as usize)
                    .copied()
                    .ok_or_else(|| invalid(format!("palette index {i} out of range")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut attributes = data.block_attributes.clone();
        attributes.sort_by_key(|(p, _)| (p.y, p.z, p.x));

        Ok(Self {
            code: data.code.clone(),
            size: data.size,
            blocks,
            attributes,
            probes: data.probes.clone(),
            pathways: data.pathways.clone(),
            replace_mode: data.replace_mode,
            offset_y: data.offset_y,
        })
    }

    pub fn index(&self, p: IVec3) -> Option<usize> {
        if p.cmplt(IVec3::ZERO).any() || p.cmpge(self.size).any() {
            return None;
        }
        Some(((p.y * self.size.z + p.z) * self.size.x + p.x) as usize)
    }

    /// Block at a local position; air outside the box.
    pub fn get(&self, p: IVec3) -> BlockId {
        self.index(p).map_or(BlockId::AIR, |i| self.blocks[i])
    }

    pub fn set(&mut self, p: IVec3, block: BlockId) -> bool {
        match self.index(p) {
            Some(i) => {
                self.blocks[i] = block;
                true
            }
            None => false,
        }
    }

    pub fn attribute(&self, p: IVec3) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(q, _)| *q == p)
            .map(|(_, tag)| tag.as_str())
    }

    /// Local positions in storage order.
    pub fn positions(&self) -> impl Iterator<Item = IVec3> + '_ {
        let size = self.size;
        (0..size.y).flat_map(move |y| (0..size.z).flat_map(move |z| (0..size.x).map(move |x| IVec3::new(x, y, z))))
    }

    pub fn count(&self, block: BlockId) -> usize {
        self.blocks.iter().filter(|&&b| b == block).count()
    }

    /// World-space box of this schematic placed with its minimum corner at `origin`.
    pub fn footprint(&self, origin: IVec3) -> Cuboid {
        Cuboid::from_origin_size(origin, self.size)
    }

    /// A rotated copy. Probes, pathways and attributes rotate with the blocks.
    pub fn rotated(&self, rotation: Rotation) -> BlockSchematic {
        if rotation == Rotation::R0 {
            return self.clone();
        }
        let size = rotation.rotate_size(self.size);
        let mut out = BlockSchematic {
            code: self.code.clone(),
            size,
            blocks: vec![BlockId::AIR; self.blocks.len()],
            attributes: self
                .attributes
                .iter()
                .map(|(p, tag)| (rotation.rotate_pos(*p, self.size), tag.clone()))
                .collect(),
            probes: self
                .probes
                .iter()
                .map(|&p| rotation.rotate_pos(p, self.size))
                .collect(),
            pathways: self
                .pathways
                .iter()
                .map(|path| Pathway {
                    cells: path
                        .cells
                        .iter()
                        .map(|&p| rotation.rotate_pos(p, self.size))
                        .collect(),
                    facing: path.facing.rotate(rotation),
                })
                .collect(),
            replace_mode: self.replace_mode,
            offset_y: self.offset_y,
        };
        for p in self.positions() {
            out.set(rotation.rotate_pos(p, self.size), self.get(p));
        }
        out.attributes.sort_by_key(|(p, _)| (p.y, p.z, p.x));
        out
    }

    /// Writes the schematic with its minimum corner at `origin`. Returns the
    /// number of blocks written; cells the accessor refuses are skipped.
    pub fn place<A: BlockAccessor + ?Sized>(&self, accessor: &mut A, origin: IVec3) -> u32 {
        self.place_clipped(accessor, origin, None)
    }

    /// Like [`BlockSchematic::place`], but only cells whose xz lies inside
    /// `clip` are written.
    pub fn place_within<A: BlockAccessor + ?Sized>(&self, accessor: &mut A, origin: IVec3, clip: &Cuboid) -> u32 {
        if !self.footprint(origin).intersects_xz(clip) {
            return 0;
        }
        self.place_clipped(accessor, origin, Some(clip))
    }

    fn place_clipped<A: BlockAccessor + ?Sized>(&self, accessor: &mut A, origin: IVec3, clip: Option<&Cuboid>) -> u32 {
        let mut written = 0;
        for p in self.positions() {
            let block = self.get(p);
            let world = origin + p;
            if clip.is_some_and(|c| !in_xz(c, world)) {
                continue;
            }
            let write = match self.replace_mode {
                ReplaceMode::ReplaceAll => true,
                ReplaceMode::ReplaceAllNoAir => !block.is_air(),
                ReplaceMode::ReplaceOnlyAir => !block.is_air() && accessor.block(world).is_air(),
            };
            if write && accessor.set_block(world, block) {
                written += 1;
            }
        }
        written
    }
}

pub(crate) fn in_xz(area: &Cuboid, p: IVec3) -> bool {
    (area.min.x..area.max.x).contains(&p.x) && (area.min.z..area.max.z).contains(&p.z)
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// Resolved schematics by code, shared by structures, villages and dungeons.
#[derive(Debug, Default)]
pub struct SchematicLibrary {
    schematics: FxHashMap<String, BlockSchematic>,
}

impl SchematicLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves every entry. Entries that fail are left out and their errors
    /// returned alongside.
    pub fn resolve_all(data: &[SchematicData], registry: &BlockRegistry) -> (Self, Vec<StructureError>) {
        let mut library = Self::new();
        let mut errors = Vec::new();
        for entry in data {
            match BlockSchematic::resolve(entry, registry) {
                Ok(schematic) => library.insert(schematic),
                Err(e) => errors.push(e),
            }
        }
        (library, errors)
    }

    pub fn insert(&mut self, schematic: BlockSchematic) {
        self.schematics.insert(schematic.code.clone(), schematic);
    }

    pub fn get(&self, code: &str) -> Option<&BlockSchematic> {
        self.schematics.get(code)
    }

    pub fn len(&self) -> usize {
        self.schematics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schematics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nebula_voxel::{BlockDef, BlockMaterial, ChunkColumn, ColumnPos, ColumnStore};

    fn l_shape() -> BlockSchematic {
        // 3 wide (x), 1 high, 2 deep (z):
        //   z=0: A . .
        //   z=1: A A B
        let mut s = BlockSchematic::new("l", IVec3::new(3, 1, 2));
        s.set(IVec3::new(0, 0, 0), BlockId(1));
        s.set(IVec3::new(0, 0, 1), BlockId(1));
        s.set(IVec3::new(1, 0, 1), BlockId(1));
        s.set(IVec3::new(2, 0, 1), BlockId(2));
        s.probes.push(IVec3::new(2, 0, 1));
        s
    }

    #[test]
    fn test_facing_rotation_is_clockwise() {
        assert_eq!(Facing::North.rotate(Rotation::R90), Facing::East);
        assert_eq!(Facing::East.rotate(Rotation::R90), Facing::South);
        assert_eq!(Facing::West.rotate(Rotation::R180), Facing::East);
        assert_eq!(Facing::Up.rotate(Rotation::R270), Facing::Up);
        assert_eq!(Facing::South.opposite(), Facing::North);
    }

    #[test]
    fn test_rotate_pos_matches_facing() {
        let size = IVec3::new(4, 1, 3);
        for rotation in Rotation::ALL {
            for facing in Facing::HORIZONTAL {
                let a = IVec3::new(1, 0, 1);
                let b = a + facing.normal();
                let step = rotation.rotate_pos(b, size) - rotation.rotate_pos(a, size);
                assert_eq!(step, facing.rotate(rotation).normal(), "{rotation:?} {facing:?}");
            }
        }
    }

    #[test]
    fn test_rotation_composes() {
        assert_eq!(Rotation::R90.then(Rotation::R270), Rotation::R0);
        assert_eq!(Rotation::R180.then(Rotation::R180), Rotation::R0);
        assert_eq!(Rotation::R270.then(Rotation::R180), Rotation::R90);
    }

    #[test]
    fn test_rotated_schematic() {
        let s = l_shape();
        let r = s.rotated(Rotation::R90);
        assert_eq!(r.size, IVec3::new(2, 1, 3));
        assert_eq!(r.count(BlockId(1)), 3);
        // (2, 0, 1) -> (2 - 1 - 1, 0, 2)
        assert_eq!(r.get(IVec3::new(0, 0, 2)), BlockId(2));
        assert_eq!(r.probes, vec![IVec3::new(0, 0, 2)]);
    }

    #[test]
    fn test_four_rotations_return_to_start() {
        let s = l_shape();
        let back = s
            .rotated(Rotation::R90)
            .rotated(Rotation::R90)
            .rotated(Rotation::R90)
            .rotated(Rotation::R90);
        assert_eq!(back, s);
    }

    #[test]
    fn test_resolve_unknown_block_is_error() {
        let mut registry = BlockRegistry::new();
        registry
            .register(BlockDef::new("planks", BlockMaterial::Wood))
            .unwrap();
        let data = SchematicData {
            code: "hut".into(),
            size: IVec3::new(1, 1, 2),
            palette: vec!["planks".into(), "glass".into()],
            blocks: vec![0, 1],
            ..Default::default()
        };
        match BlockSchematic::resolve(&data, &registry) {
            Err(StructureError::UnresolvedBlock { code, .. }) => assert_eq!(code, "glass"),
            other => panic!("expected unresolved block, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_checks_volume() {
        let data = SchematicData {
            code: "bad".into(),
            size: IVec3::new(2, 2, 2),
            palette: vec!["air".into()],
            blocks: vec![0; 7],
            ..Default::default()
        };
        assert!(matches!(
            BlockSchematic::resolve(&data, &BlockRegistry::new()),
            Err(StructureError::InvalidSchematic { .. })
        ));
    }

    #[test]
    fn test_place_modes() {
        let mut store = ColumnStore::new(16);
        store.insert(ChunkColumn::new(ColumnPos::new(0, 0), 16));
        store.set_block(IVec3::new(1, 5, 0), BlockId(7));
        store.set_block(IVec3::new(0, 5, 0), BlockId(7));

        let mut s = l_shape();
        s.replace_mode = ReplaceMode::ReplaceAllNoAir;
        assert_eq!(s.place(&mut store, IVec3::new(0, 5, 0)), 4);
        assert_eq!(store.block(IVec3::new(1, 5, 0)), BlockId(7));

        s.replace_mode = ReplaceMode::ReplaceAll;
        assert_eq!(s.place(&mut store, IVec3::new(0, 5, 0)), 6);
        assert_eq!(store.block(IVec3::new(1, 5, 0)), BlockId::AIR);

        store.set_block(IVec3::new(0, 6, 0), BlockId(7));
        s.replace_mode = ReplaceMode::ReplaceOnlyAir;
        assert_eq!(s.place(&mut store, IVec3::new(0, 6, 0)), 3);
        assert_eq!(store.block(IVec3::new(0, 6, 0)), BlockId(7));
    }

    #[test]
    fn test_place_within_splits_at_column_border() {
        let mut store = ColumnStore::new(16);
        store.insert(ChunkColumn::new(ColumnPos::new(0, 0), 16));
        store.insert(ChunkColumn::new(ColumnPos::new(1, 0), 16));
        let s = l_shape();
        let origin = IVec3::new(30, 5, 0);
        let column = |x| Cuboid::from_origin_size(IVec3::new(x * 32, 0, 0), IVec3::new(32, 16, 32));

        assert_eq!(s.place_within(&mut store, origin, &column(0)), 3);
        assert_eq!(store.block(IVec3::new(32, 5, 1)), BlockId::AIR);
        assert_eq!(s.place_within(&mut store, origin, &column(1)), 1);
        assert_eq!(store.block(IVec3::new(32, 5, 1)), BlockId(2));
        assert_eq!(s.place_within(&mut store, origin, &column(3)), 0);
    }
}
