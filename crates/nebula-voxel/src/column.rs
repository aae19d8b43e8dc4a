//! In-memory chunk columns and the [`ColumnStore`] that owns them.
//!
//! A column is `CHUNK_SIZE × map_height × CHUNK_SIZE` blocks plus two
//! height maps. The store implements [`BlockAccessor`] over every column it
//! holds, so generators can reach into already-loaded neighbours.
//!
//! Once the terrain pass is done a column keeps a copy-on-write snapshot of
//! its blocks. Later passes read neighbours through that snapshot, so what a
//! neighbour has generated since never leaks into their decisions.

use std::sync::Arc;

use glam::IVec3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::accessor::BlockAccessor;
use crate::registry::BlockId;

/// Side length of a chunk column in blocks.
pub const CHUNK_SIZE: i32 = 32;

/// Number of block columns in one chunk column (32²).
pub const CHUNK_AREA: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize;

/// Chunk-grid position of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnPos {
    pub x: i32,
    pub z: i32,
}

impl ColumnPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The column containing absolute block coordinate `(x, z)`.
    pub fn containing(x: i32, z: i32) -> Self {
        Self {
            x: x.div_euclid(CHUNK_SIZE),
            z: z.div_euclid(CHUNK_SIZE),
        }
    }

    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            z: self.z + dz,
        }
    }

    /// Absolute X of the column's first block.
    pub fn block_x(self) -> i32 {
        self.x * CHUNK_SIZE
    }

    /// Absolute Z of the column's first block.
    pub fn block_z(self) -> i32 {
        self.z * CHUNK_SIZE
    }
}

/// World generation passes, in the order they run on one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GenPass {
    Terrain,
    TerrainFeatures,
    Vegetation,
    Decoration,
}

impl GenPass {
    pub const ALL: [GenPass; 4] = [
        GenPass::Terrain,
        GenPass::TerrainFeatures,
        GenPass::Vegetation,
        GenPass::Decoration,
    ];
}

/// One vertical stack of blocks at a chunk-grid position.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkColumn {
    pos: ColumnPos,
    map_height: i32,
    /// Indexed `(y * CHUNK_SIZE + z) * CHUNK_SIZE + x`.
    blocks: Arc<Vec<BlockId>>,
    /// `blocks` as the terrain pass left them. Shares storage with `blocks`
    /// until the first write after [`ChunkColumn::freeze_terrain`].
    terrain_blocks: Option<Arc<Vec<BlockId>>>,
    terrain_heightmap: Vec<u16>,
    rain_heightmap: Vec<u16>,
    /// Last pass that completed on this column.
    completed: Option<GenPass>,
}

impl ChunkColumn {
    /// Creates an all-air column.
    pub fn new(pos: ColumnPos, map_height: i32) -> Self {
        let volume = CHUNK_AREA * map_height.max(0) as usize;
        Self {
            pos,
            map_height,
            blocks: Arc::new(vec![BlockId::AIR; volume]),
            terrain_blocks: None,
            terrain_heightmap: vec![0; CHUNK_AREA],
            rain_heightmap: vec![0; CHUNK_AREA],
            completed: None,
        }
    }

    pub fn pos(&self) -> ColumnPos {
        self.pos
    }

    pub fn map_height(&self) -> i32 {
        self.map_height
    }

    fn index(&self, lx: i32, y: i32, lz: i32) -> Option<usize> {
        if !(0..CHUNK_SIZE).contains(&lx)
            || !(0..CHUNK_SIZE).contains(&lz)
            || !(0..self.map_height).contains(&y)
        {
            return None;
        }
        Some(((y * CHUNK_SIZE + lz) * CHUNK_SIZE + lx) as usize)
    }

    fn column_index(lx: i32, lz: i32) -> usize {
        debug_assert!((0..CHUNK_SIZE).contains(&lx) && (0..CHUNK_SIZE).contains(&lz));
        (lz * CHUNK_SIZE + lx) as usize
    }

    /// Block at local coordinates. Out of range reads return air.
    pub fn get(&self, lx: i32, y: i32, lz: i32) -> BlockId {
        self.index(lx, y, lz)
            .map_or(BlockId::AIR, |i| self.blocks[i])
    }

    /// Block at local coordinates as the terrain pass left it. Before
    /// [`ChunkColumn::freeze_terrain`] this is the current block.
    pub fn terrain_get(&self, lx: i32, y: i32, lz: i32) -> BlockId {
        let blocks = self.terrain_blocks.as_ref().unwrap_or(&self.blocks);
        self.index(lx, y, lz).map_or(BlockId::AIR, |i| blocks[i])
    }

    /// Writes a block at local coordinates. Returns `false` when out of range.
    pub fn set(&mut self, lx: i32, y: i32, lz: i32, block: BlockId) -> bool {
        match self.index(lx, y, lz) {
            Some(i) => {
                Arc::make_mut(&mut self.blocks)[i] = block;
                true
            }
            None => {
                tracing::trace!("ChunkColumn::set out of range: ({lx}, {y}, {lz})");
                false
            }
        }
    }

    pub fn terrain_height(&self, lx: i32, lz: i32) -> i32 {
        self.terrain_heightmap[Self::column_index(lx, lz)] as i32
    }

    pub fn set_terrain_height(&mut self, lx: i32, lz: i32, y: i32) {
        self.terrain_heightmap[Self::column_index(lx, lz)] = y.clamp(0, u16::MAX as i32) as u16;
    }

    pub fn rain_height(&self, lx: i32, lz: i32) -> i32 {
        self.rain_heightmap[Self::column_index(lx, lz)] as i32
    }

    pub fn set_rain_height(&mut self, lx: i32, lz: i32, y: i32) {
        self.rain_heightmap[Self::column_index(lx, lz)] = y.clamp(0, u16::MAX as i32) as u16;
    }

    pub fn completed_pass(&self) -> Option<GenPass> {
        self.completed
    }

    /// Returns `true` once `pass` (or any later pass) has completed.
    pub fn has_completed(&self, pass: GenPass) -> bool {
        self.completed.is_some_and(|done| done >= pass)
    }

    pub fn mark_completed(&mut self, pass: GenPass) {
        if !self.has_completed(pass) {
            self.completed = Some(pass);
        }
    }

    /// Keeps the current blocks as the terrain snapshot. Only the first call
    /// has an effect.
    pub fn freeze_terrain(&mut self) {
        if self.terrain_blocks.is_none() {
            self.terrain_blocks = Some(Arc::clone(&self.blocks));
        }
    }

    pub fn is_terrain_frozen(&self) -> bool {
        self.terrain_blocks.is_some()
    }

    /// Counts blocks equal to `block` (used by tests and statistics).
    pub fn count(&self, block: BlockId) -> usize {
        self.blocks.iter().filter(|&&b| b == block).count()
    }
}

/// Owns loaded chunk columns and exposes them through [`BlockAccessor`].
///
/// Uses an [`FxHashMap`] for fast hashing of small fixed-size keys.
pub struct ColumnStore {
    map_height: i32,
    columns: FxHashMap<ColumnPos, ChunkColumn>,
}

impl ColumnStore {
    pub fn new(map_height: i32) -> Self {
        Self {
            map_height,
            columns: FxHashMap::default(),
        }
    }

    /// Inserts a column, replacing any column already at its position.
    pub fn insert(&mut self, column: ChunkColumn) {
        self.columns.insert(column.pos(), column);
    }

    /// Returns the column at `pos`, creating an empty one if absent.
    pub fn ensure(&mut self, pos: ColumnPos) -> &mut ChunkColumn {
        let map_height = self.map_height;
        self.columns
            .entry(pos)
            .or_insert_with(|| ChunkColumn::new(pos, map_height))
    }

    pub fn remove(&mut self, pos: ColumnPos) -> Option<ChunkColumn> {
        self.columns.remove(&pos)
    }

    pub fn get(&self, pos: ColumnPos) -> Option<&ChunkColumn> {
        self.columns.get(&pos)
    }

    pub fn get_mut(&mut self, pos: ColumnPos) -> Option<&mut ChunkColumn> {
        self.columns.get_mut(&pos)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = &ColumnPos> {
        self.columns.keys()
    }

    fn split(x: i32, z: i32) -> (ColumnPos, i32, i32) {
        (
            ColumnPos::containing(x, z),
            x.rem_euclid(CHUNK_SIZE),
            z.rem_euclid(CHUNK_SIZE),
        )
    }
}

impl BlockAccessor for ColumnStore {
    fn map_size_y(&self) -> i32 {
        self.map_height
    }

    fn block(&self, pos: IVec3) -> BlockId {
        let (cpos, lx, lz) = Self::split(pos.x, pos.z);
        self.columns
            .get(&cpos)
            .map_or(BlockId::AIR, |c| c.get(lx, pos.y, lz))
    }

    fn set_block(&mut self, pos: IVec3, block: BlockId) -> bool {
        let (cpos, lx, lz) = Self::split(pos.x, pos.z);
        let Some(column) = self.columns.get_mut(&cpos) else {
            return false;
        };
        if !column.set(lx, pos.y, lz, block) {
            return false;
        }
        if !block.is_air() && pos.y > column.rain_height(lx, lz) {
            column.set_rain_height(lx, lz, pos.y);
        }
        true
    }

    fn terrain_block(&self, pos: IVec3) -> BlockId {
        let (cpos, lx, lz) = Self::split(pos.x, pos.z);
        self.columns
            .get(&cpos)
            .map_or(BlockId::AIR, |c| c.terrain_get(lx, pos.y, lz))
    }

    fn terrain_height(&self, x: i32, z: i32) -> Option<i32> {
        let (cpos, lx, lz) = Self::split(x, z);
        self.columns.get(&cpos).map(|c| c.terrain_height(lx, lz))
    }

    fn rain_height(&self, x: i32, z: i32) -> Option<i32> {
        let (cpos, lx, lz) = Self::split(x, z);
        self.columns.get(&cpos).map(|c| c.rain_height(lx, lz))
    }
}
