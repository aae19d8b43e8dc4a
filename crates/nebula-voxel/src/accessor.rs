//! The block access seam between world generation and chunk storage.
//!
//! Generators never touch chunk memory layout directly; they issue
//! absolute-coordinate reads and writes through [`BlockAccessor`].

use glam::IVec3;

use crate::registry::BlockId;

/// Absolute-coordinate block access plus per-column height maps.
///
/// Implementations decide what "loaded" means. Reads outside loaded columns
/// return air, writes outside loaded columns are dropped and reported by the
/// `false` return value.
pub trait BlockAccessor {
    /// Height of the world in blocks. Valid Y coordinates are `0..map_size_y()`.
    fn map_size_y(&self) -> i32;

    fn block(&self, pos: IVec3) -> BlockId;

    /// The block the terrain pass produced at `pos`, ignoring every write
    /// made since. Accessors without a snapshot answer the current block.
    fn terrain_block(&self, pos: IVec3) -> BlockId {
        self.block(pos)
    }

    /// Writes a block. Returns `false` if the position is not writable.
    fn set_block(&mut self, pos: IVec3, block: BlockId) -> bool;

    /// Highest solid Y produced by terrain generation at `(x, z)`, or `None`
    /// if the column is not loaded.
    fn terrain_height(&self, x: i32, z: i32) -> Option<i32>;

    /// Highest solid-or-liquid Y at `(x, z)`, or `None` if not loaded.
    fn rain_height(&self, x: i32, z: i32) -> Option<i32>;

    fn is_loaded(&self, x: i32, z: i32) -> bool {
        self.terrain_height(x, z).is_some()
    }
}
