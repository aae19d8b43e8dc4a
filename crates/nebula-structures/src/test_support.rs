//! Flat test worlds shared by the placement and dungeon tests.

use glam::IVec3;
use nebula_terrain::{Channel, LatticeSampler};
use nebula_voxel::{BlockDef, BlockId, BlockMaterial, BlockRegistry, CHUNK_SIZE, ColumnPos, ColumnStore};

use crate::schematic::BlockSchematic;

pub(crate) const STONE: BlockId = BlockId(1);
pub(crate) const WATER: BlockId = BlockId(3);
pub(crate) const PLANKS: BlockId = BlockId(4);
pub(crate) const MARKER: BlockId = BlockId(5);

pub(crate) const MAP_HEIGHT: i32 = 64;

/// Every cell zero: cold, dry, accepted by the default envelope.
pub(crate) struct FlatLattice;

impl LatticeSampler for FlatLattice {
    fn cell(&self, _channel: Channel, _cx: i32, _cz: i32) -> i32 {
        0
    }
}

pub(crate) fn registry() -> BlockRegistry {
    let mut registry = BlockRegistry::new();
    for (code, material) in [
        ("rock-granite", BlockMaterial::Stone),
        ("soil-medium", BlockMaterial::Soil),
        ("water", BlockMaterial::Liquid),
        ("planks", BlockMaterial::Wood),
        ("meta-connector", BlockMaterial::Other),
    ] {
        registry.register(BlockDef::new(code, material)).unwrap();
    }
    registry
}

/// Columns from `-radius..=radius` on both axes, stone from y = 0 up to `surface`.
pub(crate) fn flat_world(radius: i32, surface: i32) -> ColumnStore {
    flat_world_at(ColumnPos::new(0, 0), radius, surface)
}

/// Same as [`flat_world`], centred on `center`.
pub(crate) fn flat_world_at(center: ColumnPos, radius: i32, surface: i32) -> ColumnStore {
    let mut store = ColumnStore::new(MAP_HEIGHT);
    for cz in -radius..=radius {
        for cx in -radius..=radius {
            let column = store.ensure(center.offset(cx, cz));
            for lz in 0..CHUNK_SIZE {
                for lx in 0..CHUNK_SIZE {
                    for y in 0..=surface {
                        column.set(lx, y, lz, STONE);
                    }
                    column.set_terrain_height(lx, lz, surface);
                    column.set_rain_height(lx, lz, surface);
                }
            }
        }
    }
    store
}

/// Freezes every column's terrain, as the terrain pass does.
pub(crate) fn freeze_terrain(store: &mut ColumnStore) {
    let positions: Vec<ColumnPos> = store.positions().copied().collect();
    for pos in positions {
        if let Some(column) = store.get_mut(pos) {
            column.freeze_terrain();
        }
    }
}

/// A solid box of `block`.
pub(crate) fn solid(code: &str, size: IVec3, block: BlockId) -> BlockSchematic {
    let mut schematic = BlockSchematic::new(code, size);
    let cells: Vec<IVec3> = schematic.positions().collect();
    for p in cells {
        schematic.set(p, block);
    }
    schematic
}
