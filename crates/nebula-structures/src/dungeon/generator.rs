//! Dungeon instance construction and per-chunk realization.

use std::collections::VecDeque;

use glam::IVec3;
use nebula_math::Cuboid;
use nebula_terrain::{REGION_SIZE, RegionCache, RegionPos, SeededRandomStream, code_salt};
use nebula_voxel::{BlockAccessor, BlockId, BlockRegistry, CHUNK_SIZE, ColumnPos};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::tasks::{ClaimedTile, DUNGEON_DATA_KEY, DungeonPlaceTask, Doorway, RegionDungeons, TilePlaceTask};
use super::tile::{CONNECTOR_MARKER, DungeonTile, DungeonTileVariant, tags_match};
use crate::error::StructureError;
use crate::schematic::{Rotation, SchematicLibrary, in_xz};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DungeonVariant {
    pub code: String,
    pub root_tiles: Vec<DungeonTileVariant>,
    pub tiles: Vec<DungeonTileVariant>,
    /// Probability of one instance per region.
    pub chance: f32,
    pub max_tiles: u32,
    /// Doorways further than this many tiles from the root stay unfilled.
    pub max_depth: u32,
    /// Candidate tiles tried per open doorway before giving up on it.
    pub tries_per_connector: u32,
    /// Root tile origin height range, inclusive.
    pub min_y: i32,
    pub max_y: i32,
}

impl Default for DungeonVariant {
    fn default() -> Self {
        Self {
            code: String::new(),
            root_tiles: Vec::new(),
            tiles: Vec::new(),
            chance: 0.25,
            max_tiles: 24,
            max_depth: 8,
            tries_per_connector: 6,
            min_y: 12,
            max_y: 48,
        }
    }
}

#[derive(Debug)]
pub struct ResolvedDungeon {
    pub def: DungeonVariant,
    pub roots: Vec<DungeonTile>,
    pub pool: Vec<DungeonTile>,
    pub salt: u64,
}

impl ResolvedDungeon {
    /// # Errors
    ///
    /// [`StructureError::InvalidDungeon`] without root tiles or with an empty
    /// height range, otherwise the first tile that fails to load.
    pub fn resolve(def: &DungeonVariant, library: &SchematicLibrary, marker: BlockId) -> Result<Self, StructureError> {
        let invalid = |reason: &str| StructureError::InvalidDungeon {
            code: def.code.clone(),
            reason: reason.to_string(),
        };
        if def.root_tiles.is_empty() {
            return Err(invalid("no root tiles"));
        }
        if def.min_y > def.max_y {
            return Err(invalid("min_y above max_y"));
        }
        let load = |variants: &[DungeonTileVariant]| {
            variants
                .iter()
                .map(|v| DungeonTile::load(v, library, marker))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            def: def.clone(),
            roots: load(&def.root_tiles)?,
            pool: load(&def.tiles)?,
            salt: code_salt(&def.code),
        })
    }

    fn tile(&self, code: &str) -> Option<&DungeonTile> {
        self.roots.iter().chain(&self.pool).find(|t| t.code == code)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DungeonReport {
    /// Tiles whose first slice was written by this chunk.
    pub tiles_realized: u32,
    pub blocks_written: u32,
}

struct OpenDoorway {
    index: usize,
    depth: u32,
}

pub struct TiledDungeonGenerator {
    seed: u64,
    dungeons: Vec<ResolvedDungeon>,
}

impl TiledDungeonGenerator {
    pub fn new(seed: u64, dungeons: Vec<ResolvedDungeon>) -> Self {
        Self { seed, dungeons }
    }

    /// Resolves every variant, keeping the ones that succeed. Without a
    /// registered connector marker no dungeon can load.
    pub fn resolve_all(
        defs: &[DungeonVariant],
        library: &SchematicLibrary,
        registry: &BlockRegistry,
    ) -> (Vec<ResolvedDungeon>, Vec<StructureError>) {
        let marker = match registry.resolve(CONNECTOR_MARKER) {
            Ok(id) => id,
            Err(source) => {
                let errors = defs
                    .iter()
                    .map(|d| StructureError::UnresolvedBlock {
                        schematic: d.code.clone(),
                        code: CONNECTOR_MARKER.to_string(),
                        source: source.clone(),
                    })
                    .collect();
                return (Vec::new(), errors);
            }
        };
        let mut resolved = Vec::new();
        let mut errors = Vec::new();
        for def in defs {
            match ResolvedDungeon::resolve(def, library, marker) {
                Ok(d) => resolved.push(d),
                Err(e) => errors.push(e),
            }
        }
        (resolved, errors)
    }

    pub fn dungeon_count(&self) -> usize {
        self.dungeons.len()
    }

    /// Grows one dungeon breadth-first from a root tile at `root_origin`.
    /// Doorways with no fitting tile stay unfilled.
    pub fn build(&self, dungeon: &ResolvedDungeon, root_origin: IVec3, rng: &mut SeededRandomStream) -> DungeonPlaceTask {
        let def = &dungeon.def;
        let id = rng.next_u64();
        let root = &dungeon.roots[rng.next_int(dungeon.roots.len() as u32) as usize];
        let rotation = Rotation::from_quarter_turns(rng.next_int(4) as usize);

        let mut tiles = vec![TilePlaceTask {
            tile_code: root.code.clone(),
            pos: root_origin,
            rotation,
            bounds: root.schematic(rotation).footprint(root_origin),
            did_generate: false,
            columns: Vec::new(),
        }];
        let mut doorways = Vec::new();
        let mut open = VecDeque::new();
        for connector in root.connectors(rotation) {
            doorways.push(Doorway {
                pos: root_origin + connector.pos,
                facing: connector.facing,
                tag: connector.tag.clone(),
                filled: false,
            });
            open.push_back(OpenDoorway {
                index: doorways.len() - 1,
                depth: 1,
            });
        }

        let mut counts = vec![0u32; dungeon.pool.len()];
        while let Some(next) = open.pop_front() {
            if tiles.len() as u32 >= def.max_tiles || next.depth > def.max_depth {
                continue;
            }
            let door = doorways[next.index].clone();

            let mut candidates: Vec<(usize, Rotation, usize)> = Vec::new();
            for (ti, tile) in dungeon.pool.iter().enumerate() {
                if counts[ti] >= tile.max_instances {
                    continue;
                }
                for r in Rotation::ALL {
                    for (ci, c) in tile.connectors(r).iter().enumerate() {
                        if c.facing == door.facing.opposite() && tags_match(&c.tag, &door.tag) {
                            candidates.push((ti, r, ci));
                        }
                    }
                }
            }

            let mut tries = 0;
            while tries < def.tries_per_connector && !candidates.is_empty() {
                tries += 1;
                let pick = rng.next_int(candidates.len() as u32) as usize;
                let (ti, r, ci) = candidates.swap_remove(pick);
                let tile = &dungeon.pool[ti];
                let origin = door.pos - tile.connectors(r)[ci].pos;
                let bounds = tile.schematic(r).footprint(origin);
                if tiles.iter().any(|t| t.bounds.intersects(&bounds)) || doorways.iter().any(|d| bounds.contains(d.pos)) {
                    continue;
                }

                counts[ti] += 1;
                doorways[next.index].filled = true;
                tiles.push(TilePlaceTask {
                    tile_code: tile.code.clone(),
                    pos: origin,
                    rotation: r,
                    bounds,
                    did_generate: false,
                    columns: Vec::new(),
                });
                for (k, c) in tile.connectors(r).iter().enumerate() {
                    if k == ci {
                        continue;
                    }
                    doorways.push(Doorway {
                        pos: origin + c.pos,
                        facing: c.facing,
                        tag: c.tag.clone(),
                        filled: false,
                    });
                    open.push_back(OpenDoorway {
                        index: doorways.len() - 1,
                        depth: next.depth + 1,
                    });
                }
                break;
            }
        }

        let bounds = tiles
            .iter()
            .map(|t| t.bounds)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(|| Cuboid::from_origin_size(root_origin, IVec3::ONE));
        tracing::debug!(
            "Built dungeon {} with {} tiles at {root_origin}",
            def.code,
            tiles.len()
        );
        DungeonPlaceTask {
            code: def.code.clone(),
            id,
            bounds,
            tiles,
            doorways,
        }
    }

    /// Dungeons rooted in `region`. Depends only on the seed and the region.
    pub fn plan_region(&self, region: RegionPos) -> Vec<DungeonPlaceTask> {
        let mut planned = Vec::new();
        for dungeon in &self.dungeons {
            let def = &dungeon.def;
            let mut rng = SeededRandomStream::new(self.seed);
            rng.init_salted_position_seed(dungeon.salt, region.x, region.z);
            if rng.next_float() >= def.chance {
                continue;
            }
            let x = region.x * REGION_SIZE + rng.next_int(REGION_SIZE as u32) as i32;
            let z = region.z * REGION_SIZE + rng.next_int(REGION_SIZE as u32) as i32;
            let y = def.min_y + rng.next_int((def.max_y - def.min_y + 1) as u32) as i32;
            planned.push(self.build(dungeon, IVec3::new(x, y, z), &mut rng));
        }
        planned
    }

    /// Bounds of every tile planned in the regions around chunk column
    /// `pos`, grown by one block to cover doorways. Plans those regions on
    /// first use.
    pub fn reserved_volumes(&self, regions: &RegionCache, pos: ColumnPos) -> Vec<Cuboid> {
        let mut reserved = Vec::new();
        if self.dungeons.is_empty() {
            return reserved;
        }
        for region_pos in RegionPos::of_column(pos).neighborhood() {
            let region = regions.get_or_create(region_pos);
            let result = region.update_mod_data(DUNGEON_DATA_KEY, |data: &mut RegionDungeons| {
                self.ensure_planned(data, region_pos);
                data.dungeons
                    .iter()
                    .flat_map(|d| d.tiles.iter().map(|t| t.bounds.expand_by(1)))
                    .collect::<Vec<_>>()
            });
            match result {
                Ok(bounds) => reserved.extend(bounds),
                Err(e) => tracing::warn!("Dungeon data of region {region_pos:?} unreadable: {e}"),
            }
        }
        reserved
    }

    fn ensure_planned(&self, data: &mut RegionDungeons, region: RegionPos) {
        if !data.planned {
            data.dungeons = self.plan_region(region);
            data.planned = true;
        }
    }

    /// Writes the slice inside the chunk column of every tile overlapping it.
    ///
    /// Dungeons are planned on first touch of their region and kept in the
    /// region's mod-data. Each tile remembers the columns that wrote their
    /// slice under the region's mod-data lock, so no slice is written twice,
    /// even across a save and reload of the region.
    pub fn realize_chunk<A: BlockAccessor + ?Sized>(
        &self,
        regions: &RegionCache,
        pos: ColumnPos,
        accessor: &mut A,
    ) -> DungeonReport {
        let mut report = DungeonReport::default();
        if self.dungeons.is_empty() {
            return report;
        }
        let area = Cuboid::from_origin_size(
            IVec3::new(pos.block_x(), 0, pos.block_z()),
            IVec3::new(CHUNK_SIZE, accessor.map_size_y(), CHUNK_SIZE),
        );

        let mut claimed: Vec<ClaimedTile> = Vec::new();
        for region_pos in RegionPos::of_column(pos).neighborhood() {
            let region = regions.get_or_create(region_pos);
            let result = region.update_mod_data(DUNGEON_DATA_KEY, |data: &mut RegionDungeons| {
                self.ensure_planned(data, region_pos);
                data.dungeons
                    .iter_mut()
                    .flat_map(|d| d.claim_slices(pos, &area))
                    .collect::<Vec<_>>()
            });
            match result {
                Ok(tiles) => claimed.extend(tiles),
                Err(e) => tracing::warn!("Dungeon data of region {region_pos:?} unreadable: {e}"),
            }
        }

        for claim in claimed {
            let Some(tile) = self
                .dungeons
                .iter()
                .find(|d| d.def.code == claim.dungeon)
                .and_then(|d| d.tile(&claim.tile.tile_code))
            else {
                tracing::warn!("Dungeon tile {}/{} no longer exists", claim.dungeon, claim.tile.tile_code);
                continue;
            };
            report.blocks_written += tile
                .schematic(claim.tile.rotation)
                .place_within(accessor, claim.tile.pos, &area);
            for door in claim.doorways {
                if in_xz(&area, door) && accessor.set_block(door, BlockId::AIR) {
                    report.blocks_written += 1;
                }
            }
            if claim.first {
                report.tiles_realized += 1;
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schematic::BlockSchematic;
    use crate::test_support::{MARKER, PLANKS, registry, solid};

    const SEED: u64 = 42;

    fn tagged(mut schematic: BlockSchematic, markers: &[(IVec3, &str)]) -> BlockSchematic {
        for &(p, tag) in markers {
            schematic.set(p, MARKER);
            schematic.attributes.push((p, tag.to_string()));
        }
        schematic
    }

    fn library() -> SchematicLibrary {
        let mut library = SchematicLibrary::new();
        library.insert(tagged(
            solid("crossing", IVec3::new(5, 3, 5), PLANKS),
            &[(IVec3::new(0, 1, 2), "corridor"), (IVec3::new(4, 1, 2), "corridor")],
        ));
        library.insert(tagged(
            solid("hall", IVec3::new(3, 3, 3), PLANKS),
            &[(IVec3::new(1, 1, 0), "corridor")],
        ));
        library.insert(tagged(
            solid("stairs", IVec3::new(3, 3, 3), PLANKS),
            &[(IVec3::new(1, 1, 0), "stairs")],
        ));
        library
    }

    fn variant(chance: f32, max_instances: u32) -> DungeonVariant {
        DungeonVariant {
            code: "crypt".into(),
            root_tiles: vec![DungeonTileVariant {
                code: "crossing".into(),
                schematic: "crossing".into(),
                max_instances: 1,
            }],
            tiles: vec![
                DungeonTileVariant {
                    code: "hall".into(),
                    schematic: "hall".into(),
                    max_instances,
                },
                DungeonTileVariant {
                    code: "stairs".into(),
                    schematic: "stairs".into(),
                    max_instances: 4,
                },
            ],
            chance,
            min_y: 20,
            max_y: 20,
            ..Default::default()
        }
    }

    fn dungeon_generator(def: DungeonVariant) -> TiledDungeonGenerator {
        let (dungeons, errors) = TiledDungeonGenerator::resolve_all(&[def], &library(), &registry());
        assert!(errors.is_empty(), "{errors:?}");
        TiledDungeonGenerator::new(SEED, dungeons)
    }

    #[test]
    fn test_single_matching_tile_gives_two_tile_dungeon() {
        let generator = dungeon_generator(variant(1.0, 1));
        let dungeon = &generator.dungeons[0];
        let mut rng = SeededRandomStream::new(SEED);
        rng.init_position_seed(3, 4);
        let task = generator.build(dungeon, IVec3::new(0, 20, 0), &mut rng);

        assert_eq!(task.tiles.len(), 2);
        assert_eq!(task.doorways.len(), 2);
        assert_eq!(task.unfilled_doorways(), 1);

        let door = task.doorways.iter().find(|d| d.filled).unwrap();
        let child = &task.tiles[1];
        assert_eq!(child.tile_code, "hall");
        let hall = dungeon.tile("hall").unwrap();
        let connector = &hall.connectors(child.rotation)[0];
        assert_eq!(child.pos + connector.pos, door.pos, "connectors coincide");
        assert_eq!(connector.facing, door.facing.opposite(), "connectors antiparallel");
        assert!(!task.tiles[0].bounds.intersects(&child.bounds));
        assert!(!child.bounds.contains(door.pos) && !task.tiles[0].bounds.contains(door.pos));
    }

    #[test]
    fn test_tile_budget_and_depth_bound_growth() {
        let mut def = variant(1.0, 16);
        def.max_tiles = 3;
        let generator = dungeon_generator(def);
        let mut rng = SeededRandomStream::new(SEED);
        let task = generator.build(&generator.dungeons[0], IVec3::new(0, 20, 0), &mut rng);
        assert!(task.tiles.len() <= 3);

        let mut def = variant(1.0, 16);
        def.max_depth = 0;
        let generator = dungeon_generator(def);
        let task = generator.build(&generator.dungeons[0], IVec3::new(0, 20, 0), &mut rng);
        assert_eq!(task.tiles.len(), 1);
        assert_eq!(task.unfilled_doorways(), 2);
    }

    #[test]
    fn test_plan_is_pure_in_seed_and_region() {
        let generator = dungeon_generator(variant(1.0, 4));
        let a = generator.plan_region(RegionPos::new(2, -1));
        let b = generator.plan_region(RegionPos::new(2, -1));
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
        let root = &a[0].tiles[0];
        assert_eq!(RegionPos::of_block(root.pos.x, root.pos.z), RegionPos::new(2, -1));
        assert_eq!(root.pos.y, 20);

        assert!(dungeon_generator(variant(0.0, 4)).plan_region(RegionPos::new(2, -1)).is_empty());
    }

    #[test]
    fn test_tiles_realize_once_across_save_and_load() {
        let generator = dungeon_generator(variant(1.0, 4));
        let planned = generator.plan_region(RegionPos::new(0, 0));
        let root = planned[0].tiles[0].clone();
        let chunk = ColumnPos::containing(root.pos.x, root.pos.z);
        let around: Vec<ColumnPos> = (-1..=1)
            .flat_map(|dz| (-1..=1).map(move |dx| chunk.offset(dx, dz)))
            .collect();

        let regions = RegionCache::new(SEED);
        let mut world = nebula_voxel::ColumnStore::new(64);
        for &pos in &around {
            world.ensure(pos);
        }
        let first = generator.realize_chunk(&regions, chunk, &mut world);
        assert!(first.tiles_realized >= 1);
        for &pos in around.iter().filter(|&&pos| pos != chunk) {
            generator.realize_chunk(&regions, pos, &mut world);
        }
        assert_eq!(world.block(root.pos + IVec3::new(2, 0, 2)), PLANKS);

        let restored = RegionCache::new(SEED);
        for pos in regions.loaded_positions() {
            restored.restore(regions.unload(pos).unwrap()).unwrap();
        }
        let data: RegionDungeons = restored
            .get(RegionPos::new(0, 0))
            .unwrap()
            .mod_data(DUNGEON_DATA_KEY)
            .unwrap()
            .unwrap();
        assert!(data.planned);
        assert!(data.dungeons[0].tiles[0].did_generate);
        assert!(data.dungeons[0].tiles[0].columns.contains(&chunk));
        for &pos in &around {
            let again = generator.realize_chunk(&restored, pos, &mut world);
            assert_eq!(again, DungeonReport::default(), "column {pos:?}");
        }
    }

    #[test]
    fn test_tile_writes_stay_inside_the_column() {
        let generator = dungeon_generator(variant(1.0, 4));
        let planned = generator.plan_region(RegionPos::new(0, 0));
        let root = planned[0].tiles[0].clone();
        let chunk = ColumnPos::containing(root.pos.x, root.pos.z);

        let regions = RegionCache::new(SEED);
        let mut world = nebula_voxel::ColumnStore::new(64);
        for dz in -1..=1 {
            for dx in -1..=1 {
                world.ensure(chunk.offset(dx, dz));
            }
        }
        generator.realize_chunk(&regions, chunk, &mut world);
        for dz in -1..=1 {
            for dx in -1..=1 {
                let pos = chunk.offset(dx, dz);
                let air = world.get(pos).unwrap().count(BlockId::AIR);
                let touched = air < (CHUNK_SIZE * CHUNK_SIZE * 64) as usize;
                assert_eq!(touched, pos == chunk, "column {pos:?}");
            }
        }
    }

    #[test]
    fn test_reserved_volumes_cover_planned_tiles() {
        let generator = dungeon_generator(variant(1.0, 4));
        let planned = generator.plan_region(RegionPos::new(0, 0));
        let root = &planned[0].tiles[0];
        let chunk = ColumnPos::containing(root.pos.x, root.pos.z);
        let regions = RegionCache::new(SEED);

        let reserved = generator.reserved_volumes(&regions, chunk);
        for tile in &planned[0].tiles {
            assert!(reserved.contains(&tile.bounds.expand_by(1)));
        }
        assert!(TiledDungeonGenerator::new(SEED, Vec::new()).reserved_volumes(&regions, chunk).is_empty());
    }

    #[test]
    fn test_missing_marker_block_fails_every_dungeon() {
        let registry = BlockRegistry::new();
        let (dungeons, errors) = TiledDungeonGenerator::resolve_all(&[variant(1.0, 1)], &library(), &registry);
        assert!(dungeons.is_empty());
        assert!(matches!(errors[0], StructureError::UnresolvedBlock { .. }));
    }
}
