//! The generation context: every generator resolved against one world seed,
//! and the pass pipeline that drives them over a [`ColumnStore`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use nebula_config::{TuningConfig, WorldGenConfig};
use nebula_math::Cuboid;
use nebula_structures::{
    PlacementContext, PlacementPass, SchematicLibrary, StructurePlacementEngine, StructureTuning,
    TiledDungeonGenerator,
};
use nebula_terrain::{
    BlockLayers, DepositPlacer, Landform, LatticeGenerator, RegionCache, RockStrataAssigner, TerrainBlocks,
    TerrainDensityField,
};
use nebula_voxel::{BlockRegistry, ColumnPos, ColumnStore, GenPass};

use crate::assets::{AssetBundle, AssetReport};
use crate::error::WorldGenError;
use crate::listeners::GenerationListeners;
use crate::pipeline::TerrainPipeline;
use crate::worker::{AsyncColumnGenerator, ColumnTask};

/// How long the caller waits on a silent worker pool before giving up.
const WORKER_TIMEOUT: Duration = Duration::from_secs(120);

/// Counters summed over the passes of a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerationStats {
    /// Columns that ran the terrain pass.
    pub columns: usize,
    pub strata_blocks: u32,
    pub soil_blocks: u32,
    pub deposits: usize,
    pub deposit_blocks: u32,
    pub structures: usize,
    pub claims: usize,
    pub dungeon_tiles: u32,
    pub dungeon_blocks: u32,
}

impl GenerationStats {
    pub fn merge(&mut self, other: &GenerationStats) {
        self.columns += other.columns;
        self.strata_blocks += other.strata_blocks;
        self.soil_blocks += other.soil_blocks;
        self.deposits += other.deposits;
        self.deposit_blocks += other.deposit_blocks;
        self.structures += other.structures;
        self.claims += other.claims;
        self.dungeon_tiles += other.dungeon_tiles;
        self.dungeon_blocks += other.dungeon_blocks;
    }
}

pub struct GenerationContext {
    seed: u64,
    registry: Arc<BlockRegistry>,
    terrain: Arc<TerrainPipeline>,
    deposits: DepositPlacer,
    structures: StructurePlacementEngine,
    dungeons: TiledDungeonGenerator,
    tuning: StructureTuning,
    listeners: GenerationListeners,
    log_column_timings: bool,
}

fn validate(config: &WorldGenConfig, tuning: &StructureTuning) -> Result<(), WorldGenError> {
    let invalid = |reason: String| Err(WorldGenError::InvalidSettings(reason));
    if !(16..=u16::MAX as i32).contains(&config.map_height) {
        return invalid(format!("map height {} out of range", config.map_height));
    }
    if !(1..config.map_height).contains(&config.sea_level) {
        return invalid(format!(
            "sea level {} must lie inside the map height {}",
            config.sea_level, config.map_height
        ));
    }
    if config.deposit_chunk_range < 0 {
        return invalid("deposit chunk range must not be negative".into());
    }
    if let Err(err) = tuning.validate() {
        return invalid(err.to_string());
    }
    if let Some(chance) = config.dungeon_chance
        && !(0.0..=1.0).contains(&chance)
    {
        return invalid(format!("dungeon chance {chance} must lie in 0..=1"));
    }
    Ok(())
}

fn structure_tuning(config: &WorldGenConfig, tuning: &TuningConfig) -> StructureTuning {
    StructureTuning {
        chance_multiplier: config.structure_chance_multiplier,
        chance_multipliers: tuning
            .chance_multipliers
            .iter()
            .map(|(code, m)| (code.clone(), *m))
            .collect(),
        max_count_overrides: tuning
            .max_count_overrides
            .iter()
            .map(|(code, n)| (code.clone(), *n))
            .collect(),
    }
}

impl GenerationContext {
    /// Resolves every variant in `assets` for one world.
    ///
    /// Variants that fail to resolve are left out and listed in the returned
    /// report; the rest of the world still generates.
    ///
    /// # Errors
    ///
    /// [`WorldGenError::InvalidSettings`] for out-of-range settings,
    /// [`WorldGenError::MissingTerrainBlock`] if a terrain block code is not
    /// registered, [`WorldGenError::NoLandforms`] if no landform survives.
    pub fn new(
        config: &WorldGenConfig,
        tuning: &TuningConfig,
        assets: &AssetBundle,
    ) -> Result<(Self, AssetReport), WorldGenError> {
        let tuned = structure_tuning(config, tuning);
        validate(config, &tuned)?;
        let seed = config.seed;
        let (map_height, sea_level) = (config.map_height, config.sea_level);
        let mut report = AssetReport::default();

        let mut registry = BlockRegistry::new();
        for def in &assets.blocks {
            if let Err(err) = registry.register(def.clone()) {
                report.warn(format_args!("block '{}': {err}", def.code));
            }
        }
        let terrain_block = |role: &'static str, code: &str| {
            registry
                .resolve(code)
                .map_err(|source| WorldGenError::MissingTerrainBlock { role, source })
        };
        let blocks = TerrainBlocks {
            rock: terrain_block("rock", &assets.terrain.rock)?,
            water: terrain_block("water", &assets.terrain.water)?,
            mantle: terrain_block("mantle", &assets.terrain.mantle)?,
        };

        let mut landforms = Vec::new();
        for variant in &assets.landforms {
            match Landform::from_variant(variant, map_height) {
                Ok(landform) => landforms.push(landform),
                Err(err) => report.warn(err),
            }
        }
        if landforms.is_empty() {
            return Err(WorldGenError::NoLandforms);
        }

        let lattice = LatticeGenerator::new(
            seed,
            landforms.iter().map(Landform::zone_entry).collect(),
            assets.provinces.iter().map(|p| p.zone_entry()).collect(),
            &assets.ore_maps(),
        );

        let (layers, errors) = BlockLayers::new(&assets.block_layers, &registry, sea_level, map_height);
        errors.into_iter().for_each(|e| report.warn(e));
        let (strata, errors) =
            RockStrataAssigner::new(seed, &assets.strata, &assets.provinces, layers, &registry, blocks);
        errors.into_iter().for_each(|e| report.warn(e));

        let (resolved, errors) = DepositPlacer::resolve_all(&assets.deposits, &registry, &lattice);
        errors.into_iter().for_each(|e| report.warn(e));
        let roughness = landforms.iter().map(|l| l.roughness).collect();
        let deposits = DepositPlacer::new(seed, resolved, config.deposit_chunk_range, roughness, map_height);

        let density = TerrainDensityField::new(seed, landforms, blocks, sea_level, map_height);
        let terrain = TerrainPipeline::new(lattice, Arc::new(RegionCache::new(seed)), density, strata);

        let (library, errors) = SchematicLibrary::resolve_all(&assets.schematics, &registry);
        errors.into_iter().for_each(|e| report.warn(e));
        let (structures, errors) = StructurePlacementEngine::resolve_structures(&assets.structures, &library);
        errors.into_iter().for_each(|e| report.warn(e));
        let (villages, errors) = StructurePlacementEngine::resolve_villages(&assets.villages, &library);
        errors.into_iter().for_each(|e| report.warn(e));

        let dungeon_defs: Vec<_> = assets
            .dungeons
            .iter()
            .map(|def| {
                let mut def = def.clone();
                if let Some(chance) = config.dungeon_chance {
                    def.chance = chance;
                }
                def.max_tiles = def.max_tiles.min(config.dungeon_max_tiles);
                def.max_depth = def.max_depth.min(config.dungeon_max_depth);
                def
            })
            .collect();
        let (dungeons, errors) = TiledDungeonGenerator::resolve_all(&dungeon_defs, &library, &registry);
        errors.into_iter().for_each(|e| report.warn(e));

        let registry = Arc::new(registry);
        let context = Self {
            seed,
            structures: StructurePlacementEngine::new(seed, sea_level, Arc::clone(&registry), structures, villages),
            dungeons: TiledDungeonGenerator::new(seed, dungeons),
            registry,
            terrain: Arc::new(terrain),
            deposits,
            tuning: tuned,
            listeners: GenerationListeners::new(),
            log_column_timings: false,
        };
        tracing::info!(
            "World generation ready: seed {seed}, {} deposits, {} structures, {} villages, {} dungeons, {} asset warnings",
            context.deposits.deposit_count(),
            context.structures.structure_count(),
            context.structures.village_count(),
            context.dungeons.dungeon_count(),
            report.warnings.len()
        );
        Ok((context, report))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// The shared terrain pass, for handing to an [`AsyncColumnGenerator`].
    pub fn terrain(&self) -> Arc<TerrainPipeline> {
        Arc::clone(&self.terrain)
    }

    pub fn regions(&self) -> &Arc<RegionCache> {
        self.terrain.regions()
    }

    pub fn map_height(&self) -> i32 {
        self.terrain.map_height()
    }

    pub fn tuning(&self) -> &StructureTuning {
        &self.tuning
    }

    pub fn listeners_mut(&mut self) -> &mut GenerationListeners {
        &mut self.listeners
    }

    pub fn set_log_column_timings(&mut self, enabled: bool) {
        self.log_column_timings = enabled;
    }

    /// A column store sized for this world.
    pub fn new_store(&self) -> ColumnStore {
        ColumnStore::new(self.map_height())
    }

    // -----------------------------------------------------------------------
    // Passes
    // -----------------------------------------------------------------------

    /// Runs one pass on one loaded column with the context's own tuning.
    /// Returns `Ok(None)` if the column already completed `pass`.
    ///
    /// # Errors
    ///
    /// See [`GenerationContext::generate_pass_tuned`].
    pub fn generate_pass(
        &self,
        store: &mut ColumnStore,
        pos: ColumnPos,
        pass: GenPass,
    ) -> Result<Option<GenerationStats>, WorldGenError> {
        self.generate_pass_tuned(store, pos, pass, &self.tuning)
    }

    /// Runs one pass on one loaded column.
    ///
    /// The terrain pass only touches its own column. Terrain features need
    /// the eight neighbours through terrain, decoration needs them through
    /// terrain features, since both may write across the column border.
    ///
    /// # Errors
    ///
    /// [`WorldGenError::ColumnNotLoaded`] if `pos` is not in `store`,
    /// [`WorldGenError::PassOutOfOrder`] if the previous pass has not run on
    /// the column, [`WorldGenError::NeighborsNotReady`] if a neighbour lags
    /// behind.
    pub fn generate_pass_tuned(
        &self,
        store: &mut ColumnStore,
        pos: ColumnPos,
        pass: GenPass,
        tuning: &StructureTuning,
    ) -> Result<Option<GenerationStats>, WorldGenError> {
        let column = store
            .get(pos)
            .ok_or(WorldGenError::ColumnNotLoaded { x: pos.x, z: pos.z })?;
        if column.has_completed(pass) {
            return Ok(None);
        }
        if let Some(previous) = previous_pass(pass)
            && !column.has_completed(previous)
        {
            return Err(WorldGenError::PassOutOfOrder { x: pos.x, z: pos.z, pass });
        }
        if let Some(required) = neighbor_requirement(pass)
            && !neighbors_ready(store, pos, required)
        {
            return Err(WorldGenError::NeighborsNotReady { x: pos.x, z: pos.z, pass });
        }

        let mut stats = GenerationStats::default();
        match pass {
            GenPass::Terrain => {
                if let Some(column) = store.get_mut(pos)
                    && let Some(report) = self.terrain.generate(column)
                {
                    stats.columns = 1;
                    stats.strata_blocks = report.strata_blocks;
                    stats.soil_blocks = report.soil_blocks;
                }
            }
            GenPass::TerrainFeatures => {
                let deposits = self.deposits.place(pos, store, self.terrain.lattice());
                stats.deposits = deposits.placements.len();
                stats.deposit_blocks = deposits.blocks_replaced;

                let reserved = self.dungeons.reserved_volumes(self.terrain.regions(), pos);
                self.place_structures(store, pos, tuning, PlacementPass::Primary, &reserved, &mut stats);

                let dungeons = self.dungeons.realize_chunk(self.terrain.regions(), pos, store);
                stats.dungeon_tiles = dungeons.tiles_realized;
                stats.dungeon_blocks = dungeons.blocks_written;
            }
            GenPass::Vegetation => {}
            GenPass::Decoration => {
                let reserved = self.dungeons.reserved_volumes(self.terrain.regions(), pos);
                self.place_structures(store, pos, tuning, PlacementPass::PostPass, &reserved, &mut stats);
            }
        }

        self.listeners.column_pass(pass, pos, store);
        if let Some(column) = store.get_mut(pos) {
            column.mark_completed(pass);
        }
        Ok(Some(stats))
    }

    fn place_structures(
        &self,
        store: &mut ColumnStore,
        pos: ColumnPos,
        tuning: &StructureTuning,
        pass: PlacementPass,
        reserved: &[Cuboid],
        stats: &mut GenerationStats,
    ) {
        let ctx = PlacementContext {
            regions: self.terrain.regions(),
            lattice: self.terrain.lattice(),
            tuning,
            reserved,
        };
        let report = self.structures.place_chunk(pos, store, &ctx, pass);
        self.listeners.structures(&report.placed, &report.claims);
        stats.structures += report.placed.len();
        stats.claims += report.claims.len();
    }

    /// Runs every pass that is ready on `pos`, in order. Stops quietly at
    /// the first pass whose neighbours are not ready.
    ///
    /// # Errors
    ///
    /// [`WorldGenError::ColumnNotLoaded`] if `pos` is not in `store`.
    pub fn generate_column(
        &self,
        store: &mut ColumnStore,
        pos: ColumnPos,
    ) -> Result<GenerationStats, WorldGenError> {
        let mut stats = GenerationStats::default();
        for pass in GenPass::ALL {
            match self.generate_pass(store, pos, pass) {
                Ok(Some(s)) => stats.merge(&s),
                Ok(None) => {}
                Err(WorldGenError::NeighborsNotReady { .. }) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(stats)
    }

    /// Fully generates the square of columns within `radius` of `center`.
    ///
    /// Loads and runs the terrain pass on a margin of two columns, terrain
    /// features and vegetation on a margin of one, so that every requested
    /// column can finish decoration. With `workers`, the terrain pass runs on
    /// the pool; the result is the same either way.
    ///
    /// # Errors
    ///
    /// [`WorldGenError::WorkerTimeout`] if the pool stops answering.
    pub fn generate_area(
        &self,
        store: &mut ColumnStore,
        center: ColumnPos,
        radius: i32,
        workers: Option<&AsyncColumnGenerator>,
    ) -> Result<GenerationStats, WorldGenError> {
        let radius = radius.max(0);
        let mut stats = GenerationStats::default();

        let pending: Vec<ColumnPos> = square(center, radius + 2)
            .filter(|p| !store.get(*p).is_some_and(|c| c.has_completed(GenPass::Terrain)))
            .collect();
        match workers {
            Some(workers) => stats.merge(&self.terrain_on_workers(store, center, &pending, workers)?),
            None => {
                for &pos in &pending {
                    store.ensure(pos);
                    if let Some(s) = self.generate_pass(store, pos, GenPass::Terrain)? {
                        stats.merge(&s);
                    }
                }
            }
        }

        for pass in [GenPass::TerrainFeatures, GenPass::Vegetation] {
            for pos in square(center, radius + 1) {
                if let Some(s) = self.generate_pass(store, pos, pass)? {
                    stats.merge(&s);
                }
            }
        }
        for pos in square(center, radius) {
            if let Some(s) = self.generate_pass(store, pos, GenPass::Decoration)? {
                stats.merge(&s);
            }
        }
        tracing::debug!(
            "Generated area around ({}, {}) radius {radius}: {stats:?}",
            center.x,
            center.z
        );
        Ok(stats)
    }

    /// Submits the nearest columns first.
    fn terrain_on_workers(
        &self,
        store: &mut ColumnStore,
        center: ColumnPos,
        pending: &[ColumnPos],
        workers: &AsyncColumnGenerator,
    ) -> Result<GenerationStats, WorldGenError> {
        let mut stats = GenerationStats::default();
        let mut nearest_first = pending.to_vec();
        nearest_first.sort_by_key(|pos| {
            let (dx, dz) = (i64::from(pos.x - center.x), i64::from(pos.z - center.z));
            dx * dx + dz * dz
        });
        let mut queue: VecDeque<ColumnTask> = nearest_first.into_iter().map(|pos| ColumnTask { pos }).collect();

        let mut outstanding = 0usize;
        while !queue.is_empty() || outstanding > 0 {
            while let Some(task) = queue.pop_front() {
                if let Err(task) = workers.submit(task) {
                    queue.push_front(task);
                    break;
                }
                outstanding += 1;
            }
            let Some(done) = workers.wait_result(WORKER_TIMEOUT) else {
                return Err(WorldGenError::WorkerTimeout { pending: outstanding + queue.len() });
            };
            outstanding -= 1;

            let pos = done.column.pos();
            if self.log_column_timings {
                tracing::debug!("Column ({}, {}) terrain in {}us", pos.x, pos.z, done.generation_time_us);
            }
            if store.get(pos).is_some_and(|c| c.has_completed(GenPass::Terrain)) {
                continue;
            }
            store.insert(done.column);
            self.listeners.column_pass(GenPass::Terrain, pos, store);
            stats.merge(&GenerationStats {
                columns: 1,
                strata_blocks: done.strata.strata_blocks,
                soil_blocks: done.strata.soil_blocks,
                ..Default::default()
            });
        }
        Ok(stats)
    }
}

fn previous_pass(pass: GenPass) -> Option<GenPass> {
    match pass {
        GenPass::Terrain => None,
        GenPass::TerrainFeatures => Some(GenPass::Terrain),
        GenPass::Vegetation => Some(GenPass::TerrainFeatures),
        GenPass::Decoration => Some(GenPass::Vegetation),
    }
}

/// Pass every neighbour must have completed before `pass` may run.
fn neighbor_requirement(pass: GenPass) -> Option<GenPass> {
    match pass {
        GenPass::TerrainFeatures => Some(GenPass::Terrain),
        GenPass::Decoration => Some(GenPass::TerrainFeatures),
        GenPass::Terrain | GenPass::Vegetation => None,
    }
}

fn neighbors_ready(store: &ColumnStore, pos: ColumnPos, required: GenPass) -> bool {
    (-1..=1)
        .flat_map(|dz| (-1..=1).map(move |dx| (dx, dz)))
        .filter(|&d| d != (0, 0))
        .all(|(dx, dz)| {
            store
                .get(pos.offset(dx, dz))
                .is_some_and(|c| c.has_completed(required))
        })
}

/// Columns of the square of side `2 * radius + 1` around `center`, row by row.
pub fn square(center: ColumnPos, radius: i32) -> impl Iterator<Item = ColumnPos> {
    (-radius..=radius).flat_map(move |dz| (-radius..=radius).map(move |dx| center.offset(dx, dz)))
}
