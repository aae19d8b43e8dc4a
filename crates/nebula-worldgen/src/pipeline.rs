//! The column-local terrain pass, shared between the caller and worker threads.

use std::sync::Arc;

use nebula_terrain::{LatticeGenerator, RegionCache, RegionPos, RockStrataAssigner, StrataReport, TerrainDensityField};
use nebula_voxel::{ChunkColumn, ColumnPos};

/// Density field plus strata and soil layers. Everything it reads is either
/// immutable or a region lattice built once per region, so any thread may
/// run it for any column and get the same blocks.
pub struct TerrainPipeline {
    lattice: LatticeGenerator,
    regions: Arc<RegionCache>,
    density: TerrainDensityField,
    strata: RockStrataAssigner,
}

impl TerrainPipeline {
    pub fn new(
        lattice: LatticeGenerator,
        regions: Arc<RegionCache>,
        density: TerrainDensityField,
        strata: RockStrataAssigner,
    ) -> Self {
        Self {
            lattice,
            regions,
            density,
            strata,
        }
    }

    pub fn lattice(&self) -> &LatticeGenerator {
        &self.lattice
    }

    pub fn regions(&self) -> &Arc<RegionCache> {
        &self.regions
    }

    pub fn map_height(&self) -> i32 {
        self.density.map_height()
    }

    pub fn sea_level(&self) -> i32 {
        self.density.sea_level()
    }

    /// Runs the terrain pass on `column` and freezes the result as the
    /// column's terrain snapshot. Returns `None` if the column had already
    /// been through it.
    pub fn generate(&self, column: &mut ChunkColumn) -> Option<StrataReport> {
        let region = self.regions.get_or_create(RegionPos::of_column(column.pos()));
        let lattice = region.lattice(&self.lattice);
        if !self.density.generate(column, &*lattice) {
            return None;
        }
        let report = self.strata.assign(column, &*lattice);
        column.freeze_terrain();
        Some(report)
    }

    /// A fresh column at `pos` with the terrain pass applied.
    pub fn generate_column(&self, pos: ColumnPos) -> (ChunkColumn, StrataReport) {
        let mut column = ChunkColumn::new(pos, self.map_height());
        let report = self.generate(&mut column).unwrap_or_default();
        (column, report)
    }
}
