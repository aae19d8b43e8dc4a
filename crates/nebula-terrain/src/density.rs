//! Terrain density field: landform-weighted 3D noise classified into rock,
//! water and air.
//!
//! Noise is evaluated on a coarse grid (every 4 blocks horizontally, every
//! 8 vertically) and expanded to blocks by trilinear interpolation. Along
//! each vertical cell edge the density advances by a precomputed per-step
//! gain instead of being re-interpolated per block.

use nebula_voxel::{BlockId, CHUNK_SIZE, ChunkColumn, GenPass};

use crate::lattice::{Channel, LatticeSampler};
use crate::landform::{BlendedLandform, Landform, TERRAIN_OCTAVES};
use crate::octave::OctaveNoise;
use crate::random::code_salt;

/// Horizontal distance between coarse samples.
pub const HORIZONTAL_STRIDE: i32 = 4;
/// Vertical distance between coarse samples.
pub const VERTICAL_STRIDE: i32 = 8;

const SAMPLES_XZ: usize = (CHUNK_SIZE / HORIZONTAL_STRIDE) as usize + 1;

/// Base frequency of the lowest density octave.
const DENSITY_FREQUENCY: f64 = 1.0 / 1024.0;

/// Blocks the density pass writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerrainBlocks {
    pub rock: BlockId,
    pub water: BlockId,
    pub mantle: BlockId,
}

/// Per-column solid/water/air classification.
pub struct TerrainDensityField {
    noise: OctaveNoise,
    landforms: Vec<Landform>,
    blocks: TerrainBlocks,
    sea_level: i32,
    map_height: i32,
}

impl TerrainDensityField {
    pub fn new(seed: u64, landforms: Vec<Landform>, blocks: TerrainBlocks, sea_level: i32, map_height: i32) -> Self {
        Self {
            noise: OctaveNoise::new(
                seed,
                code_salt("terrain-density"),
                &[1.0; TERRAIN_OCTAVES],
                &[],
                DENSITY_FREQUENCY,
            ),
            landforms,
            blocks,
            sea_level,
            map_height,
        }
    }

    pub fn landforms(&self) -> &[Landform] {
        &self.landforms
    }

    pub fn sea_level(&self) -> i32 {
        self.sea_level
    }

    pub fn map_height(&self) -> i32 {
        self.map_height
    }

    fn samples_y(&self) -> usize {
        ((self.map_height + VERTICAL_STRIDE - 1) / VERTICAL_STRIDE) as usize + 1
    }

    /// Fills `column` with rock, water and air and sets both height maps.
    ///
    /// Returns `false` without touching the column if its terrain pass has
    /// already completed.
    pub fn generate(&self, column: &mut ChunkColumn, lattice: &impl LatticeSampler) -> bool {
        if column.has_completed(GenPass::Terrain) {
            return false;
        }

        let coarse = self.coarse_densities(column, lattice);
        let sy = self.samples_y();
        let at = |sx: usize, sz: usize, y: usize| coarse[(sz * SAMPLES_XZ + sx) * sy + y];
        let hs = HORIZONTAL_STRIDE as usize;
        let vs = VERTICAL_STRIDE as usize;

        for cz in 0..SAMPLES_XZ - 1 {
            for cx in 0..SAMPLES_XZ - 1 {
                for cy in 0..sy - 1 {
                    let mut edge = [
                        at(cx, cz, cy),
                        at(cx + 1, cz, cy),
                        at(cx, cz + 1, cy),
                        at(cx + 1, cz + 1, cy),
                    ];
                    let gain = [
                        (at(cx, cz, cy + 1) - edge[0]) / vs as f64,
                        (at(cx + 1, cz, cy + 1) - edge[1]) / vs as f64,
                        (at(cx, cz + 1, cy + 1) - edge[2]) / vs as f64,
                        (at(cx + 1, cz + 1, cy + 1) - edge[3]) / vs as f64,
                    ];

                    for ly in 0..vs {
                        let y = (cy * vs + ly) as i32;
                        if y >= self.map_height {
                            break;
                        }
                        for lz in 0..hs {
                            let fz = lz as f64 / hs as f64;
                            let west = edge[0] + (edge[2] - edge[0]) * fz;
                            let east = edge[1] + (edge[3] - edge[1]) * fz;
                            for lx in 0..hs {
                                let density = west + (east - west) * (lx as f64 / hs as f64);
                                let bx = (cx * hs + lx) as i32;
                                let bz = (cz * hs + lz) as i32;
                                self.place(column, bx, y, bz, density);
                            }
                        }
                        for (value, step) in edge.iter_mut().zip(gain) {
                            *value += step;
                        }
                    }
                }
            }
        }

        column.mark_completed(GenPass::Terrain);
        true
    }

    fn place(&self, column: &mut ChunkColumn, lx: i32, y: i32, lz: i32, density: f64) {
        let block = if y == 0 {
            self.blocks.mantle
        } else if density > 0.0 {
            self.blocks.rock
        } else if y < self.sea_level {
            self.blocks.water
        } else {
            return;
        };
        column.set(lx, y, lz, block);
        // Blocks are visited bottom-up per cell, so later writes are higher.
        if block != self.blocks.water && y > column.terrain_height(lx, lz) {
            column.set_terrain_height(lx, lz, y);
        }
        if y > column.rain_height(lx, lz) {
            column.set_rain_height(lx, lz, y);
        }
    }

    /// Coarse density samples, indexed `[sz][sx][sy]`.
    fn coarse_densities(&self, column: &ChunkColumn, lattice: &impl LatticeSampler) -> Vec<f64> {
        let base_x = column.pos().block_x();
        let base_z = column.pos().block_z();
        let corner = |dx: i32, dz: i32| {
            let weights = lattice.weights_at(Channel::Landform, base_x + dx, base_z + dz);
            BlendedLandform::blend(&self.landforms, &weights, self.map_height)
        };
        let corners = [
            corner(0, 0),
            corner(CHUNK_SIZE, 0),
            corner(0, CHUNK_SIZE),
            corner(CHUNK_SIZE, CHUNK_SIZE),
        ];

        let sy = self.samples_y();
        let mut out = Vec::with_capacity(SAMPLES_XZ * SAMPLES_XZ * sy);
        let mut amplitudes = [0.0; TERRAIN_OCTAVES];
        let mut thresholds = [0.0; TERRAIN_OCTAVES];

        for sz in 0..SAMPLES_XZ {
            for sx in 0..SAMPLES_XZ {
                let fx = sx as f64 / (SAMPLES_XZ - 1) as f64;
                let fz = sz as f64 / (SAMPLES_XZ - 1) as f64;
                let w = [(1.0 - fx) * (1.0 - fz), fx * (1.0 - fz), (1.0 - fx) * fz, fx * fz];
                let mix = |values: [f64; 4]| values.iter().zip(w).map(|(v, w)| v * w).sum::<f64>();

                for o in 0..TERRAIN_OCTAVES {
                    amplitudes[o] = mix(corners.each_ref().map(|c| c.amplitudes[o]));
                    thresholds[o] = mix(corners.each_ref().map(|c| c.thresholds[o]));
                }

                let wx = (base_x + sx as i32 * HORIZONTAL_STRIDE) as f64;
                let wz = (base_z + sz as i32 * HORIZONTAL_STRIDE) as f64;
                for s in 0..sy {
                    let y = s as i32 * VERTICAL_STRIDE;
                    let threshold = mix(corners.each_ref().map(|c| c.y_threshold(y)));
                    let noise = self.noise.sample_3d_with(&amplitudes, &thresholds, wx, y as f64, wz);
                    out.push(noise - threshold);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::climate::ClimateEnvelope;
    use crate::landform::LandformVariant;
    use crate::lattice::{LatticeGenerator, ZoneEntry};
    use nebula_voxel::ColumnPos;

    const MAP_HEIGHT: i32 = 128;
    const SEA_LEVEL: i32 = 50;

    fn blocks() -> TerrainBlocks {
        TerrainBlocks {
            rock: BlockId(1),
            water: BlockId(2),
            mantle: BlockId(3),
        }
    }

    fn flat(surface_fraction: f32, amplitude: f32) -> LandformVariant {
        LandformVariant {
            code: "flat".into(),
            octaves: vec![amplitude, amplitude * 0.5],
            y_key_positions: vec![0.0, surface_fraction, 1.0],
            y_key_thresholds: vec![-2.0, 0.0, 2.0],
            ..Default::default()
        }
    }

    fn field(variant: LandformVariant) -> (TerrainDensityField, LatticeGenerator) {
        let landform = Landform::from_variant(&variant, MAP_HEIGHT).unwrap();
        let lattice = LatticeGenerator::new(
            9,
            vec![landform.zone_entry()],
            vec![ZoneEntry {
                weight: 1.0,
                envelope: ClimateEnvelope::default(),
            }],
            &[],
        );
        (
            TerrainDensityField::new(9, vec![landform], blocks(), SEA_LEVEL, MAP_HEIGHT),
            lattice,
        )
    }

    #[test]
    fn test_silent_landform_gives_flat_surface() {
        let (field, lattice) = field(flat(0.5, 0.0));
        let mut column = ChunkColumn::new(ColumnPos::new(3, -2), MAP_HEIGHT);
        assert!(field.generate(&mut column, &lattice));
        // Threshold crosses zero at y = 64; density is -threshold.
        for (lx, lz) in [(0, 0), (5, 17), (31, 31)] {
            assert_eq!(column.terrain_height(lx, lz), 63, "column ({lx}, {lz})");
            assert_eq!(column.get(lx, 63, lz), BlockId(1));
            assert_eq!(column.get(lx, 64, lz), BlockId::AIR);
            assert_eq!(column.get(lx, 0, lz), BlockId(3));
        }
    }

    #[test]
    fn test_low_surface_floods_to_sea_level() {
        let (field, lattice) = field(flat(0.25, 0.0));
        let mut column = ChunkColumn::new(ColumnPos::new(0, 0), MAP_HEIGHT);
        field.generate(&mut column, &lattice);
        assert_eq!(column.terrain_height(4, 4), 31);
        assert_eq!(column.get(4, 40, 4), BlockId(2));
        assert_eq!(column.get(4, SEA_LEVEL, 4), BlockId::AIR);
        assert_eq!(column.rain_height(4, 4), SEA_LEVEL - 1);
    }

    #[test]
    fn test_generation_is_idempotent() {
        let (field, lattice) = field(flat(0.5, 0.8));
        let mut column = ChunkColumn::new(ColumnPos::new(1, 1), MAP_HEIGHT);
        assert!(field.generate(&mut column, &lattice));
        column.set(0, 100, 0, BlockId(9));
        assert!(!field.generate(&mut column, &lattice));
        assert_eq!(column.get(0, 100, 0), BlockId(9));
    }

    #[test]
    fn test_same_seed_same_terrain() {
        let (field_a, lattice_a) = field(flat(0.5, 0.8));
        let (field_b, lattice_b) = field(flat(0.5, 0.8));
        let mut a = ChunkColumn::new(ColumnPos::new(-4, 7), MAP_HEIGHT);
        let mut b = ChunkColumn::new(ColumnPos::new(-4, 7), MAP_HEIGHT);
        field_a.generate(&mut a, &lattice_a);
        field_b.generate(&mut b, &lattice_b);
        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                assert_eq!(a.terrain_height(lx, lz), b.terrain_height(lx, lz));
            }
        }
        assert_eq!(a.count(BlockId(1)), b.count(BlockId(1)));
    }
}
