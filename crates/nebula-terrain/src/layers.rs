//! Soil block layers laid over the top of each column.
//!
//! Layers are picked top to bottom by climate, fertility and height. Each
//! chosen layer consumes its thickness and leaves a colder, less fertile
//! climate for the layer beneath it.

use nebula_voxel::{BlockId, BlockRegistry, CHUNK_SIZE, ChunkColumn};
use serde::{Deserialize, Serialize};

use crate::climate::{ClimateEnvelope, ClimateSample};
use crate::density::TerrainBlocks;
use crate::error::TerrainError;
use crate::lattice::{Channel, LatticeSampler};

/// One soil layer, as loaded from assets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockLayerVariant {
    pub code: String,
    pub block_code: String,
    pub climate: ClimateEnvelope,
    pub min_fertility: f32,
    pub max_fertility: f32,
    /// Height range as fractions of the map height.
    pub min_y: f32,
    pub max_y: f32,
    pub thickness: i32,
}

impl Default for BlockLayerVariant {
    fn default() -> Self {
        Self {
            code: String::new(),
            block_code: String::new(),
            climate: ClimateEnvelope::default(),
            min_fertility: 0.0,
            max_fertility: 1.0,
            min_y: 0.0,
            max_y: 1.0,
            thickness: 1,
        }
    }
}

/// The whole soil layer stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockLayerConfig {
    pub layers: Vec<BlockLayerVariant>,
    /// Upper bound on layers applied per column.
    pub max_layers: u32,
    /// Degrees removed after each applied layer.
    pub temperature_step: f32,
    /// Fertility removed after each applied layer.
    pub fertility_step: f32,
}

impl Default for BlockLayerConfig {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            max_layers: 3,
            temperature_step: 5.0,
            fertility_step: 0.25,
        }
    }
}

#[derive(Clone, Debug)]
struct ResolvedLayer {
    block: BlockId,
    climate: ClimateEnvelope,
    fertility: (f32, f32),
    y_range: (f32, f32),
    thickness: i32,
}

impl ResolvedLayer {
    fn matches(&self, climate: &ClimateSample, fertility: f32, y_fraction: f32) -> bool {
        self.climate.contains(climate)
            && (self.fertility.0..=self.fertility.1).contains(&fertility)
            && (self.y_range.0..=self.y_range.1).contains(&y_fraction)
    }
}

/// Resolved soil layers, ready to apply.
pub struct BlockLayers {
    layers: Vec<ResolvedLayer>,
    max_layers: u32,
    temperature_step: f32,
    fertility_step: f32,
    sea_level: i32,
    map_height: i32,
}

impl BlockLayers {
    /// Resolves every layer's block code. Layers that fail are returned
    /// as errors and left out; the rest still apply.
    pub fn new(
        config: &BlockLayerConfig,
        registry: &BlockRegistry,
        sea_level: i32,
        map_height: i32,
    ) -> (Self, Vec<TerrainError>) {
        let mut errors = Vec::new();
        let mut layers = Vec::new();
        for variant in &config.layers {
            if variant.thickness <= 0 {
                errors.push(TerrainError::InvalidBlockLayer {
                    code: variant.code.clone(),
                    reason: format!("thickness {} must be positive", variant.thickness),
                });
                continue;
            }
            match registry
                .resolve(&variant.block_code)
                .map_err(TerrainError::unresolved(&variant.code))
            {
                Ok(block) => layers.push(ResolvedLayer {
                    block,
                    climate: variant.climate,
                    fertility: (variant.min_fertility, variant.max_fertility),
                    y_range: (variant.min_y, variant.max_y),
                    thickness: variant.thickness,
                }),
                Err(err) => errors.push(err),
            }
        }
        let resolved = Self {
            layers,
            max_layers: config.max_layers,
            temperature_step: config.temperature_step,
            fertility_step: config.fertility_step,
            sea_level,
            map_height,
        };
        (resolved, errors)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Covers every block column of `column`. Returns blocks replaced.
    pub fn apply(&self, column: &mut ChunkColumn, lattice: &impl LatticeSampler, blocks: &TerrainBlocks) -> u32 {
        if self.layers.is_empty() || self.max_layers == 0 {
            return 0;
        }
        let base_x = column.pos().block_x();
        let base_z = column.pos().block_z();
        let mut replaced = 0;

        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let (x, z) = (base_x + lx, base_z + lz);
                let mut y = column.terrain_height(lx, lz);
                let mut climate = lattice
                    .climate_at(x, z)
                    .at_height(y, self.sea_level, self.map_height);
                let mut fertility = lattice.scalar_at(Channel::Forest, x, z) / 255.0;

                for _ in 0..self.max_layers {
                    let y_fraction = y as f32 / self.map_height as f32;
                    let Some(layer) = self
                        .layers
                        .iter()
                        .find(|l| l.matches(&climate, fertility, y_fraction))
                    else {
                        break;
                    };
                    for _ in 0..layer.thickness {
                        if y < 1 {
                            break;
                        }
                        let current = column.get(lx, y, lz);
                        if current != BlockId::AIR && current != blocks.water && current != blocks.mantle {
                            column.set(lx, y, lz, layer.block);
                            replaced += 1;
                        }
                        y -= 1;
                    }
                    climate.temperature -= self.temperature_step;
                    fertility = (fertility - self.fertility_step).max(0.0);
                }
            }
        }
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{LatticeGenerator, ZoneEntry};
    use nebula_voxel::{BlockDef, BlockMaterial, ColumnPos};

    fn registry() -> BlockRegistry {
        let mut registry = BlockRegistry::new();
        for (code, material) in [
            ("rock-granite", BlockMaterial::Stone),
            ("water", BlockMaterial::Liquid),
            ("mantle", BlockMaterial::Mantle),
            ("soil-medium", BlockMaterial::Soil),
            ("gravel", BlockMaterial::Gravel),
        ] {
            registry.register(BlockDef::new(code, material)).unwrap();
        }
        registry
    }

    fn blocks() -> TerrainBlocks {
        TerrainBlocks {
            rock: BlockId(1),
            water: BlockId(2),
            mantle: BlockId(3),
        }
    }

    fn lattice() -> LatticeGenerator {
        let one = vec![ZoneEntry {
            weight: 1.0,
            envelope: ClimateEnvelope::default(),
        }];
        LatticeGenerator::new(1, one.clone(), one, &[])
    }

    fn rock_column(height: i32) -> ChunkColumn {
        let mut column = ChunkColumn::new(ColumnPos::new(0, 0), 64);
        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                for y in 1..=height {
                    column.set(lx, y, lz, BlockId(1));
                }
                column.set_terrain_height(lx, lz, height);
            }
        }
        column
    }

    fn layer(code: &str, block: &str, thickness: i32) -> BlockLayerVariant {
        BlockLayerVariant {
            code: code.into(),
            block_code: block.into(),
            thickness,
            ..Default::default()
        }
    }

    #[test]
    fn test_layers_stack_and_are_bounded() {
        let config = BlockLayerConfig {
            layers: vec![layer("soil", "soil-medium", 2)],
            max_layers: 2,
            ..Default::default()
        };
        let (layers, errors) = BlockLayers::new(&config, &registry(), 30, 64);
        assert!(errors.is_empty());
        let mut column = rock_column(40);
        let replaced = layers.apply(&mut column, &lattice(), &blocks());
        assert_eq!(replaced, 4 * 32 * 32);
        assert_eq!(column.get(5, 40, 5), BlockId(4));
        assert_eq!(column.get(5, 37, 5), BlockId(4));
        assert_eq!(column.get(5, 36, 5), BlockId(1));
    }

    #[test]
    fn test_temperature_step_selects_colder_layer() {
        let warm = BlockLayerVariant {
            climate: ClimateEnvelope {
                min_temp: -100.0,
                ..Default::default()
            },
            ..layer("warm", "soil-medium", 1)
        };
        let config = BlockLayerConfig {
            layers: vec![warm, layer("cold", "gravel", 1)],
            max_layers: 2,
            temperature_step: 500.0,
            ..Default::default()
        };
        let (layers, _) = BlockLayers::new(&config, &registry(), 30, 64);
        let mut column = rock_column(20);
        layers.apply(&mut column, &lattice(), &blocks());
        assert_eq!(column.get(0, 20, 0), BlockId(4));
        assert_eq!(column.get(0, 19, 0), BlockId(5));
    }

    #[test]
    fn test_no_matching_layer_leaves_rock() {
        let config = BlockLayerConfig {
            layers: vec![BlockLayerVariant {
                min_y: 0.9,
                ..layer("peak", "gravel", 3)
            }],
            ..Default::default()
        };
        let (layers, _) = BlockLayers::new(&config, &registry(), 30, 64);
        let mut column = rock_column(20);
        assert_eq!(layers.apply(&mut column, &lattice(), &blocks()), 0);
        assert_eq!(column.get(0, 20, 0), BlockId(1));
    }

    #[test]
    fn test_unresolved_layer_is_skipped() {
        let config = BlockLayerConfig {
            layers: vec![layer("bad", "soil-missing", 1), layer("ok", "gravel", 1)],
            ..Default::default()
        };
        let (layers, errors) = BlockLayers::new(&config, &registry(), 30, 64);
        assert_eq!(layers.len(), 1);
        assert!(matches!(errors[0], TerrainError::UnresolvedBlock { .. }));
    }
}
