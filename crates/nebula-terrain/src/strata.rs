//! Rock strata: replaces generic rock with specific rock types by depth.
//!
//! Each stratum belongs to a rock group. A geologic province gives every
//! group a maximum thickness; the thickness actually laid down at a column
//! is the province-weighted maximum scaled by the stratum's own
//! domain-warped noise.

use nebula_voxel::{BlockId, BlockRegistry, CHUNK_SIZE, ChunkColumn};
use serde::{Deserialize, Serialize};

use crate::density::TerrainBlocks;
use crate::error::TerrainError;
use crate::layers::BlockLayers;
use crate::lattice::{Channel, LatticeSampler, ZoneEntry};
use crate::climate::ClimateEnvelope;
use crate::octave::{OctaveNoise, WarpedNoise};
use crate::random::{code_salt, salted_seed};

/// Noise values below this leave no stratum at all.
const STRATUM_CUTOFF: f64 = 0.3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrataDirection {
    /// Laid down from the surface downwards.
    #[default]
    TopDown,
    /// Laid down from the mantle upwards.
    BottomUp,
}

/// One rock stratum, as loaded from assets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RockStratumVariant {
    /// Block code of the rock, e.g. `"rock-granite"`.
    pub block_code: String,
    /// Rock group the province thickness is looked up by.
    pub rock_group: String,
    pub direction: StrataDirection,
}

/// Maximum thickness of a rock group inside a province.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RockGroupThickness {
    pub rock_group: String,
    pub max_thickness: f32,
}

/// A geologic province, as loaded from assets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeologicProvinceVariant {
    pub code: String,
    pub weight: f32,
    pub rock_groups: Vec<RockGroupThickness>,
}

impl Default for GeologicProvinceVariant {
    fn default() -> Self {
        Self {
            code: String::new(),
            weight: 1.0,
            rock_groups: Vec::new(),
        }
    }
}

impl GeologicProvinceVariant {
    pub fn zone_entry(&self) -> ZoneEntry {
        ZoneEntry {
            weight: self.weight,
            envelope: ClimateEnvelope::default(),
        }
    }

    fn max_thickness(&self, group: &str) -> f32 {
        self.rock_groups
            .iter()
            .find(|g| g.rock_group == group)
            .map_or(0.0, |g| g.max_thickness)
    }
}

struct Stratum {
    block: BlockId,
    direction: StrataDirection,
    /// Indexed by province.
    province_thickness: Vec<f32>,
    noise: WarpedNoise,
}

/// Counts returned by [`RockStrataAssigner::assign`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StrataReport {
    pub strata_blocks: u32,
    pub soil_blocks: u32,
}

/// Lays rock strata and then soil layers into a terrain column.
pub struct RockStrataAssigner {
    strata: Vec<Stratum>,
    layers: BlockLayers,
    blocks: TerrainBlocks,
}

impl RockStrataAssigner {
    /// Resolves every stratum. Strata that fail to resolve are returned as
    /// errors and left out.
    pub fn new(
        seed: u64,
        strata: &[RockStratumVariant],
        provinces: &[GeologicProvinceVariant],
        layers: BlockLayers,
        registry: &BlockRegistry,
        blocks: TerrainBlocks,
    ) -> (Self, Vec<TerrainError>) {
        let mut errors = Vec::new();
        let mut resolved = Vec::new();

        for (i, variant) in strata.iter().enumerate() {
            let block = match registry
                .resolve(&variant.block_code)
                .map_err(TerrainError::unresolved(&variant.block_code))
            {
                Ok(block) => block,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };
            if block == blocks.rock {
                errors.push(TerrainError::InvalidStratum {
                    code: variant.block_code.clone(),
                    reason: "stratum cannot be the generic rock it replaces".into(),
                });
                continue;
            }
            let salt = salted_seed(code_salt("strata"), i as u64 ^ code_salt(&variant.block_code));
            let base = OctaveNoise::fbm(seed, salt, 3, 1.0, 1.0 / 256.0);
            resolved.push(Stratum {
                block,
                direction: variant.direction,
                province_thickness: provinces
                    .iter()
                    .map(|p| p.max_thickness(&variant.rock_group))
                    .collect(),
                noise: WarpedNoise::new(base, seed, salt, 1.0 / 128.0, 24.0),
            });
        }

        (
            Self {
                strata: resolved,
                layers,
                blocks,
            },
            errors,
        )
    }

    pub fn strata_count(&self) -> usize {
        self.strata.len()
    }

    /// Thickness of every stratum at world column `(x, z)`.
    pub fn thicknesses_at(&self, lattice: &impl LatticeSampler, x: i32, z: i32) -> Vec<f32> {
        let weights = lattice.weights_at(Channel::Province, x, z);
        self.strata
            .iter()
            .map(|stratum| {
                let max: f32 = weights
                    .iter()
                    .map(|&(p, w)| stratum.province_thickness.get(p).copied().unwrap_or(0.0) * w)
                    .sum();
                let n = stratum.noise.sample_unit(x as f64, z as f64);
                let scale = ((n - STRATUM_CUTOFF) / (1.0 - STRATUM_CUTOFF)).max(0.0);
                max * scale as f32
            })
            .collect()
    }

    /// Replaces generic rock in every block column, then applies soil layers.
    pub fn assign(&self, column: &mut ChunkColumn, lattice: &impl LatticeSampler) -> StrataReport {
        let base_x = column.pos().block_x();
        let base_z = column.pos().block_z();
        let mut report = StrataReport::default();

        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let thickness = self.thicknesses_at(lattice, base_x + lx, base_z + lz);
                let top = column.terrain_height(lx, lz);
                report.strata_blocks += self.lay(column, lx, lz, &thickness, StrataDirection::TopDown, top);
                report.strata_blocks += self.lay(column, lx, lz, &thickness, StrataDirection::BottomUp, top);
            }
        }

        report.soil_blocks = self.layers.apply(column, lattice, &self.blocks);
        report
    }

    fn lay(
        &self,
        column: &mut ChunkColumn,
        lx: i32,
        lz: i32,
        thickness: &[f32],
        direction: StrataDirection,
        top: i32,
    ) -> u32 {
        let mut order = self
            .strata
            .iter()
            .zip(thickness)
            .filter(|(s, _)| s.direction == direction);
        let Some((first, &first_thickness)) = order.next() else {
            return 0;
        };
        let mut current = first;
        let mut remaining = first_thickness;
        let mut replaced = 0;

        let ys: Box<dyn Iterator<Item = i32>> = match direction {
            StrataDirection::TopDown => Box::new((1..=top).rev()),
            StrataDirection::BottomUp => Box::new(1..=top),
        };
        for y in ys {
            if column.get(lx, y, lz) != self.blocks.rock {
                continue;
            }
            while remaining < 1.0 {
                match order.next() {
                    Some((next, &t)) => {
                        current = next;
                        remaining = t;
                    }
                    None => return replaced,
                }
            }
            column.set(lx, y, lz, current.block);
            remaining -= 1.0;
            replaced += 1;
        }
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::BlockLayerConfig;
    use crate::lattice::LatticeGenerator;
    use nebula_voxel::{BlockDef, BlockMaterial, ColumnPos};

    const GRANITE: BlockId = BlockId(4);
    const BASALT: BlockId = BlockId(5);

    fn registry() -> BlockRegistry {
        let mut registry = BlockRegistry::new();
        for (code, material) in [
            ("rock-generic", BlockMaterial::Stone),
            ("water", BlockMaterial::Liquid),
            ("mantle", BlockMaterial::Mantle),
            ("rock-granite", BlockMaterial::Stone),
            ("rock-basalt", BlockMaterial::Stone),
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

    fn province(groups: &[(&str, f32)]) -> GeologicProvinceVariant {
        GeologicProvinceVariant {
            code: "shield".into(),
            weight: 1.0,
            rock_groups: groups
                .iter()
                .map(|&(g, t)| RockGroupThickness {
                    rock_group: g.into(),
                    max_thickness: t,
                })
                .collect(),
        }
    }

    fn assigner(strata: &[RockStratumVariant], provinces: &[GeologicProvinceVariant]) -> RockStrataAssigner {
        let registry = registry();
        let (layers, _) = BlockLayers::new(&BlockLayerConfig::default(), &registry, 30, 64);
        let (assigner, errors) = RockStrataAssigner::new(4, strata, provinces, layers, &registry, blocks());
        assert!(errors.is_empty(), "{errors:?}");
        assigner
    }

    fn lattice(provinces: &[GeologicProvinceVariant]) -> LatticeGenerator {
        let landforms = vec![ZoneEntry {
            weight: 1.0,
            envelope: ClimateEnvelope::default(),
        }];
        LatticeGenerator::new(4, landforms, provinces.iter().map(|p| p.zone_entry()).collect(), &[])
    }

    fn rock_column(height: i32) -> ChunkColumn {
        let mut column = ChunkColumn::new(ColumnPos::new(2, 2), 64);
        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                column.set(lx, 0, lz, BlockId(3));
                for y in 1..=height {
                    column.set(lx, y, lz, BlockId(1));
                }
                column.set_terrain_height(lx, lz, height);
            }
        }
        column
    }

    fn stratum(code: &str, group: &str, direction: StrataDirection) -> RockStratumVariant {
        RockStratumVariant {
            block_code: code.into(),
            rock_group: group.into(),
            direction,
        }
    }

    #[test]
    fn test_strata_thickness_is_bounded_by_province() {
        let provinces = [province(&[("igneous", 6.0)])];
        let assigner = assigner(&[stratum("rock-granite", "igneous", StrataDirection::TopDown)], &provinces);
        let lattice = lattice(&provinces);
        let mut column = rock_column(40);
        assigner.assign(&mut column, &lattice);

        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let granite = (1..=40).filter(|&y| column.get(lx, y, lz) == GRANITE).count();
                assert!(granite <= 6, "column ({lx}, {lz}) has {granite} granite blocks");
                // Top-down strata start at the surface.
                if granite > 0 {
                    assert_eq!(column.get(lx, 40, lz), GRANITE);
                }
            }
        }
    }

    #[test]
    fn test_missing_group_leaves_rock_unchanged() {
        let provinces = [province(&[("igneous", 6.0)])];
        let assigner = assigner(&[stratum("rock-basalt", "volcanic", StrataDirection::TopDown)], &provinces);
        let lattice = lattice(&provinces);
        let mut column = rock_column(20);
        let report = assigner.assign(&mut column, &lattice);
        assert_eq!(report.strata_blocks, 0);
        assert_eq!(column.count(BlockId(1)), 20 * 32 * 32);
    }

    #[test]
    fn test_bottom_up_starts_above_mantle() {
        let provinces = [province(&[("volcanic", 200.0)])];
        let assigner = assigner(&[stratum("rock-basalt", "volcanic", StrataDirection::BottomUp)], &provinces);
        let lattice = lattice(&provinces);
        let mut column = rock_column(30);
        assigner.assign(&mut column, &lattice);
        let thickness = assigner.thicknesses_at(&lattice, 2 * 32, 2 * 32);
        if thickness[0] >= 1.0 {
            assert_eq!(column.get(0, 1, 0), BASALT);
        }
        assert_eq!(column.get(0, 0, 0), BlockId(3));
    }

    #[test]
    fn test_generic_rock_stratum_rejected() {
        let registry = registry();
        let (layers, _) = BlockLayers::new(&BlockLayerConfig::default(), &registry, 30, 64);
        let (assigner, errors) = RockStrataAssigner::new(
            1,
            &[stratum("rock-generic", "any", StrataDirection::TopDown)],
            &[province(&[])],
            layers,
            &registry,
            blocks(),
        );
        assert_eq!(assigner.strata_count(), 0);
        assert!(matches!(errors[0], TerrainError::InvalidStratum { .. }));
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let provinces = [province(&[("igneous", 10.0), ("sedimentary", 8.0)])];
        let strata = [
            stratum("rock-granite", "igneous", StrataDirection::TopDown),
            stratum("rock-basalt", "sedimentary", StrataDirection::TopDown),
        ];
        let a_assigner = assigner(&strata, &provinces);
        let b_assigner = assigner(&strata, &provinces);
        let lattice = lattice(&provinces);
        let mut a = rock_column(40);
        let mut b = rock_column(40);
        assert_eq!(a_assigner.assign(&mut a, &lattice), b_assigner.assign(&mut b, &lattice));
        assert_eq!(a.count(GRANITE), b.count(GRANITE));
        assert_eq!(a.count(BASALT), b.count(BASALT));
    }
}
