//! World generation assets: every declarative variant the generators load.
//!
//! An [`AssetBundle`] is plain data. It can be read from a RON file or taken
//! from [`AssetBundle::default_assets`], which is the stock content the demo
//! generates with.

use std::path::Path;

use glam::IVec3;
use nebula_structures::{
    DungeonTileVariant, DungeonVariant, Facing, Pathway, Placement, ReplaceMode, SchematicData, VillageBuilding,
    WorldGenStructure, WorldGenVillage,
};
use nebula_terrain::{
    BlockLayerConfig, BlockLayerVariant, ClimateEnvelope, DepositAnchor, DepositVariant, GeologicProvinceVariant,
    LandformVariant, NatFloat, OutputMapping, RockGroupThickness, RockStratumVariant, StrataDirection,
};
use nebula_voxel::{BlockDef, BlockMaterial};
use serde::{Deserialize, Serialize};

use crate::error::WorldGenError;

/// Block codes the density field writes before any other pass runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainBlockCodes {
    pub rock: String,
    pub water: String,
    pub mantle: String,
}

impl Default for TerrainBlockCodes {
    fn default() -> Self {
        Self {
            rock: "rock".into(),
            water: "water".into(),
            mantle: "mantle".into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetBundle {
    /// Registered in order, so IDs follow this list (air is always 0).
    pub blocks: Vec<BlockDef>,
    pub terrain: TerrainBlockCodes,
    pub landforms: Vec<LandformVariant>,
    pub provinces: Vec<GeologicProvinceVariant>,
    pub strata: Vec<RockStratumVariant>,
    pub block_layers: BlockLayerConfig,
    pub deposits: Vec<DepositVariant>,
    pub schematics: Vec<SchematicData>,
    pub structures: Vec<WorldGenStructure>,
    pub villages: Vec<WorldGenVillage>,
    pub dungeons: Vec<DungeonVariant>,
}

/// Non-fatal problems found while loading a bundle. Each entry names one
/// variant that was left out.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssetReport {
    pub warnings: Vec<String>,
}

impl AssetReport {
    pub(crate) fn warn(&mut self, message: impl std::fmt::Display) {
        let message = message.to_string();
        tracing::warn!("asset disabled: {message}");
        self.warnings.push(message);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl AssetBundle {
    /// Parses a bundle from RON text.
    ///
    /// # Errors
    ///
    /// [`WorldGenError::AssetParse`] if the text is not a valid bundle.
    pub fn from_ron(text: &str) -> Result<Self, WorldGenError> {
        ron::from_str(text).map_err(|e| WorldGenError::AssetParse(e.to_string()))
    }

    /// Reads and parses a RON bundle file.
    ///
    /// # Errors
    ///
    /// [`WorldGenError::AssetRead`] if the file cannot be read,
    /// [`WorldGenError::AssetParse`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self, WorldGenError> {
        let text = std::fs::read_to_string(path).map_err(|source| WorldGenError::AssetRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&text)
    }

    /// Names of every ore map referenced by a deposit or one of its children.
    pub fn ore_maps(&self) -> Vec<String> {
        fn collect(variant: &DepositVariant, out: &mut Vec<String>) {
            if let Some(name) = &variant.ore_map
                && !out.contains(name)
            {
                out.push(name.clone());
            }
            for child in &variant.children {
                collect(child, out);
            }
        }
        let mut names = Vec::new();
        for deposit in &self.deposits {
            collect(deposit, &mut names);
        }
        names
    }

    /// Stock content: temperate landforms, three rock types, copper and clay
    /// deposits, a few surface and underground structures, one village and
    /// one crypt dungeon.
    pub fn default_assets() -> Self {
        Self {
            blocks: default_blocks(),
            terrain: TerrainBlockCodes::default(),
            landforms: default_landforms(),
            provinces: default_provinces(),
            strata: vec![
                stratum("rock-granite", "igneous", StrataDirection::BottomUp),
                stratum("rock-basalt", "volcanic", StrataDirection::BottomUp),
                stratum("rock-limestone", "sedimentary", StrataDirection::TopDown),
            ],
            block_layers: default_layers(),
            deposits: default_deposits(),
            schematics: default_schematics(),
            structures: default_structures(),
            villages: vec![WorldGenVillage {
                code: "hamlet".into(),
                buildings: vec![
                    VillageBuilding {
                        schematic: "house".into(),
                        min_count: 2,
                        max_count: 4,
                    },
                    VillageBuilding {
                        schematic: "well".into(),
                        min_count: 0,
                        max_count: 1,
                    },
                ],
                chance: 0.004,
                build_protected: true,
                protection_description: "Hamlet".into(),
                ..Default::default()
            }],
            dungeons: vec![default_crypt()],
        }
    }
}

// ---------------------------------------------------------------------------
// Stock content
// ---------------------------------------------------------------------------

fn default_blocks() -> Vec<BlockDef> {
    use BlockMaterial::*;
    [
        ("mantle", Mantle),
        ("rock", Stone),
        ("rock-granite", Stone),
        ("rock-basalt", Stone),
        ("rock-limestone", Stone),
        ("soil-medium", Soil),
        ("soil-low", Soil),
        ("gravel", Gravel),
        ("sand", Sand),
        ("clay", Soil),
        ("water", Liquid),
        ("ore-copper-granite", Ore),
        ("ore-copper-basalt", Ore),
        ("cobblestone", Stone),
        ("planks", Wood),
        ("meta-connector", Other),
    ]
    .into_iter()
    .map(|(code, material)| BlockDef::new(code, material))
    .collect()
}

fn landform(code: &str, weight: f32, octaves: &[f32], surface: f32, top: f32, roughness: f32) -> LandformVariant {
    LandformVariant {
        code: code.into(),
        weight,
        octaves: octaves.to_vec(),
        y_key_positions: vec![0.0, surface, 1.0],
        y_key_thresholds: vec![-2.0, 0.0, top],
        roughness,
        ..Default::default()
    }
}

fn default_landforms() -> Vec<LandformVariant> {
    vec![
        landform("ocean", 0.3, &[0.3, 0.15], 0.38, 2.0, 0.05),
        landform("plains", 1.0, &[0.35, 0.2, 0.1], 0.46, 2.0, 0.1),
        landform("hills", 0.8, &[0.6, 0.5, 0.3, 0.15], 0.5, 1.5, 0.5),
        LandformVariant {
            climate: ClimateEnvelope {
                max_temp: 25.0,
                ..Default::default()
            },
            ..landform("mountains", 0.4, &[0.9, 0.8, 0.5, 0.3, 0.15], 0.55, 1.2, 0.9)
        },
    ]
}

fn group(rock_group: &str, max_thickness: f32) -> RockGroupThickness {
    RockGroupThickness {
        rock_group: rock_group.into(),
        max_thickness,
    }
}

fn default_provinces() -> Vec<GeologicProvinceVariant> {
    vec![
        GeologicProvinceVariant {
            code: "shield".into(),
            weight: 1.0,
            rock_groups: vec![group("igneous", 60.0), group("sedimentary", 12.0)],
        },
        GeologicProvinceVariant {
            code: "basin".into(),
            weight: 1.0,
            rock_groups: vec![group("sedimentary", 40.0), group("igneous", 20.0)],
        },
        GeologicProvinceVariant {
            code: "volcanic".into(),
            weight: 0.5,
            rock_groups: vec![group("volcanic", 50.0), group("igneous", 20.0)],
        },
    ]
}

fn stratum(block_code: &str, rock_group: &str, direction: StrataDirection) -> RockStratumVariant {
    RockStratumVariant {
        block_code: block_code.into(),
        rock_group: rock_group.into(),
        direction,
    }
}

fn layer(code: &str, block_code: &str, y: (f32, f32), fertility: (f32, f32), thickness: i32) -> BlockLayerVariant {
    BlockLayerVariant {
        code: code.into(),
        block_code: block_code.into(),
        min_y: y.0,
        max_y: y.1,
        min_fertility: fertility.0,
        max_fertility: fertility.1,
        thickness,
        ..Default::default()
    }
}

fn default_layers() -> BlockLayerConfig {
    BlockLayerConfig {
        layers: vec![
            layer("seabed", "gravel", (0.0, 0.42), (0.0, 1.0), 1),
            layer("beach", "sand", (0.42, 0.445), (0.0, 1.0), 2),
            layer("topsoil", "soil-medium", (0.445, 0.75), (0.4, 1.0), 1),
            layer("subsoil", "soil-low", (0.445, 0.75), (0.0, 1.0), 2),
        ],
        ..Default::default()
    }
}

fn default_deposits() -> Vec<DepositVariant> {
    let copper = DepositVariant {
        code: "copper".into(),
        parent_blocks: vec!["rock-granite".into(), "rock-basalt".into()],
        output_by_parent: vec![
            OutputMapping {
                parent: "rock-granite".into(),
                output: "ore-copper-granite".into(),
            },
            OutputMapping {
                parent: "rock-basalt".into(),
                output: "ore-copper-basalt".into(),
            },
        ],
        quantity: NatFloat::uniform(2.0, 1.0),
        radius: NatFloat::uniform(4.0, 1.5),
        thickness: NatFloat::uniform(2.0, 0.5),
        depth: NatFloat::uniform(0.45, 0.25),
        ore_map: Some("copper".into()),
        children: vec![DepositVariant {
            code: "copper-gravel".into(),
            output_block: Some("gravel".into()),
            quantity: NatFloat::uniform(0.6, 0.2),
            radius: NatFloat::uniform(2.0, 0.5),
            thickness: NatFloat::constant(1.0),
            anchor: DepositAnchor::Parent,
            ..Default::default()
        }],
        ..Default::default()
    };
    let clay = DepositVariant {
        code: "clay".into(),
        parent_blocks: vec!["soil-*".into()],
        output_block: Some("clay".into()),
        quantity: NatFloat::uniform(0.4, 0.4),
        radius: NatFloat::uniform(5.0, 2.0),
        thickness: NatFloat::constant(1.0),
        depth: NatFloat::uniform(0.01, 0.005),
        climate: Some(ClimateEnvelope {
            min_rain: 0.45,
            ..Default::default()
        }),
        max_roughness: Some(0.5),
        ..Default::default()
    };
    vec![copper, clay]
}

/// Builds schematic data by asking `cell` for the palette index of every
/// cell, x fastest, then z, then y.
fn schematic(code: &str, size: IVec3, palette: &[&str], cell: impl Fn(IVec3) -> u32) -> SchematicData {
    let mut blocks = Vec::with_capacity((size.x * size.y * size.z) as usize);
    for y in 0..size.y {
        for z in 0..size.z {
            for x in 0..size.x {
                blocks.push(cell(IVec3::new(x, y, z)));
            }
        }
    }
    SchematicData {
        code: code.into(),
        size,
        palette: palette.iter().map(|s| s.to_string()).collect(),
        blocks,
        ..Default::default()
    }
}

fn on_shell(p: IVec3, size: IVec3) -> bool {
    p.cmpeq(IVec3::ZERO).any() || p.cmpeq(size - IVec3::ONE).any()
}

fn default_schematics() -> Vec<SchematicData> {
    const PALETTE: [&str; 5] = ["air", "cobblestone", "planks", "water", "meta-connector"];
    let (air, cobble, planks, water, marker) = (0, 1, 2, 3, 4);

    let well_size = IVec3::new(3, 3, 3);
    let well = schematic("well", well_size, &PALETTE, |p| match p.y {
        0 => cobble,
        1 if p.x == 1 && p.z == 1 => water,
        1 => cobble,
        _ if p.x != 1 && p.z != 1 => planks,
        _ => air,
    });

    let ruin = schematic("ruin-wall", IVec3::new(5, 3, 2), &PALETTE, |p| {
        if p.y == 2 && p.x % 2 == 1 { air } else { cobble }
    });

    let house_size = IVec3::new(5, 4, 5);
    let house = SchematicData {
        replace_mode: ReplaceMode::ReplaceAll,
        ..schematic("house", house_size, &PALETTE, |p| {
            if p.y == 0 {
                cobble
            } else if p.x == 2 && p.z == 0 && p.y <= 2 {
                air
            } else if on_shell(p, house_size) {
                planks
            } else {
                air
            }
        })
    };

    let lookout = SchematicData {
        replace_mode: ReplaceMode::ReplaceAll,
        ..schematic("lookout", IVec3::new(3, 6, 3), &PALETTE, |p| {
            if p.y == 5 || (p.x != 1 && p.z != 1) { planks } else { air }
        })
    };

    let vault_size = IVec3::new(5, 4, 5);
    let vault = SchematicData {
        replace_mode: ReplaceMode::ReplaceAll,
        pathways: vec![Pathway {
            cells: vec![IVec3::new(2, 1, 0), IVec3::new(2, 2, 0)],
            facing: Facing::North,
        }],
        probes: vec![IVec3::new(0, 3, 0), IVec3::new(4, 3, 4), IVec3::new(2, 0, 2)],
        ..schematic("vault", vault_size, &PALETTE, |p| {
            if p.x == 2 && p.z == 0 && (1..=2).contains(&p.y) {
                air
            } else if on_shell(p, vault_size) {
                cobble
            } else {
                air
            }
        })
    };

    // Crypt tiles: hollow cobblestone boxes with one connector per doorway.
    let crossing_size = IVec3::new(7, 5, 7);
    let crossing = SchematicData {
        replace_mode: ReplaceMode::ReplaceAll,
        ..schematic("crypt-crossing", crossing_size, &PALETTE, |p| {
            let door = p.y == 1 && ((p.x == 3 && (p.z == 0 || p.z == 6)) || (p.z == 3 && (p.x == 0 || p.x == 6)));
            if door {
                marker
            } else if on_shell(p, crossing_size) {
                cobble
            } else {
                air
            }
        })
    };

    let hall_size = IVec3::new(3, 4, 7);
    let hall = SchematicData {
        replace_mode: ReplaceMode::ReplaceAll,
        ..schematic("crypt-hall", hall_size, &PALETTE, |p| {
            if p.x == 1 && p.y == 1 && (p.z == 0 || p.z == 6) {
                marker
            } else if on_shell(p, hall_size) {
                cobble
            } else {
                air
            }
        })
    };

    let end_size = IVec3::new(5, 4, 5);
    let end = SchematicData {
        replace_mode: ReplaceMode::ReplaceAll,
        ..schematic("crypt-end", end_size, &PALETTE, |p| {
            if p.x == 2 && p.y == 1 && p.z == 0 {
                marker
            } else if on_shell(p, end_size) {
                cobble
            } else {
                air
            }
        })
    };

    vec![well, ruin, house, lookout, vault, crossing, hall, end]
}

fn default_structures() -> Vec<WorldGenStructure> {
    vec![
        WorldGenStructure {
            code: "well".into(),
            schematics: vec!["well".into()],
            chance: 0.03,
            group: "well".into(),
            min_group_distance: 64,
            ..Default::default()
        },
        WorldGenStructure {
            code: "ruin".into(),
            schematics: vec!["ruin-wall".into()],
            placement: Placement::SurfaceRuin,
            chance: 0.06,
            max_height_difference: 2,
            ..Default::default()
        },
        WorldGenStructure {
            code: "vault".into(),
            schematics: vec!["vault".into()],
            placement: Placement::Underground,
            chance: 0.05,
            underground_depth: NatFloat::uniform(10.0, 4.0),
            ..Default::default()
        },
        WorldGenStructure {
            code: "lookout".into(),
            schematics: vec!["lookout".into()],
            chance: 0.01,
            post_pass: true,
            suppress_trees: true,
            build_protected: true,
            protection_description: "Lookout".into(),
            ..Default::default()
        },
    ]
}

fn tile(code: &str, max_instances: u32) -> DungeonTileVariant {
    DungeonTileVariant {
        code: code.into(),
        schematic: code.into(),
        max_instances,
    }
}

fn default_crypt() -> DungeonVariant {
    DungeonVariant {
        code: "crypt".into(),
        root_tiles: vec![tile("crypt-crossing", 1)],
        tiles: vec![tile("crypt-hall", 8), tile("crypt-crossing", 2), tile("crypt-end", 4)],
        chance: 0.35,
        max_tiles: 16,
        max_depth: 6,
        min_y: 12,
        max_y: 36,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ore_maps_include_children_once() {
        let mut bundle = AssetBundle::default_assets();
        bundle.deposits[1].ore_map = Some("copper".into());
        assert_eq!(bundle.ore_maps(), vec!["copper".to_string()]);
    }

    #[test]
    fn test_default_schematics_have_matching_volume() {
        for data in AssetBundle::default_assets().schematics {
            let volume = (data.size.x * data.size.y * data.size.z) as usize;
            assert_eq!(data.blocks.len(), volume, "{}", data.code);
        }
    }

    #[test]
    fn test_bundle_parses_from_partial_ron() {
        let text = r#"(
            blocks: [(code: "rock", material: Stone), (code: "water", material: Liquid)],
            landforms: [(code: "flat", octaves: [0.5])],
            deposits: [(code: "gold", parent_blocks: ["rock"], output_block: Some("rock"), ore_map: Some("gold"))],
        )"#;
        let bundle = AssetBundle::from_ron(text).unwrap();
        assert_eq!(bundle.blocks.len(), 2);
        assert_eq!(bundle.terrain, TerrainBlockCodes::default());
        assert_eq!(bundle.landforms[0].weight, 1.0);
        assert_eq!(bundle.ore_maps(), vec!["gold".to_string()]);
        assert!(bundle.structures.is_empty());
    }

    #[test]
    fn test_bundle_rejects_malformed_ron() {
        assert!(matches!(
            AssetBundle::from_ron("(blocks: 3)"),
            Err(WorldGenError::AssetParse(_))
        ));
    }
}
