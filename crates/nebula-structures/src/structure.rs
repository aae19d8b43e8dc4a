//! Declarative structure definitions and their resolved form.

use nebula_terrain::{ClimateEnvelope, NatFloat, code_salt};
use nebula_voxel::CHUNK_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::StructureError;
use crate::schematic::{BlockSchematic, Rotation, SchematicLibrary};

/// Where a structure goes relative to the terrain surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    #[default]
    Surface,
    /// Surface placement with looser slope tolerance, partially buried.
    SurfaceRuin,
    Underground,
}

/// Slope tolerance multiplier for ruins.
pub const RUIN_TOLERANCE_FACTOR: i32 = 2;

/// Underground pathways look at most this far for an air pocket.
pub const MAX_PATHWAY_DISTANCE: i32 = 3;

/// Widest xz span a placement may read or write. A structure touching a
/// chunk column then stays within that column's eight neighbours.
pub const MAX_PLACEMENT_SPAN: i32 = CHUNK_SIZE;

/// Largest `min_group_distance` a structure or village may ask for.
pub const MAX_GROUP_DISTANCE: i32 = 1024;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldGenStructure {
    pub code: String,
    /// Schematic codes; one is picked per trial.
    pub schematics: Vec<String>,
    pub placement: Placement,
    /// Trials per chunk. Values above 1 give a guaranteed base count plus a
    /// probabilistic remainder.
    pub chance: f32,
    /// Upper bound on placements per chunk.
    pub max_count: u32,
    pub group: String,
    /// Minimum xz distance between centres of structures in the same group.
    pub min_group_distance: i32,
    pub climate: ClimateEnvelope,
    /// Largest allowed height spread across footprint corners and centre.
    pub max_height_difference: i32,
    /// How far ruins sink into the ground.
    pub burial_offset: i32,
    /// Blocks between the surface and the top of an underground structure.
    pub underground_depth: NatFloat,
    pub suppress_trees: bool,
    pub suppress_rivulets: bool,
    pub build_protected: bool,
    pub protection_level: i32,
    pub protection_description: String,
    /// Runs in the decoration pass instead of terrain features.
    pub post_pass: bool,
}

impl Default for WorldGenStructure {
    fn default() -> Self {
        Self {
            code: String::new(),
            schematics: Vec::new(),
            placement: Placement::Surface,
            chance: 0.05,
            max_count: 1,
            group: String::new(),
            min_group_distance: 0,
            climate: ClimateEnvelope::default(),
            max_height_difference: 3,
            burial_offset: 2,
            underground_depth: NatFloat::uniform(16.0, 8.0),
            suppress_trees: false,
            suppress_rivulets: false,
            build_protected: false,
            protection_level: 10,
            protection_description: String::new(),
            post_pass: false,
        }
    }
}

/// A structure whose schematics are resolved in all four rotations.
#[derive(Debug)]
pub struct ResolvedStructure {
    pub def: WorldGenStructure,
    /// `rotations[i][r]` is schematic `i` turned by `Rotation::ALL[r]`.
    pub rotations: Vec<[BlockSchematic; 4]>,
    pub salt: u64,
}

impl ResolvedStructure {
    /// # Errors
    ///
    /// [`StructureError::MissingSchematic`] for a schematic code not in the
    /// library, [`StructureError::InvalidStructure`] for an empty schematic
    /// list, a negative chance, a group distance above
    /// [`MAX_GROUP_DISTANCE`] or a schematic wider than [`MAX_PLACEMENT_SPAN`].
    pub fn resolve(def: &WorldGenStructure, library: &SchematicLibrary) -> Result<Self, StructureError> {
        if def.schematics.is_empty() {
            return Err(StructureError::InvalidStructure {
                code: def.code.clone(),
                reason: "no schematics".into(),
            });
        }
        if def.chance.is_nan() || def.chance < 0.0 {
            return Err(StructureError::InvalidStructure {
                code: def.code.clone(),
                reason: format!("chance {} is negative", def.chance),
            });
        }
        if def.min_group_distance > MAX_GROUP_DISTANCE {
            return Err(StructureError::InvalidStructure {
                code: def.code.clone(),
                reason: format!(
                    "group distance {} is above {MAX_GROUP_DISTANCE}",
                    def.min_group_distance
                ),
            });
        }
        let rotations = def
            .schematics
            .iter()
            .map(|code| {
                library
                    .get(code)
                    .map(all_rotations)
                    .ok_or_else(|| StructureError::MissingSchematic {
                        code: def.code.clone(),
                        schematic: code.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let resolved = Self {
            def: def.clone(),
            rotations,
            salt: code_salt(&def.code),
        };
        for index in 0..resolved.rotations.len() {
            let span = resolved.span(index);
            if span > MAX_PLACEMENT_SPAN {
                return Err(StructureError::InvalidStructure {
                    code: def.code.clone(),
                    reason: format!(
                        "schematic '{}' spans {span} blocks, more than {MAX_PLACEMENT_SPAN}",
                        def.schematics[index]
                    ),
                });
            }
        }
        Ok(resolved)
    }

    pub fn code(&self) -> &str {
        &self.def.code
    }

    /// Side of the xz square centred on a trial position that holds every
    /// block schematic `index` may read or write, in any rotation.
    pub fn span(&self, index: usize) -> i32 {
        let schematic = &self.rotations[index][0];
        let side = schematic.size.x.max(schematic.size.z);
        let underground = self.def.placement == Placement::Underground;
        if underground && !schematic.pathways.is_empty() {
            // Corridor cells plus the air cell checked behind the wall.
            side + 2 * (MAX_PATHWAY_DISTANCE + 1)
        } else {
            side
        }
    }
}

pub(crate) fn all_rotations(schematic: &BlockSchematic) -> [BlockSchematic; 4] {
    Rotation::ALL.map(|r| schematic.rotated(r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    #[test]
    fn test_resolve_missing_schematic() {
        let def = WorldGenStructure {
            code: "tower".into(),
            schematics: vec!["tower-a".into()],
            ..Default::default()
        };
        match ResolvedStructure::resolve(&def, &SchematicLibrary::new()) {
            Err(StructureError::MissingSchematic { schematic, .. }) => assert_eq!(schematic, "tower-a"),
            other => panic!("expected missing schematic, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_precomputes_rotations() {
        let mut library = SchematicLibrary::new();
        library.insert(BlockSchematic::new("hut", IVec3::new(3, 2, 5)));
        let def = WorldGenStructure {
            code: "hut".into(),
            schematics: vec!["hut".into()],
            ..Default::default()
        };
        let resolved = ResolvedStructure::resolve(&def, &library).unwrap();
        assert_eq!(resolved.rotations.len(), 1);
        assert_eq!(resolved.rotations[0][1].size, IVec3::new(5, 2, 3));
        assert_eq!(resolved.rotations[0][2].size, IVec3::new(3, 2, 5));
    }

    #[test]
    fn test_schematic_wider_than_a_column_is_rejected() {
        let mut library = SchematicLibrary::new();
        library.insert(BlockSchematic::new("keep", IVec3::new(MAX_PLACEMENT_SPAN + 1, 4, 4)));
        let def = WorldGenStructure {
            code: "keep".into(),
            schematics: vec!["keep".into()],
            ..Default::default()
        };
        assert!(matches!(
            ResolvedStructure::resolve(&def, &library),
            Err(StructureError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn test_group_distance_is_bounded() {
        let mut library = SchematicLibrary::new();
        library.insert(BlockSchematic::new("well", IVec3::new(3, 2, 3)));
        let def = WorldGenStructure {
            code: "well".into(),
            schematics: vec!["well".into()],
            group: "wells".into(),
            min_group_distance: MAX_GROUP_DISTANCE + 1,
            ..Default::default()
        };
        assert!(matches!(
            ResolvedStructure::resolve(&def, &library),
            Err(StructureError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn test_pathways_widen_the_span() {
        use crate::schematic::{Facing, Pathway};

        let mut library = SchematicLibrary::new();
        let mut vault = BlockSchematic::new("vault", IVec3::new(5, 4, 3));
        vault.pathways.push(Pathway {
            cells: vec![IVec3::new(2, 1, 0)],
            facing: Facing::North,
        });
        library.insert(vault);
        let mut def = WorldGenStructure {
            code: "vault".into(),
            schematics: vec!["vault".into()],
            ..Default::default()
        };
        assert_eq!(ResolvedStructure::resolve(&def, &library).unwrap().span(0), 5);
        def.placement = Placement::Underground;
        assert_eq!(ResolvedStructure::resolve(&def, &library).unwrap().span(0), 13);
    }

    #[test]
    fn test_structure_defaults_from_ron_like_partial() {
        let def: WorldGenStructure = serde_json::from_str(r#"{"code":"well","chance":1.5}"#).unwrap();
        assert_eq!(def.code, "well");
        assert_eq!(def.max_count, 1);
        assert_eq!(def.placement, Placement::Surface);
    }
}
