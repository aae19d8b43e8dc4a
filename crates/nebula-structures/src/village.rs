//! Villages: a batch of building schematics laid out on a grid.

use nebula_terrain::{ClimateEnvelope, SeededRandomStream, code_salt};
use serde::{Deserialize, Serialize};

use crate::error::StructureError;
use crate::schematic::{BlockSchematic, SchematicLibrary};
use crate::structure::{MAX_GROUP_DISTANCE, MAX_PLACEMENT_SPAN, all_rotations};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VillageBuilding {
    pub schematic: String,
    pub min_count: u32,
    pub max_count: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldGenVillage {
    pub code: String,
    pub buildings: Vec<VillageBuilding>,
    pub chance: f32,
    pub group: String,
    pub min_group_distance: i32,
    pub climate: ClimateEnvelope,
    /// Distance between grid slot centres.
    pub grid_spacing: i32,
    /// Slots extend this many steps from the centre on each axis.
    pub grid_radius: i32,
    /// The village is dropped unless at least this many buildings fit.
    pub min_buildings: u32,
    pub max_height_difference: i32,
    pub suppress_trees: bool,
    pub suppress_rivulets: bool,
    pub build_protected: bool,
    pub protection_level: i32,
    pub protection_description: String,
}

impl Default for WorldGenVillage {
    fn default() -> Self {
        Self {
            code: String::new(),
            buildings: Vec::new(),
            chance: 0.01,
            group: "village".into(),
            min_group_distance: 256,
            climate: ClimateEnvelope::default(),
            grid_spacing: 12,
            grid_radius: 1,
            min_buildings: 2,
            max_height_difference: 4,
            suppress_trees: true,
            suppress_rivulets: true,
            build_protected: false,
            protection_level: 10,
            protection_description: String::new(),
        }
    }
}

#[derive(Debug)]
pub struct ResolvedBuilding {
    pub schematic: String,
    pub rotations: [BlockSchematic; 4],
    pub min_count: u32,
    pub max_count: u32,
}

#[derive(Debug)]
pub struct ResolvedVillage {
    pub def: WorldGenVillage,
    pub buildings: Vec<ResolvedBuilding>,
    pub salt: u64,
}

impl ResolvedVillage {
    /// # Errors
    ///
    /// [`StructureError::MissingSchematic`] for an unknown building schematic,
    /// [`StructureError::InvalidStructure`] for a village with no buildings,
    /// a non-positive grid spacing, inverted building counts, a group
    /// distance above [`MAX_GROUP_DISTANCE`] or a layout wider than
    /// [`MAX_PLACEMENT_SPAN`].
    ///
    /// Building counts are capped at the number of grid slots.
    pub fn resolve(def: &WorldGenVillage, library: &SchematicLibrary) -> Result<Self, StructureError> {
        let invalid = |reason: &str| StructureError::InvalidStructure {
            code: def.code.clone(),
            reason: reason.to_string(),
        };
        if def.buildings.is_empty() {
            return Err(invalid("village has no buildings"));
        }
        if def.grid_spacing <= 0 || def.grid_radius < 0 {
            return Err(invalid("grid spacing must be positive"));
        }
        if def.min_group_distance > MAX_GROUP_DISTANCE {
            return Err(invalid(&format!("group distance is above {MAX_GROUP_DISTANCE}")));
        }
        let side = (def.grid_radius as u32).saturating_mul(2).saturating_add(1);
        let slots = side.saturating_mul(side);
        let mut buildings = Vec::with_capacity(def.buildings.len());
        for building in &def.buildings {
            if building.min_count > building.max_count {
                return Err(invalid("building min_count exceeds max_count"));
            }
            let schematic = library
                .get(&building.schematic)
                .ok_or_else(|| StructureError::MissingSchematic {
                    code: def.code.clone(),
                    schematic: building.schematic.clone(),
                })?;
            buildings.push(ResolvedBuilding {
                schematic: building.schematic.clone(),
                rotations: all_rotations(schematic),
                min_count: building.min_count.min(slots),
                max_count: building.max_count.min(slots),
            });
        }
        let village = Self {
            def: def.clone(),
            buildings,
            salt: code_salt(&def.code),
        };
        let span = village.span();
        if span > MAX_PLACEMENT_SPAN {
            return Err(invalid(&format!("layout spans {span} blocks, more than {MAX_PLACEMENT_SPAN}")));
        }
        Ok(village)
    }

    pub fn code(&self) -> &str {
        &self.def.code
    }

    /// Largest building side in any rotation.
    pub fn building_side(&self) -> i32 {
        self.buildings
            .iter()
            .map(|b| b.rotations[0].size.x.max(b.rotations[0].size.z))
            .max()
            .unwrap_or(0)
    }

    /// Distance from the centre to the outermost slot centre on each axis.
    pub fn slot_reach(&self) -> i32 {
        self.def.grid_radius.saturating_mul(self.def.grid_spacing)
    }

    /// Side of the xz square centred on the village centre that holds every
    /// building it may place.
    pub fn span(&self) -> i32 {
        self.slot_reach().saturating_mul(2).saturating_add(self.building_side())
    }

    /// Buildings of one kind to place: `min_count` plus a roll over the rest.
    pub fn roll_count(&self, building: usize, rng: &mut SeededRandomStream) -> u32 {
        let b = &self.buildings[building];
        let extra = b.max_count.saturating_sub(b.min_count).saturating_add(1);
        b.min_count + rng.next_int(extra)
    }

    /// Grid slot offsets from the village centre, row by row.
    pub fn slot_offsets(&self) -> Vec<(i32, i32)> {
        let r = self.def.grid_radius;
        let step = self.def.grid_spacing;
        (-r..=r)
            .flat_map(|gz| (-r..=r).map(move |gx| (gx * step, gz * step)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    #[test]
    fn test_village_resolution() {
        let mut library = SchematicLibrary::new();
        library.insert(BlockSchematic::new("house", IVec3::new(5, 4, 5)));
        let mut def = WorldGenVillage {
            code: "hamlet".into(),
            buildings: vec![VillageBuilding {
                schematic: "house".into(),
                min_count: 1,
                max_count: 3,
            }],
            ..Default::default()
        };
        let village = ResolvedVillage::resolve(&def, &library).unwrap();
        assert_eq!(village.slot_offsets().len(), 9);
        assert!(village.slot_offsets().contains(&(-12, 12)));

        assert_eq!(village.span(), 29);

        def.buildings[0].schematic = "barn".into();
        assert!(matches!(
            ResolvedVillage::resolve(&def, &library),
            Err(StructureError::MissingSchematic { .. })
        ));
    }

    #[test]
    fn test_building_counts_cannot_overflow() {
        let mut library = SchematicLibrary::new();
        library.insert(BlockSchematic::new("hut", IVec3::new(3, 3, 3)));
        let def = WorldGenVillage {
            code: "sprawl".into(),
            buildings: vec![VillageBuilding {
                schematic: "hut".into(),
                min_count: 0,
                max_count: u32::MAX,
            }],
            ..Default::default()
        };
        let village = ResolvedVillage::resolve(&def, &library).unwrap();
        assert_eq!(village.buildings[0].max_count, 9);

        let mut rng = nebula_terrain::SeededRandomStream::new(1);
        for _ in 0..32 {
            assert!(village.roll_count(0, &mut rng) <= 9);
        }
    }

    #[test]
    fn test_layout_wider_than_a_column_is_rejected() {
        let mut library = SchematicLibrary::new();
        library.insert(BlockSchematic::new("hall", IVec3::new(9, 3, 9)));
        let def = WorldGenVillage {
            code: "town".into(),
            buildings: vec![VillageBuilding {
                schematic: "hall".into(),
                min_count: 1,
                max_count: 2,
            }],
            ..Default::default()
        };
        assert!(matches!(
            ResolvedVillage::resolve(&def, &library),
            Err(StructureError::InvalidStructure { .. })
        ));
    }
}
