//! Structure generation: schematics, surface and underground structures,
//! villages, protection claims and tiled dungeons.

pub mod claims;
pub mod dungeon;
pub mod error;
pub mod placement;
pub mod schematic;
pub mod structure;
pub mod village;

#[cfg(test)]
mod test_support;

pub use claims::LandClaim;
pub use dungeon::{
    Connector, DungeonPlaceTask, DungeonReport, DungeonTileVariant, DungeonVariant, TilePlaceTask,
    TiledDungeonGenerator,
};
pub use error::StructureError;
pub use placement::{
    PlacedStructure, PlacementContext, PlacementPass, PlacementReport, StructurePlacementEngine, StructureTuning,
};
pub use schematic::{BlockSchematic, Facing, Pathway, ReplaceMode, Rotation, SchematicData, SchematicLibrary};
pub use structure::{Placement, ResolvedStructure, WorldGenStructure};
pub use village::{ResolvedVillage, VillageBuilding, WorldGenVillage};
