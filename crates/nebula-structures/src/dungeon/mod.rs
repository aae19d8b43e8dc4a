//! Tiled dungeons: connector-matched tile instances, planned per region and
//! realized chunk by chunk.

mod generator;
mod tasks;
mod tile;

pub use generator::{DungeonReport, DungeonVariant, ResolvedDungeon, TiledDungeonGenerator};
pub use tasks::{ClaimedTile, DUNGEON_DATA_KEY, Doorway, DungeonPlaceTask, RegionDungeons, TilePlaceTask};
pub use tile::{
    ANY_TAG, CONNECTOR_MARKER, Connector, ConnectorScan, DungeonTile, DungeonTileVariant, TrimFlags, apply_trim,
    extract_connectors, tags_match,
};
