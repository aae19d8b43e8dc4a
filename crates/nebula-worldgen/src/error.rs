use nebula_terrain::RegionDataError;
use nebula_voxel::{GenPass, RegistryError};

/// Errors that stop a generation request. Asset problems that only disable
/// one variant are reported through [`crate::AssetReport`] instead.
#[derive(Debug, thiserror::Error)]
pub enum WorldGenError {
    #[error("invalid world settings: {0}")]
    InvalidSettings(String),

    #[error("terrain {role} block is not registered: {source}")]
    MissingTerrainBlock {
        role: &'static str,
        #[source]
        source: RegistryError,
    },

    #[error("failed to read assets {path}: {source}")]
    AssetRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse assets: {0}")]
    AssetParse(String),

    #[error("no usable landform")]
    NoLandforms,

    #[error("column ({x}, {z}) is not loaded")]
    ColumnNotLoaded { x: i32, z: i32 },

    #[error("column ({x}, {z}) cannot run {pass:?} before the previous pass")]
    PassOutOfOrder { x: i32, z: i32, pass: GenPass },

    #[error("column ({x}, {z}) cannot run {pass:?} until its neighbours are ready")]
    NeighborsNotReady { x: i32, z: i32, pass: GenPass },

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    #[error("worker pool stopped answering with {pending} columns outstanding")]
    WorkerTimeout { pending: usize },

    #[error("region data: {0}")]
    Region(#[from] RegionDataError),
}
