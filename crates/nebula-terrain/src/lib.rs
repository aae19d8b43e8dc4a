//! Procedural terrain: seeded random streams, region lattice fields, the
//! landform-weighted density field, rock strata, soil layers and mineral
//! deposits.

mod climate;
mod density;
mod deposit;
mod error;
mod landform;
mod layers;
mod lattice;
mod natfloat;
mod octave;
mod random;
mod region;
mod strata;

pub use climate::{ClimateEnvelope, ClimateSample};
pub use density::{HORIZONTAL_STRIDE, TerrainBlocks, TerrainDensityField, VERTICAL_STRIDE};
pub use deposit::{
    DepositAnchor, DepositPlacement, DepositPlacer, DepositReport, DepositVariant, OutputMapping,
    ResolvedDeposit,
};
pub use error::TerrainError;
pub use landform::{BlendedLandform, Landform, LandformVariant, TERRAIN_OCTAVES, blended_roughness};
pub use layers::{BlockLayerConfig, BlockLayerVariant, BlockLayers};
pub use lattice::{
    CellPoint, Channel, IntDataMap2D, LatticeGenerator, LatticeSampler, REGION_CHUNKS, REGION_SIZE,
    RegionLattice, ZoneEntry,
};
pub use natfloat::{Distribution, NatFloat};
pub use octave::{OctaveNoise, WarpedNoise, dead_zone};
pub use random::{
    RngState, SeededRandomStream, code_salt, mix64, position_seed, position_seed_3d, salted_seed,
};
pub use region::{
    GeneratedStructure, MapRegion, PersistedRegion, REGION_FORMAT_VERSION, RegionCache,
    RegionDataError, RegionPos, decode_versioned, encode_versioned,
};
pub use strata::{
    GeologicProvinceVariant, RockGroupThickness, RockStrataAssigner, RockStratumVariant,
    StrataDirection, StrataReport,
};
