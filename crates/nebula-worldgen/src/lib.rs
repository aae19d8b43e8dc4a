//! World generation driver: loads assets, resolves every generator for one
//! seed, and runs the column passes in order, optionally with the terrain
//! pass spread over a worker pool.

pub mod assets;
pub mod context;
pub mod error;
pub mod listeners;
pub mod pipeline;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use assets::{AssetBundle, AssetReport, TerrainBlockCodes};
pub use context::{GenerationContext, GenerationStats, square};
pub use error::WorldGenError;
pub use listeners::{ColumnPassListener, GenerationListeners, StructureListener};
pub use pipeline::TerrainPipeline;
pub use worker::{AsyncColumnGenerator, ColumnTask, GeneratedColumn};
