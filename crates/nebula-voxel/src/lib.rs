//! Block registry, chunk columns and the block access seam used by world generation.

pub mod accessor;
pub mod column;
pub mod registry;

pub use accessor::BlockAccessor;
pub use column::{CHUNK_AREA, CHUNK_SIZE, ChunkColumn, ColumnPos, ColumnStore, GenPass};
pub use registry::{BlockDef, BlockId, BlockMaterial, BlockRegistry, RegistryError, wildcard_match};
