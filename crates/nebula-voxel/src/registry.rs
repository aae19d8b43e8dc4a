//! Block registry: maps block codes to compact [`BlockId`] values.
//!
//! The registry is built once at world start, before any variant resolves
//! its block lists. Air is always ID 0 so that zero-initialized column memory
//! represents empty space.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Compact identifier stored in every block cell (2 bytes).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockId(pub u16);

impl BlockId {
    pub const AIR: BlockId = BlockId(0);

    pub fn is_air(self) -> bool {
        self.0 == 0
    }
}

/// Coarse material class. World generation only ever asks "is this rock",
/// "is this soil", "is this liquid", so the class is all it needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockMaterial {
    Air,
    Stone,
    Soil,
    Gravel,
    Sand,
    Liquid,
    Ore,
    Mantle,
    Wood,
    Plant,
    Other,
}

impl BlockMaterial {
    /// Solid for terrain purposes (heightmaps, footprint probes).
    pub fn is_solid(self) -> bool {
        !matches!(
            self,
            BlockMaterial::Air | BlockMaterial::Liquid | BlockMaterial::Plant
        )
    }
}

/// Full descriptor for a block type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockDef {
    /// Unique code, e.g. `"rock-granite"` or `"ore-gold-granite"`.
    pub code: String,
    pub material: BlockMaterial,
}

impl BlockDef {
    pub fn new(code: impl Into<String>, material: BlockMaterial) -> Self {
        Self {
            code: code.into(),
            material,
        }
    }
}

/// Errors raised while registering or resolving block codes.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RegistryError {
    /// A block with the same code has already been registered.
    #[error("duplicate block code: {0}")]
    DuplicateCode(String),
    /// All 65 536 slots have been consumed.
    #[error("block registry is full (max 65536 types)")]
    RegistryFull,
    /// A variant referenced a code that no registered block carries.
    #[error("unknown block code: {0}")]
    UnknownCode(String),
    /// A wildcard pattern matched nothing.
    #[error("block pattern matched no blocks: {0}")]
    NoMatch(String),
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps [`BlockId`] → [`BlockDef`] with O(1) lookup in both directions.
#[derive(Debug)]
pub struct BlockRegistry {
    /// Dense array where `index == BlockId.0`.
    blocks: Vec<BlockDef>,
    code_to_id: FxHashMap<String, BlockId>,
}

impl BlockRegistry {
    /// Creates a new registry with `air` pre-registered as ID 0.
    pub fn new() -> Self {
        let mut code_to_id = FxHashMap::default();
        code_to_id.insert("air".to_string(), BlockId::AIR);
        Self {
            blocks: vec![BlockDef::new("air", BlockMaterial::Air)],
            code_to_id,
        }
    }

    /// Registers a block and returns its sequential ID.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateCode`] if the code exists,
    /// [`RegistryError::RegistryFull`] if all IDs are taken.
    pub fn register(&mut self, def: BlockDef) -> Result<BlockId, RegistryError> {
        if self.code_to_id.contains_key(&def.code) {
            return Err(RegistryError::DuplicateCode(def.code));
        }
        if self.blocks.len() > u16::MAX as usize {
            return Err(RegistryError::RegistryFull);
        }

        let id = BlockId(self.blocks.len() as u16);
        self.code_to_id.insert(def.code.clone(), id);
        self.blocks.push(def);
        Ok(id)
    }

    pub fn get(&self, id: BlockId) -> Option<&BlockDef> {
        self.blocks.get(id.0 as usize)
    }

    /// Material of a block. Unknown IDs are treated as air.
    pub fn material(&self, id: BlockId) -> BlockMaterial {
        self.get(id).map_or(BlockMaterial::Air, |def| def.material)
    }

    pub fn is_liquid(&self, id: BlockId) -> bool {
        self.material(id) == BlockMaterial::Liquid
    }

    pub fn is_solid(&self, id: BlockId) -> bool {
        self.material(id).is_solid()
    }

    pub fn lookup(&self, code: &str) -> Option<BlockId> {
        self.code_to_id.get(code).copied()
    }

    /// Resolves an exact code.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownCode`] if nothing is registered under `code`.
    pub fn resolve(&self, code: &str) -> Result<BlockId, RegistryError> {
        self.lookup(code)
            .ok_or_else(|| RegistryError::UnknownCode(code.to_string()))
    }

    /// Resolves a code that may contain `*` wildcards (e.g. `"rock-*"`).
    ///
    /// Returned IDs are sorted ascending so that iteration order does not
    /// depend on hash map layout.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NoMatch`] when the pattern matches no block.
    pub fn resolve_pattern(&self, pattern: &str) -> Result<Vec<BlockId>, RegistryError> {
        if !pattern.contains('*') {
            return self.resolve(pattern).map(|id| vec![id]);
        }

        let mut ids: Vec<BlockId> = self
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, def)| wildcard_match(pattern, &def.code))
            .map(|(i, _)| BlockId(i as u16))
            .collect();
        ids.sort_unstable();

        if ids.is_empty() {
            return Err(RegistryError::NoMatch(pattern.to_string()));
        }
        Ok(ids)
    }

    /// Resolves every entry of `patterns`, concatenated and de-duplicated.
    ///
    /// # Errors
    ///
    /// The first pattern that fails to resolve.
    pub fn resolve_all(&self, patterns: &[String]) -> Result<Vec<BlockId>, RegistryError> {
        let mut ids = Vec::new();
        for pattern in patterns {
            ids.extend(self.resolve_pattern(pattern)?);
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if only air is registered.
    pub fn is_empty(&self) -> bool {
        self.blocks.len() <= 1
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Glob match supporting `*` (any run of characters, possibly empty).
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_ti = 0;

    while ti < t.len() {
        if pi < p.len() && p[pi] != b'*' && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == b'*' {
            star = Some(pi);
            pi += 1;
            star_ti = ti;
        } else if let Some(s) = star {
            pi = s + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
