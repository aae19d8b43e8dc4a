use nebula_voxel::RegistryError;

/// Load-time errors of terrain variants. Each error names the one variant it
/// disables; the caller decides whether that is fatal.
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    #[error("landform '{code}': {reason}")]
    InvalidLandform { code: String, reason: String },

    #[error("rock stratum '{code}': {reason}")]
    InvalidStratum { code: String, reason: String },

    #[error("block layer '{code}': {reason}")]
    InvalidBlockLayer { code: String, reason: String },

    #[error("deposit '{code}': {reason}")]
    InvalidDeposit { code: String, reason: String },

    #[error("variant '{variant}' references an unresolvable block: {source}")]
    UnresolvedBlock {
        variant: String,
        #[source]
        source: RegistryError,
    },
}

impl TerrainError {
    pub(crate) fn unresolved(variant: &str) -> impl FnOnce(RegistryError) -> TerrainError {
        let variant = variant.to_string();
        move |source| TerrainError::UnresolvedBlock { variant, source }
    }
}
