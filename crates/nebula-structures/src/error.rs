use nebula_voxel::RegistryError;

/// Load-time errors of schematics, structures and dungeons. Each names the
/// one asset it disables.
#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    #[error("schematic '{schematic}' uses unresolvable block '{code}': {source}")]
    UnresolvedBlock {
        schematic: String,
        code: String,
        #[source]
        source: RegistryError,
    },

    #[error("schematic '{code}': {reason}")]
    InvalidSchematic { code: String, reason: String },

    #[error("structure '{code}' references missing schematic '{schematic}'")]
    MissingSchematic { code: String, schematic: String },

    #[error("structure '{code}': {reason}")]
    InvalidStructure { code: String, reason: String },

    #[error("dungeon '{code}': {reason}")]
    InvalidDungeon { code: String, reason: String },

    #[error("chance multiplier {multiplier} for {scope} must be finite and within 0..={max}")]
    InvalidTuning { scope: String, multiplier: f32, max: f32 },
}
