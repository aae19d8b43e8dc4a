//! Configuration structs with sensible defaults and RON persistence.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// World shape and generation constants.
    pub worldgen: WorldGenConfig,
    /// Per-structure overrides applied to every chunk request.
    pub tuning: TuningConfig,
    /// Background worker pool.
    pub workers: WorkerConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// World generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldGenConfig {
    /// Root of all determinism.
    pub seed: u64,
    /// World height in blocks.
    pub map_height: i32,
    pub sea_level: i32,
    /// Neighbouring chunks whose deposits may reach into a chunk.
    pub deposit_chunk_range: i32,
    /// Applied to every structure and village chance.
    pub structure_chance_multiplier: f32,
    /// Per-region dungeon probability; replaces the asset value when set.
    pub dungeon_chance: Option<f32>,
    pub dungeon_max_tiles: u32,
    pub dungeon_max_depth: u32,
    /// Chunk columns generated around the origin by the demo, per side.
    pub generate_radius: i32,
}

/// Caller-owned structure tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TuningConfig {
    /// Structure code -> chance multiplier.
    pub chance_multipliers: HashMap<String, f32>,
    /// Structure code -> per-chunk maximum.
    pub max_count_overrides: HashMap<String, u32>,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker thread count (0 = one per core, leaving one for the caller).
    pub threads: usize,
    /// Maximum queued or running columns.
    pub max_in_flight: usize,
    /// Capacity of the finished-column channel.
    pub result_capacity: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log the per-column timing breakdown.
    pub log_column_timings: bool,
}

// --- Default implementations ---

impl Default for WorldGenConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            map_height: 256,
            sea_level: 110,
            deposit_chunk_range: 1,
            structure_chance_multiplier: 1.0,
            dungeon_chance: None,
            dungeon_max_tiles: 24,
            dungeon_max_depth: 8,
            generate_radius: 2,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            max_in_flight: 64,
            result_capacity: 128,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_column_timings: false,
        }
    }
}

impl WorkerConfig {
    /// Resolved thread count, at least one.
    pub fn thread_count(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        num_cpus::get().saturating_sub(1).max(1)
    }
}

// --- Load / Save / Reload ---

/// File name inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Reads `config.ron` from `config_dir`, writing the defaults there first
    /// if the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Wrote default world generation config to {}", path.display());
            return Ok(config);
        }
        let config = read_config(&path)?;
        log::info!("Loaded world generation config from {} (seed {})", path.display(), config.worldgen.seed);
        Ok(config)
    }

    /// Writes the config as pretty RON, replacing the file through a
    /// sibling `.ron.tmp`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ConfigError::Write { path, source }
        };
        std::fs::create_dir_all(config_dir).map_err(write_err(config_dir))?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let text = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Encode)?;

        let path = config_dir.join(CONFIG_FILE);
        let staging = path.with_extension("ron.tmp");
        std::fs::write(&staging, text).map_err(write_err(&staging))?;
        std::fs::rename(&staging, &path).map_err(write_err(&path))?;
        Ok(())
    }

    /// Re-reads the file. `Some` only when something differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_config(&config_dir.join(CONFIG_FILE))?;
        if fresh == *self {
            return Ok(None);
        }
        if fresh.worldgen != self.worldgen {
            log::warn!("World generation settings changed on disk; regions already generated keep the old ones");
        }
        Ok(Some(fresh))
    }

    /// `<platform config dir>/nebula-worldgen`.
    pub fn default_dir() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|d| d.join("nebula-worldgen"))
    }
}
