//! Configuration for world generation runs.
//!
//! Settings persist to disk as RON files. CLI overrides come from clap, and
//! missing or unknown fields keep older and newer files loadable.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE, Config, DebugConfig, TuningConfig, WorkerConfig, WorldGenConfig};
pub use error::ConfigError;
