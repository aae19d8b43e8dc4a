//! Headless world generation demo.
//!
//! Generates a square of chunk columns around the origin and logs what ended
//! up in it. Configuration is loaded from `config.ron` and can be overridden
//! via CLI flags, e.g. `cargo run -p nebula-demo -- --seed 42 --radius 3`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use nebula_config::{CliArgs, Config};
use nebula_structures::{LandClaim, PlacedStructure};
use nebula_voxel::{BlockId, CHUNK_SIZE, ColumnPos, ColumnStore, GenPass};
use nebula_worldgen::{AssetBundle, AsyncColumnGenerator, GenerationContext, StructureListener, WorldGenError, square};
use tracing::{error, info};

/// Logs every placement and claim as it happens.
struct PlacementLog;

impl StructureListener for PlacementLog {
    fn on_structure_placed(&self, structure: &PlacedStructure) {
        info!(
            "Placed {} ({}) at {} rotated {:?}",
            structure.code, structure.schematic, structure.origin, structure.rotation
        );
    }

    fn on_land_claim(&self, claim: &LandClaim) {
        info!(
            "Claimed {:?} for {} (level {})",
            claim.area, claim.description, claim.protection_level
        );
    }
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(Config::default_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    nebula_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match run(&config, args.assets.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("World generation failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, assets: Option<&Path>) -> Result<(), WorldGenError> {
    let assets = match assets {
        Some(path) => AssetBundle::load(path)?,
        None => AssetBundle::default_assets(),
    };
    let (mut context, report) = GenerationContext::new(&config.worldgen, &config.tuning, &assets)?;
    if !report.is_clean() {
        info!("{} asset variants disabled", report.warnings.len());
    }
    context.set_log_column_timings(config.debug.log_column_timings);
    context.listeners_mut().add_structure_listener(Box::new(PlacementLog));

    let workers = AsyncColumnGenerator::new(
        context.terrain(),
        config.workers.thread_count(),
        config.workers.max_in_flight,
        config.workers.result_capacity,
    )?;

    let center = ColumnPos::new(0, 0);
    let radius = config.worldgen.generate_radius;
    let mut store = context.new_store();
    let start = Instant::now();
    let stats = context.generate_area(&mut store, center, radius, Some(&workers))?;
    info!(
        "Generated {} columns on {} workers in {:.2?}",
        stats.columns,
        workers.thread_count(),
        start.elapsed()
    );
    info!(
        "Strata {} / soil {} blocks, {} deposits ({} blocks), {} structures, {} claims, {} dungeon tiles",
        stats.strata_blocks,
        stats.soil_blocks,
        stats.deposits,
        stats.deposit_blocks,
        stats.structures,
        stats.claims,
        stats.dungeon_tiles
    );
    info!("{} regions loaded", context.regions().len());

    for (code, count) in block_histogram(&context, &store, center, radius) {
        info!("  {code:<20} {count}");
    }
    Ok(())
}

/// Block counts over the finished columns, by code.
fn block_histogram(
    context: &GenerationContext,
    store: &ColumnStore,
    center: ColumnPos,
    radius: i32,
) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<BlockId, usize> = BTreeMap::new();
    for pos in square(center, radius) {
        let Some(column) = store.get(pos).filter(|c| c.has_completed(GenPass::Decoration)) else {
            continue;
        };
        for y in 0..column.map_height() {
            for lz in 0..CHUNK_SIZE {
                for lx in 0..CHUNK_SIZE {
                    *counts.entry(column.get(lx, y, lz)).or_default() += 1;
                }
            }
        }
    }
    counts
        .into_iter()
        .filter(|(id, _)| !id.is_air())
        .map(|(id, n)| {
            let code = context
                .registry()
                .get(id)
                .map_or_else(|| format!("#{}", id.0), |def| def.code.clone());
            (code, n)
        })
        .collect()
}
