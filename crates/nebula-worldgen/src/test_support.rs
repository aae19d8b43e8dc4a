use nebula_config::{TuningConfig, WorldGenConfig};

use crate::assets::AssetBundle;
use crate::context::GenerationContext;

pub(crate) fn test_config(seed: u64) -> WorldGenConfig {
    WorldGenConfig {
        seed,
        map_height: 128,
        sea_level: 55,
        ..Default::default()
    }
}

pub(crate) fn test_context(seed: u64) -> GenerationContext {
    let (context, _) = GenerationContext::new(&test_config(seed), &TuningConfig::default(), &AssetBundle::default_assets())
        .expect("default assets load");
    context
}
