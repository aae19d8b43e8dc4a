//! Landform variants: weighted terrain-shaping profiles.
//!
//! A landform scales each density octave by its own amplitude, flattens it
//! with its own dead-zone threshold, and supplies a per-height threshold
//! curve the summed noise has to exceed for a block to become solid.

use serde::{Deserialize, Serialize};

use crate::climate::ClimateEnvelope;
use crate::error::TerrainError;
use crate::lattice::ZoneEntry;

/// Number of octaves in the terrain density noise.
pub const TERRAIN_OCTAVES: usize = 8;

/// Declarative landform, as loaded from assets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandformVariant {
    pub code: String,
    pub weight: f32,
    pub climate: ClimateEnvelope,
    /// Amplitude per octave; missing trailing octaves are silent.
    pub octaves: Vec<f32>,
    pub octave_thresholds: Vec<f32>,
    /// Ascending key heights as fractions of the map height.
    pub y_key_positions: Vec<f32>,
    /// Density threshold at each key height.
    pub y_key_thresholds: Vec<f32>,
    /// `0.0` smooth .. `1.0` rugged; used for placement gating.
    pub roughness: f32,
}

impl Default for LandformVariant {
    fn default() -> Self {
        Self {
            code: String::new(),
            weight: 1.0,
            climate: ClimateEnvelope::default(),
            octaves: Vec::new(),
            octave_thresholds: Vec::new(),
            y_key_positions: vec![0.0, 1.0],
            y_key_thresholds: vec![-1.0, 1.0],
            roughness: 0.0,
        }
    }
}

/// A validated landform with its threshold curve sampled per block height.
#[derive(Clone, Debug, PartialEq)]
pub struct Landform {
    pub code: String,
    pub weight: f32,
    pub climate: ClimateEnvelope,
    pub amplitudes: [f64; TERRAIN_OCTAVES],
    pub thresholds: [f64; TERRAIN_OCTAVES],
    /// One entry per block height `0..map_height`.
    pub y_thresholds: Vec<f64>,
    pub roughness: f32,
}

impl Landform {
    /// Validates `variant` and samples its threshold curve.
    ///
    /// # Errors
    ///
    /// [`TerrainError::InvalidLandform`] for mismatched or unsorted key
    /// arrays, too many octaves, or a negative weight.
    pub fn from_variant(variant: &LandformVariant, map_height: i32) -> Result<Self, TerrainError> {
        let invalid = |reason: &str| TerrainError::InvalidLandform {
            code: variant.code.clone(),
            reason: reason.to_string(),
        };

        if variant.weight < 0.0 {
            return Err(invalid("negative weight"));
        }
        if variant.octaves.len() > TERRAIN_OCTAVES || variant.octave_thresholds.len() > TERRAIN_OCTAVES {
            return Err(invalid("more octaves than the density noise has"));
        }
        if variant.y_key_positions.is_empty() || variant.y_key_positions.len() != variant.y_key_thresholds.len() {
            return Err(invalid("y key positions and thresholds must be non-empty and of equal length"));
        }
        if variant.y_key_positions.windows(2).any(|w| w[0] > w[1]) {
            return Err(invalid("y key positions must ascend"));
        }

        let mut amplitudes = [0.0; TERRAIN_OCTAVES];
        let mut thresholds = [0.0; TERRAIN_OCTAVES];
        for (slot, &a) in amplitudes.iter_mut().zip(&variant.octaves) {
            *slot = a as f64;
        }
        for (slot, &t) in thresholds.iter_mut().zip(&variant.octave_thresholds) {
            *slot = t as f64;
        }

        let y_thresholds = (0..map_height.max(1))
            .map(|y| {
                threshold_curve(
                    &variant.y_key_positions,
                    &variant.y_key_thresholds,
                    y as f32 / map_height.max(1) as f32,
                ) as f64
            })
            .collect();

        Ok(Self {
            code: variant.code.clone(),
            weight: variant.weight,
            climate: variant.climate,
            amplitudes,
            thresholds,
            y_thresholds,
            roughness: variant.roughness,
        })
    }

    pub fn zone_entry(&self) -> ZoneEntry {
        ZoneEntry {
            weight: self.weight,
            envelope: self.climate,
        }
    }

    /// Threshold at block height `y`, clamped to the map.
    pub fn y_threshold(&self, y: i32) -> f64 {
        let last = self.y_thresholds.len().saturating_sub(1);
        self.y_thresholds
            .get((y.max(0) as usize).min(last))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Piecewise-linear interpolation through the key points, flat outside them.
fn threshold_curve(positions: &[f32], thresholds: &[f32], at: f32) -> f32 {
    let (Some(&first), Some(&last)) = (positions.first(), positions.last()) else {
        return 0.0;
    };
    if at <= first {
        return thresholds[0];
    }
    if at >= last {
        return thresholds[thresholds.len() - 1];
    }
    for i in 1..positions.len() {
        if at <= positions[i] {
            let span = positions[i] - positions[i - 1];
            if span <= 0.0 {
                return thresholds[i];
            }
            let t = (at - positions[i - 1]) / span;
            return thresholds[i - 1] + (thresholds[i] - thresholds[i - 1]) * t;
        }
    }
    thresholds[thresholds.len() - 1]
}

/// Weighted mix of several landforms at one point.
#[derive(Clone, Debug, PartialEq)]
pub struct BlendedLandform {
    pub amplitudes: [f64; TERRAIN_OCTAVES],
    pub thresholds: [f64; TERRAIN_OCTAVES],
    pub y_thresholds: Vec<f64>,
    pub roughness: f32,
}

impl BlendedLandform {
    /// Blends `landforms` by `weights` (index, weight). Unknown indices are
    /// ignored and the rest renormalised; an empty blend is flat zero.
    pub fn blend(landforms: &[Landform], weights: &[(usize, f32)], map_height: i32) -> Self {
        let mut out = Self {
            amplitudes: [0.0; TERRAIN_OCTAVES],
            thresholds: [0.0; TERRAIN_OCTAVES],
            y_thresholds: vec![0.0; map_height.max(1) as usize],
            roughness: 0.0,
        };

        let known: Vec<(&Landform, f64)> = weights
            .iter()
            .filter_map(|&(i, w)| landforms.get(i).map(|l| (l, w as f64)))
            .collect();
        let total: f64 = known.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return out;
        }

        for (landform, w) in known {
            let w = w / total;
            for o in 0..TERRAIN_OCTAVES {
                out.amplitudes[o] += landform.amplitudes[o] * w;
                out.thresholds[o] += landform.thresholds[o] * w;
            }
            for (y, slot) in out.y_thresholds.iter_mut().enumerate() {
                *slot += landform.y_threshold(y as i32) * w;
            }
            out.roughness += landform.roughness * w as f32;
        }
        out
    }

    pub fn y_threshold(&self, y: i32) -> f64 {
        let last = self.y_thresholds.len().saturating_sub(1);
        self.y_thresholds
            .get((y.max(0) as usize).min(last))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Roughness of a landform blend without building the full blend.
/// `roughness` holds one value per landform index.
pub fn blended_roughness(roughness: &[f32], weights: &[(usize, f32)]) -> f32 {
    let mut total = 0.0;
    let mut sum = 0.0;
    for &(i, w) in weights {
        if let Some(&r) = roughness.get(i) {
            total += w;
            sum += r * w;
        }
    }
    if total > 0.0 { sum / total } else { 0.0 }
}
