//! Climate samples and the envelopes variants use to gate on them.

use nebula_math::unpack_rgb;
use serde::{Deserialize, Serialize};

/// Temperature represented by channel value 0.
pub const MIN_TEMPERATURE: f32 = -20.0;
/// Temperature represented by channel value 255.
pub const MAX_TEMPERATURE: f32 = 40.0;
/// Degrees lost between sea level and the top of the map.
pub const ALTITUDE_COOLING: f32 = 30.0;

/// Climate at one block column.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClimateSample {
    /// Degrees Celsius.
    pub temperature: f32,
    /// `0.0..=1.0`.
    pub rainfall: f32,
    /// Geologic activity, `0.0..=1.0`.
    pub geologic: f32,
}

impl ClimateSample {
    /// Decodes a packed `0xTTRRGG` lattice value.
    pub fn from_packed(value: i32) -> Self {
        let (t, r, g) = unpack_rgb(value);
        Self {
            temperature: MIN_TEMPERATURE + (t as f32 / 255.0) * (MAX_TEMPERATURE - MIN_TEMPERATURE),
            rainfall: r as f32 / 255.0,
            geologic: g as f32 / 255.0,
        }
    }

    /// Temperature lowered linearly above sea level.
    pub fn at_height(self, y: i32, sea_level: i32, map_height: i32) -> Self {
        let span = (map_height - sea_level).max(1) as f32;
        let above = (y - sea_level).max(0) as f32;
        Self {
            temperature: self.temperature - above / span * ALTITUDE_COOLING,
            ..self
        }
    }
}

/// Accepted climate range. The default accepts everything.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateEnvelope {
    pub min_temp: f32,
    pub max_temp: f32,
    pub min_rain: f32,
    pub max_rain: f32,
}

impl Default for ClimateEnvelope {
    fn default() -> Self {
        Self {
            min_temp: f32::NEG_INFINITY,
            max_temp: f32::INFINITY,
            min_rain: 0.0,
            max_rain: 1.0,
        }
    }
}

impl ClimateEnvelope {
    pub fn contains(&self, climate: &ClimateSample) -> bool {
        (self.min_temp..=self.max_temp).contains(&climate.temperature)
            && (self.min_rain..=self.max_rain).contains(&climate.rainfall)
    }
}
