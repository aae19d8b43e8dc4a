//! Multi-octave simplex noise with per-octave amplitudes and dead zones.
//!
//! Each octave doubles in frequency. Unlike plain fBm, amplitudes are given
//! per octave so that landforms can blend them, and each octave can carry a
//! threshold that flattens small values to zero.

use noise::{NoiseFn, Simplex};
use rand::Rng;

use crate::random::noise_seeder;

/// Applies an octave dead zone: values within `threshold` of zero become
/// zero, the rest are shifted towards zero by `threshold`.
#[inline]
pub fn dead_zone(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

/// A stack of independently seeded simplex octaves.
pub struct OctaveNoise {
    octaves: Vec<Simplex>,
    amplitudes: Vec<f64>,
    thresholds: Vec<f64>,
    base_frequency: f64,
}

impl OctaveNoise {
    /// Creates a stack with one octave per entry of `amplitudes`.
    ///
    /// Missing thresholds default to zero.
    pub fn new(
        world_seed: u64,
        salt: u64,
        amplitudes: &[f64],
        thresholds: &[f64],
        base_frequency: f64,
    ) -> Self {
        let mut seeder = noise_seeder(world_seed, salt);
        let octaves = amplitudes
            .iter()
            .map(|_| Simplex::new(seeder.random::<u32>()))
            .collect();
        let thresholds = (0..amplitudes.len())
            .map(|i| thresholds.get(i).copied().unwrap_or(0.0))
            .collect();
        Self {
            octaves,
            amplitudes: amplitudes.to_vec(),
            thresholds,
            base_frequency,
        }
    }

    /// Standard fBm weights: amplitude halves per octave starting from `amplitude`.
    pub fn fbm(world_seed: u64, salt: u64, octaves: usize, amplitude: f64, frequency: f64) -> Self {
        let amplitudes: Vec<f64> = (0..octaves)
            .map(|i| amplitude * 0.5f64.powi(i as i32))
            .collect();
        Self::new(world_seed, salt, &amplitudes, &[], frequency)
    }

    pub fn octave_count(&self) -> usize {
        self.octaves.len()
    }

    #[inline]
    fn frequency(&self, octave: usize) -> f64 {
        self.base_frequency * (1u64 << octave.min(62)) as f64
    }

    /// Raw noise of one octave at a 3D point, in `[-1, 1]`.
    #[inline]
    pub fn octave_3d(&self, octave: usize, x: f64, y: f64, z: f64) -> f64 {
        let f = self.frequency(octave);
        self.octaves[octave].get([x * f, y * f, z * f])
    }

    /// Raw noise of one octave at a 2D point, in `[-1, 1]`.
    #[inline]
    pub fn octave_2d(&self, octave: usize, x: f64, z: f64) -> f64 {
        let f = self.frequency(octave);
        self.octaves[octave].get([x * f, z * f])
    }

    /// Sum of all octaves with the stack's own amplitudes and thresholds.
    pub fn sample_3d(&self, x: f64, y: f64, z: f64) -> f64 {
        (0..self.octaves.len())
            .map(|o| dead_zone(self.octave_3d(o, x, y, z), self.thresholds[o]) * self.amplitudes[o])
            .sum()
    }

    pub fn sample_2d(&self, x: f64, z: f64) -> f64 {
        (0..self.octaves.len())
            .map(|o| dead_zone(self.octave_2d(o, x, z), self.thresholds[o]) * self.amplitudes[o])
            .sum()
    }

    /// Sum of all octaves using caller-supplied amplitudes and thresholds.
    /// Octaves with zero amplitude are skipped.
    pub fn sample_3d_with(&self, amplitudes: &[f64], thresholds: &[f64], x: f64, y: f64, z: f64) -> f64 {
        let mut total = 0.0;
        for (o, &amp) in amplitudes.iter().enumerate().take(self.octaves.len()) {
            if amp == 0.0 {
                continue;
            }
            let th = thresholds.get(o).copied().unwrap_or(0.0);
            total += dead_zone(self.octave_3d(o, x, y, z), th) * amp;
        }
        total
    }

    /// Sum of absolute amplitudes; bounds the magnitude of [`sample_3d`](Self::sample_3d).
    pub fn max_amplitude(&self) -> f64 {
        self.amplitudes.iter().map(|a| a.abs()).sum()
    }

    /// 2D sample normalised from `[-max, max]` into `[0, 1]`.
    pub fn sample_2d_unit(&self, x: f64, z: f64) -> f64 {
        let max = self.max_amplitude();
        if max <= 0.0 {
            return 0.5;
        }
        ((self.sample_2d(x, z) / max) * 0.5 + 0.5).clamp(0.0, 1.0)
    }
}

/// 2D noise whose input coordinates are displaced by two other noise fields.
pub struct WarpedNoise {
    base: OctaveNoise,
    warp_x: OctaveNoise,
    warp_z: OctaveNoise,
    warp_strength: f64,
}

impl WarpedNoise {
    pub fn new(base: OctaveNoise, world_seed: u64, salt: u64, warp_frequency: f64, warp_strength: f64) -> Self {
        Self {
            base,
            warp_x: OctaveNoise::fbm(world_seed, salt ^ 0x5741_5250_5f58, 2, 1.0, warp_frequency),
            warp_z: OctaveNoise::fbm(world_seed, salt ^ 0x5741_5250_5f5a, 2, 1.0, warp_frequency),
            warp_strength,
        }
    }

    /// Warped sample in `[0, 1]`.
    pub fn sample_unit(&self, x: f64, z: f64) -> f64 {
        let wx = x + self.warp_x.sample_2d(x, z) * self.warp_strength;
        let wz = z + self.warp_z.sample_2d(x, z) * self.warp_strength;
        self.base.sample_2d_unit(wx, wz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_zone() {
        assert_eq!(dead_zone(0.1, 0.2), 0.0);
        assert_eq!(dead_zone(-0.1, 0.2), 0.0);
        assert!((dead_zone(0.5, 0.2) - 0.3).abs() < 1e-12);
        assert!((dead_zone(-0.5, 0.2) + 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_same_seed_same_values() {
        let a = OctaveNoise::fbm(42, 1, 4, 1.0, 0.01);
        let b = OctaveNoise::fbm(42, 1, 4, 1.0, 0.01);
        for i in 0..50 {
            let p = i as f64 * 3.7;
            assert_eq!(a.sample_3d(p, p * 0.5, -p), b.sample_3d(p, p * 0.5, -p));
        }
    }

    #[test]
    fn test_salt_decorrelates() {
        let a = OctaveNoise::fbm(42, 1, 3, 1.0, 0.05);
        let b = OctaveNoise::fbm(42, 2, 3, 1.0, 0.05);
        let differs = (0..20).any(|i| {
            let p = i as f64 * 5.3 + 0.5;
            a.sample_2d(p, p) != b.sample_2d(p, p)
        });
        assert!(differs);
    }

    #[test]
    fn test_bounded_by_max_amplitude() {
        let n = OctaveNoise::fbm(7, 0, 5, 2.0, 0.02);
        let max = n.max_amplitude();
        for i in 0..200 {
            let p = i as f64 * 1.37;
            let v = n.sample_3d(p, -p, p * 2.0);
            assert!(v.abs() <= max + 1e-9, "{v} exceeds {max}");
        }
    }

    #[test]
    fn test_with_matches_own_weights() {
        let amps = [1.0, 0.5, 0.25];
        let ths = [0.1, 0.0, 0.2];
        let n = OctaveNoise::new(3, 9, &amps, &ths, 0.01);
        let (x, y, z) = (12.5, 80.0, -33.0);
        assert_eq!(n.sample_3d(x, y, z), n.sample_3d_with(&amps, &ths, x, y, z));
    }

    #[test]
    fn test_warped_unit_range() {
        let w = WarpedNoise::new(OctaveNoise::fbm(1, 2, 3, 1.0, 0.01), 1, 2, 0.005, 30.0);
        for i in 0..100 {
            let v = w.sample_unit(i as f64 * 7.0, i as f64 * -3.0);
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
