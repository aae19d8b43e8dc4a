//! Parameterised random floats used by every variant shape parameter.

use serde::{Deserialize, Serialize};

use crate::random::SeededRandomStream;

/// Shape of a [`NatFloat`] distribution around its average.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribution {
    #[default]
    Uniform,
    /// Sum of two uniform draws.
    Triangle,
    /// Mean of three uniform draws.
    Gaussian,
    /// Mean of six uniform draws.
    NarrowGaussian,
    /// Gaussian folded so that values cluster at the edges.
    InverseGaussian,
    /// Always the average; consumes no draws.
    Dirac,
}

/// A float drawn as `avg + var * shape`, where `shape` lies in `[-1, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatFloat {
    pub avg: f32,
    pub var: f32,
    pub dist: Distribution,
}

impl Default for NatFloat {
    fn default() -> Self {
        Self::ZERO
    }
}

impl NatFloat {
    pub const ZERO: NatFloat = NatFloat::constant(0.0);
    pub const ONE: NatFloat = NatFloat::constant(1.0);

    pub const fn new(dist: Distribution, avg: f32, var: f32) -> Self {
        Self { avg, var, dist }
    }

    pub const fn uniform(avg: f32, var: f32) -> Self {
        Self::new(Distribution::Uniform, avg, var)
    }

    pub const fn constant(value: f32) -> Self {
        Self::new(Distribution::Dirac, value, 0.0)
    }

    /// Largest value this distribution can produce.
    pub fn max_value(&self) -> f32 {
        self.avg + self.var.abs()
    }

    pub fn sample(&self, rng: &mut SeededRandomStream) -> f32 {
        let shape = match self.dist {
            Distribution::Uniform => 2.0 * rng.next_float() - 1.0,
            Distribution::Triangle => rng.next_float() + rng.next_float() - 1.0,
            Distribution::Gaussian => 2.0 * mean_of(rng, 3) - 1.0,
            Distribution::NarrowGaussian => 2.0 * mean_of(rng, 6) - 1.0,
            Distribution::InverseGaussian => {
                let g = mean_of(rng, 3);
                let folded = if g > 0.5 { g - 0.5 } else { g + 0.5 };
                2.0 * folded - 1.0
            }
            Distribution::Dirac => 0.0,
        };
        self.avg + self.var * shape
    }
}

fn mean_of(rng: &mut SeededRandomStream, n: u32) -> f32 {
    (0..n).map(|_| rng.next_float()).sum::<f32>() / n as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> SeededRandomStream {
        let mut rng = SeededRandomStream::new(42);
        rng.init_position_seed(1, 2);
        rng
    }

    #[test]
    fn test_zero_variance_is_constant() {
        let mut rng = stream();
        let nf = NatFloat::uniform(5.0, 0.0);
        for _ in 0..100 {
            assert_eq!(nf.sample(&mut rng), 5.0);
        }
    }

    #[test]
    fn test_samples_within_bounds() {
        let mut rng = stream();
        for dist in [
            Distribution::Uniform,
            Distribution::Triangle,
            Distribution::Gaussian,
            Distribution::NarrowGaussian,
            Distribution::InverseGaussian,
        ] {
            let nf = NatFloat::new(dist, 10.0, 3.0);
            for _ in 0..1000 {
                let v = nf.sample(&mut rng);
                assert!((7.0..=13.0).contains(&v), "{dist:?} produced {v}");
            }
        }
    }

    #[test]
    fn test_dirac_consumes_nothing() {
        let mut a = stream();
        let mut b = stream();
        assert_eq!(NatFloat::constant(3.0).sample(&mut a), 3.0);
        assert_eq!(a.next_int(1000), b.next_int(1000));
    }

    #[test]
    fn test_gaussian_concentrates() {
        let mut rng = stream();
        let nf = NatFloat::new(Distribution::NarrowGaussian, 0.0, 1.0);
        let near = (0..2000)
            .filter(|_| nf.sample(&mut rng).abs() < 0.5)
            .count();
        assert!(near > 1500, "narrow gaussian too flat: {near}/2000 near zero");
    }
}
