//! Position-seeded random streams.
//!
//! Every random decision in world generation is drawn from a stream whose
//! state is a pure function of the world seed and a position. Streams are
//! cheap `Copy`-sized values, so each worker builds its own and nothing is
//! shared across threads.

use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const LCG_MUL: u64 = 6_364_136_223_846_793_005;
const LCG_INC: u64 = 1_442_695_040_888_963_407;

// ---------------------------------------------------------------------------
// Seed derivation
// ---------------------------------------------------------------------------

/// Opaque state of a [`SeededRandomStream`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RngState(pub u64);

/// SplitMix64 finalizer. Bijective, so distinct inputs never collide.
#[inline]
pub fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Derives a sub-seed for a named purpose (a noise channel, a variant index).
#[inline]
pub fn salted_seed(world_seed: u64, salt: u64) -> u64 {
    mix64(world_seed ^ mix64(salt))
}

/// Hashes a string into a salt. FNV-1a, stable across platforms and runs.
pub fn code_salt(code: &str) -> u64 {
    let mut hash: u64 = 0xCBF2_9CE4_8422_2325;
    for byte in code.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    hash
}

/// The stream state for column position `(x, z)` under `world_seed`.
pub fn position_seed(world_seed: u64, x: i32, z: i32) -> RngState {
    let packed = ((x as u32 as u64) << 32) | (z as u32 as u64);
    RngState(mix64(world_seed ^ mix64(packed)))
}

/// The stream state for block position `(x, y, z)` under `world_seed`.
pub fn position_seed_3d(world_seed: u64, x: i32, y: i32, z: i32) -> RngState {
    let RngState(column) = position_seed(world_seed, x, z);
    RngState(mix64(column ^ (y as u32 as u64).wrapping_mul(LCG_MUL)))
}

/// A ChaCha8 generator for one-off seeding of noise functions.
pub fn noise_seeder(world_seed: u64, salt: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(salted_seed(world_seed, salt))
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// Linear-congruential stream reseeded from world seed and position.
///
/// ```
/// use nebula_terrain::SeededRandomStream;
///
/// let mut a = SeededRandomStream::new(42);
/// let mut b = SeededRandomStream::new(42);
/// a.init_position_seed(10, -3);
/// b.init_position_seed(10, -3);
/// assert_eq!(a.next_int(100), b.next_int(100));
/// ```
#[derive(Clone, Debug)]
pub struct SeededRandomStream {
    world_seed: u64,
    state: u64,
}

impl SeededRandomStream {
    pub fn new(world_seed: u64) -> Self {
        Self {
            world_seed,
            state: mix64(world_seed),
        }
    }

    /// A stream starting from an explicit state.
    pub fn from_state(world_seed: u64, state: RngState) -> Self {
        Self {
            world_seed,
            state: state.0,
        }
    }

    pub fn world_seed(&self) -> u64 {
        self.world_seed
    }

    pub fn state(&self) -> RngState {
        RngState(self.state)
    }

    /// Resets the stream to the state for column `(x, z)`.
    pub fn init_position_seed(&mut self, x: i32, z: i32) {
        self.state = position_seed(self.world_seed, x, z).0;
    }

    /// Resets the stream to the state for block `(x, y, z)`.
    pub fn init_position_seed_3d(&mut self, x: i32, y: i32, z: i32) {
        self.state = position_seed_3d(self.world_seed, x, y, z).0;
    }

    /// Resets the stream to the state for `(x, z)` with an extra salt, so
    /// that several independent decisions at one position do not correlate.
    pub fn init_salted_position_seed(&mut self, salt: u64, x: i32, z: i32) {
        self.state = position_seed(salted_seed(self.world_seed, salt), x, z).0;
    }

    #[inline]
    fn step(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(LCG_MUL).wrapping_add(LCG_INC);
        // Low LCG bits are weak; the xorshift-multiply output fixes that.
        let mut x = self.state;
        x ^= x >> 33;
        x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
        x ^ (x >> 33)
    }

    /// Uniform integer in `0..max`. Returns 0 when `max` is 0.
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            self.step();
            return 0;
        }
        (((self.step() >> 32) * max as u64) >> 32) as u32
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_float(&mut self) -> f32 {
        (self.step() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform double in `[0, 1)`.
    pub fn next_double(&mut self) -> f64 {
        (self.step() >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl RngCore for SeededRandomStream {
    fn next_u32(&mut self) -> u32 {
        (self.step() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.step()
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(8) {
            let bytes = self.step().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn draw(stream: &mut SeededRandomStream, n: usize) -> Vec<u32> {
        (0..n).map(|_| stream.next_int(1_000_000)).collect()
    }

    #[test]
    fn test_same_position_same_sequence() {
        let mut a = SeededRandomStream::new(12345);
        let mut b = SeededRandomStream::new(12345);
        a.init_position_seed(7, -9);
        // Advance b first to prove reseeding fully resets the state.
        b.next_double();
        b.init_position_seed(7, -9);
        assert_eq!(draw(&mut a, 64), draw(&mut b, 64));
    }

    #[test]
    fn test_different_positions_differ() {
        let mut a = SeededRandomStream::new(1);
        let mut b = SeededRandomStream::new(1);
        a.init_position_seed(0, 1);
        b.init_position_seed(1, 0);
        assert_ne!(draw(&mut a, 16), draw(&mut b, 16));
    }

    #[test]
    fn test_different_seeds_differ() {
        assert_ne!(position_seed(1, 5, 5), position_seed(2, 5, 5));
        assert_ne!(position_seed_3d(1, 5, 0, 5), position_seed_3d(1, 5, 1, 5));
    }

    #[test]
    fn test_ranges() {
        let mut stream = SeededRandomStream::new(99);
        stream.init_position_seed(3, 3);
        for _ in 0..10_000 {
            let f = stream.next_float();
            assert!((0.0..1.0).contains(&f), "float out of range: {f}");
            let d = stream.next_double();
            assert!((0.0..1.0).contains(&d), "double out of range: {d}");
            assert!(stream.next_int(32) < 32);
        }
        assert_eq!(stream.next_int(0), 0);
    }

    #[test]
    fn test_next_int_covers_range() {
        let mut stream = SeededRandomStream::new(5);
        stream.init_position_seed(0, 0);
        let mut seen = [false; 8];
        for _ in 0..1000 {
            seen[stream.next_int(8) as usize] = true;
        }
        assert!(seen.iter().all(|&s| s), "not all buckets hit: {seen:?}");
    }

    #[test]
    fn test_shuffle_is_deterministic() {
        let mut a = SeededRandomStream::new(42);
        let mut b = SeededRandomStream::new(42);
        a.init_position_seed(10, 10);
        b.init_position_seed(10, 10);
        let mut xs: Vec<u32> = (0..20).collect();
        let mut ys = xs.clone();
        xs.shuffle(&mut a);
        ys.shuffle(&mut b);
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_streams_are_thread_independent() {
        let expected = {
            let mut s = SeededRandomStream::new(777);
            s.init_position_seed(-40, 12);
            draw(&mut s, 32)
        };
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    let mut s = SeededRandomStream::new(777);
                    s.init_position_seed(-40, 12);
                    draw(&mut s, 32)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn test_code_salt_stable() {
        assert_eq!(code_salt(""), 0xCBF2_9CE4_8422_2325);
        assert_ne!(code_salt("granite"), code_salt("andesite"));
    }
}
