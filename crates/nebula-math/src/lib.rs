//! Integer cuboids and interpolation helpers shared by the world generation crates.

mod cuboid;
mod interp;

pub use cuboid::Cuboid;
pub use interp::{bilinear, bilinear_rgb, lerp, pack_rgb, unpack_rgb};
