//! Lerp helpers for lattice data.
//!
//! Lattice cells store either a scalar or three packed 8-bit channels
//! (`0xRRGGBB`). Packed values must be interpolated per channel, never as a
//! single integer.

#[inline]
pub fn lerp(t: f32, a: f32, b: f32) -> f32 {
    a + (b - a) * t
}

/// Bilinear interpolation of four corner values.
///
/// `fx`/`fz` are the fractional position inside the cell, in `[0, 1]`.
/// Corners are named by their (x, z) offset: `v00` top-left, `v10` top-right,
/// `v01` bottom-left, `v11` bottom-right.
#[inline]
pub fn bilinear(v00: f32, v10: f32, v01: f32, v11: f32, fx: f32, fz: f32) -> f32 {
    let top = lerp(fx, v00, v10);
    let bottom = lerp(fx, v01, v11);
    lerp(fz, top, bottom)
}

#[inline]
pub fn pack_rgb(r: u8, g: u8, b: u8) -> i32 {
    ((r as i32) << 16) | ((g as i32) << 8) | b as i32
}

#[inline]
pub fn unpack_rgb(value: i32) -> (u8, u8, u8) {
    (
        ((value >> 16) & 0xff) as u8,
        ((value >> 8) & 0xff) as u8,
        (value & 0xff) as u8,
    )
}

/// Per-channel bilinear interpolation of packed `0xRRGGBB` values.
pub fn bilinear_rgb(v00: i32, v10: i32, v01: i32, v11: i32, fx: f32, fz: f32) -> i32 {
    let (r00, g00, b00) = unpack_rgb(v00);
    let (r10, g10, b10) = unpack_rgb(v10);
    let (r01, g01, b01) = unpack_rgb(v01);
    let (r11, g11, b11) = unpack_rgb(v11);

    let channel = |a: u8, b: u8, c: u8, d: u8| {
        bilinear(a as f32, b as f32, c as f32, d as f32, fx, fz)
            .round()
            .clamp(0.0, 255.0) as u8
    };

    pack_rgb(
        channel(r00, r10, r01, r11),
        channel(g00, g10, g01, g11),
        channel(b00, b10, b01, b11),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilinear_corners() {
        assert_eq!(bilinear(1.0, 2.0, 3.0, 4.0, 0.0, 0.0), 1.0);
        assert_eq!(bilinear(1.0, 2.0, 3.0, 4.0, 1.0, 0.0), 2.0);
        assert_eq!(bilinear(1.0, 2.0, 3.0, 4.0, 0.0, 1.0), 3.0);
        assert_eq!(bilinear(1.0, 2.0, 3.0, 4.0, 1.0, 1.0), 4.0);
    }

    #[test]
    fn test_bilinear_center_is_mean() {
        let v = bilinear(0.0, 10.0, 20.0, 30.0, 0.5, 0.5);
        assert!((v - 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_pack_unpack() {
        let packed = pack_rgb(12, 200, 255);
        assert_eq!(unpack_rgb(packed), (12, 200, 255));
    }

    #[test]
    fn test_rgb_channels_do_not_bleed() {
        let a = pack_rgb(0, 255, 0);
        let b = pack_rgb(255, 0, 0);
        let mid = bilinear_rgb(a, b, a, b, 0.5, 0.5);
        let (r, g, bl) = unpack_rgb(mid);
        assert_eq!(r, 128);
        assert_eq!(g, 128);
        assert_eq!(bl, 0);
    }
}
