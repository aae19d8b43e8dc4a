//! Region lattice fields: coarse 2D parameter maps interpolated to blocks.
//!
//! Every lattice cell value is a pure function of `(seed, channel, cell)`.
//! [`LatticeGenerator`] computes cells on demand, [`RegionLattice`] caches
//! one region's worth of padded cells. Both implement [`LatticeSampler`],
//! so a cached lookup and a direct point evaluation at the same block
//! produce identical values.

use nebula_math::{bilinear, bilinear_rgb, pack_rgb};
use nebula_voxel::CHUNK_SIZE;
use serde::{Deserialize, Serialize};

use crate::climate::{ClimateEnvelope, ClimateSample};
use crate::octave::{OctaveNoise, WarpedNoise};
use crate::random::{SeededRandomStream, code_salt, salted_seed};
use crate::region::RegionPos;

/// Chunks along one side of a map region.
pub const REGION_CHUNKS: i32 = 16;
/// Blocks along one side of a map region.
pub const REGION_SIZE: i32 = REGION_CHUNKS * CHUNK_SIZE;

const PADDING_TOP_LEFT: i32 = 1;
const PADDING_BOTTOM_RIGHT: i32 = 2;

// ---------------------------------------------------------------------------
// Channels and maps
// ---------------------------------------------------------------------------

/// A named lattice channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Packed temperature / rainfall / geologic activity.
    Climate,
    Forest,
    /// Index into the landform list.
    Landform,
    /// Index into the geologic province list.
    Province,
    /// Density map of the n-th registered ore map.
    Ore(u16),
}

impl Channel {
    /// Blocks covered by one lattice cell.
    pub const fn cell_size(self) -> i32 {
        match self {
            Channel::Climate | Channel::Forest | Channel::Ore(_) => 32,
            Channel::Landform => 16,
            Channel::Province => 64,
        }
    }

    pub const fn cells_per_region(self) -> i32 {
        REGION_SIZE / self.cell_size()
    }
}

/// A padded square grid of lattice cells belonging to one region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntDataMap2D {
    pub inner_size: i32,
    pub top_left_padding: i32,
    pub bottom_right_padding: i32,
    /// Row-major, `stride() * stride()` values.
    pub data: Vec<i32>,
}

impl IntDataMap2D {
    pub fn stride(&self) -> i32 {
        self.top_left_padding + self.inner_size + self.bottom_right_padding
    }

    /// Value at inner coordinates. The padding extends the valid range to
    /// `-top_left_padding..inner_size + bottom_right_padding`.
    pub fn get(&self, ix: i32, iz: i32) -> Option<i32> {
        let (px, pz) = (ix + self.top_left_padding, iz + self.top_left_padding);
        let stride = self.stride();
        if !(0..stride).contains(&px) || !(0..stride).contains(&pz) {
            return None;
        }
        self.data.get((pz * stride + px) as usize).copied()
    }
}

/// A block position expressed as a lattice cell plus fractional offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellPoint {
    pub cx: i32,
    pub cz: i32,
    pub fx: f32,
    pub fz: f32,
}

impl CellPoint {
    pub fn locate(channel: Channel, x: i32, z: i32) -> Self {
        let size = channel.cell_size();
        Self {
            cx: x.div_euclid(size),
            cz: z.div_euclid(size),
            fx: x.rem_euclid(size) as f32 / size as f32,
            fz: z.rem_euclid(size) as f32 / size as f32,
        }
    }

    /// Bilinear weights of the four enclosing cells, ordered 00, 10, 01, 11.
    pub fn weights(&self) -> [f32; 4] {
        [
            (1.0 - self.fx) * (1.0 - self.fz),
            self.fx * (1.0 - self.fz),
            (1.0 - self.fx) * self.fz,
            self.fx * self.fz,
        ]
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Block-resolution access to lattice channels.
pub trait LatticeSampler {
    /// Raw value of one lattice cell in global cell coordinates.
    fn cell(&self, channel: Channel, cx: i32, cz: i32) -> i32;

    fn corners(&self, channel: Channel, p: &CellPoint) -> [i32; 4] {
        [
            self.cell(channel, p.cx, p.cz),
            self.cell(channel, p.cx + 1, p.cz),
            self.cell(channel, p.cx, p.cz + 1),
            self.cell(channel, p.cx + 1, p.cz + 1),
        ]
    }

    /// Sea-level climate at block column `(x, z)`.
    fn climate_at(&self, x: i32, z: i32) -> ClimateSample {
        let p = CellPoint::locate(Channel::Climate, x, z);
        let [v00, v10, v01, v11] = self.corners(Channel::Climate, &p);
        ClimateSample::from_packed(bilinear_rgb(v00, v10, v01, v11, p.fx, p.fz))
    }

    /// Interpolated scalar channel value in `0.0..=255.0`.
    fn scalar_at(&self, channel: Channel, x: i32, z: i32) -> f32 {
        let p = CellPoint::locate(channel, x, z);
        let [v00, v10, v01, v11] = self.corners(channel, &p);
        bilinear(v00 as f32, v10 as f32, v01 as f32, v11 as f32, p.fx, p.fz)
    }

    /// Blend weights of an index channel at `(x, z)`, sorted by index.
    /// Weights sum to one.
    fn weights_at(&self, channel: Channel, x: i32, z: i32) -> Vec<(usize, f32)> {
        let p = CellPoint::locate(channel, x, z);
        let values = self.corners(channel, &p);
        let mut out: Vec<(usize, f32)> = Vec::with_capacity(4);
        for (value, weight) in values.into_iter().zip(p.weights()) {
            if weight <= 0.0 {
                continue;
            }
            let index = value.max(0) as usize;
            match out.iter_mut().find(|(i, _)| *i == index) {
                Some(entry) => entry.1 += weight,
                None => out.push((index, weight)),
            }
        }
        out.sort_by_key(|&(i, _)| i);
        out
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// One weighted choice of an index channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoneEntry {
    pub weight: f32,
    pub envelope: ClimateEnvelope,
}

/// Picks a weighted index per zone of cells. Zone borders are wobbled by
/// two warp fields so that they do not follow the grid.
struct ZoneLayer {
    salt: u64,
    zone_cells: i32,
    entries: Vec<ZoneEntry>,
    wobble_x: OctaveNoise,
    wobble_z: OctaveNoise,
    wobble_strength: f64,
}

impl ZoneLayer {
    fn new(seed: u64, salt: u64, zone_cells: i32, entries: Vec<ZoneEntry>) -> Self {
        Self {
            salt,
            zone_cells,
            entries,
            wobble_x: OctaveNoise::fbm(seed, salt ^ 0x0057_4f42_5f58, 3, 1.0, 0.09),
            wobble_z: OctaveNoise::fbm(seed, salt ^ 0x0057_4f42_5f5a, 3, 1.0, 0.09),
            wobble_strength: zone_cells as f64 * 0.6,
        }
    }

    /// Zone containing cell `(cx, cz)` after wobble.
    fn zone_of(&self, cx: i32, cz: i32) -> (i32, i32) {
        let (fx, fz) = (cx as f64, cz as f64);
        let wx = fx + self.wobble_x.sample_2d(fx, fz) * self.wobble_strength;
        let wz = fz + self.wobble_z.sample_2d(fx, fz) * self.wobble_strength;
        let zone = self.zone_cells as f64;
        ((wx / zone).floor() as i32, (wz / zone).floor() as i32)
    }

    fn pick(&self, seed: u64, zone: (i32, i32), climate: &ClimateSample) -> i32 {
        let eligible: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].weight > 0.0 && self.entries[i].envelope.contains(climate))
            .collect();
        let candidates = if eligible.is_empty() {
            (0..self.entries.len())
                .filter(|&i| self.entries[i].weight > 0.0)
                .collect()
        } else {
            eligible
        };
        let total: f32 = candidates.iter().map(|&i| self.entries[i].weight).sum();
        if candidates.is_empty() || total <= 0.0 {
            return 0;
        }

        let mut rng = SeededRandomStream::new(seed);
        rng.init_salted_position_seed(self.salt, zone.0, zone.1);
        let mut roll = rng.next_float() * total;
        for &i in &candidates {
            roll -= self.entries[i].weight;
            if roll < 0.0 {
                return i as i32;
            }
        }
        candidates[candidates.len() - 1] as i32
    }
}

/// Computes lattice cells for any channel from the world seed alone.
pub struct LatticeGenerator {
    seed: u64,
    temperature: WarpedNoise,
    rainfall: WarpedNoise,
    geologic: WarpedNoise,
    forest: WarpedNoise,
    landforms: ZoneLayer,
    provinces: ZoneLayer,
    ore_maps: Vec<(String, WarpedNoise)>,
}

fn climate_noise(seed: u64, name: &str, frequency: f64) -> WarpedNoise {
    let salt = code_salt(name);
    WarpedNoise::new(OctaveNoise::fbm(seed, salt, 4, 1.0, frequency), seed, salt, frequency * 2.0, 120.0)
}

impl LatticeGenerator {
    /// `landforms` and `provinces` give the weight and climate envelope of
    /// each index; `ore_maps` names the ore density channels in order.
    pub fn new(seed: u64, landforms: Vec<ZoneEntry>, provinces: Vec<ZoneEntry>, ore_maps: &[String]) -> Self {
        Self {
            seed,
            temperature: climate_noise(seed, "temperature", 1.0 / 2048.0),
            rainfall: climate_noise(seed, "rainfall", 1.0 / 1536.0),
            geologic: climate_noise(seed, "geologic", 1.0 / 1024.0),
            forest: climate_noise(seed, "forest", 1.0 / 768.0),
            landforms: ZoneLayer::new(seed, code_salt("landform"), 4, landforms),
            provinces: ZoneLayer::new(seed, code_salt("province"), 3, provinces),
            ore_maps: ore_maps
                .iter()
                .map(|name| {
                    let salt = salted_seed(code_salt("oremap"), code_salt(name));
                    let noise = WarpedNoise::new(OctaveNoise::fbm(seed, salt, 3, 1.0, 1.0 / 256.0), seed, salt, 1.0 / 128.0, 40.0);
                    (name.clone(), noise)
                })
                .collect(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn landform_count(&self) -> usize {
        self.landforms.entries.len()
    }

    pub fn province_count(&self) -> usize {
        self.provinces.entries.len()
    }

    /// Channel of a named ore map, if registered.
    pub fn ore_channel(&self, name: &str) -> Option<Channel> {
        self.ore_maps
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| Channel::Ore(i as u16))
    }

    fn unit_to_byte(v: f64) -> u8 {
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    }

    /// Climate at the centre of a climate cell, undecoded.
    fn climate_cell(&self, cx: i32, cz: i32) -> i32 {
        let size = Channel::Climate.cell_size() as f64;
        let (x, z) = (cx as f64 * size, cz as f64 * size);
        pack_rgb(
            Self::unit_to_byte(self.temperature.sample_unit(x, z)),
            Self::unit_to_byte(self.rainfall.sample_unit(x, z)),
            Self::unit_to_byte(self.geologic.sample_unit(x, z)),
        )
    }

    fn zone_climate(&self, channel: Channel, layer: &ZoneLayer, zone: (i32, i32)) -> ClimateSample {
        let block_span = layer.zone_cells * channel.cell_size();
        let x = zone.0 * block_span + block_span / 2;
        let z = zone.1 * block_span + block_span / 2;
        let climate_size = Channel::Climate.cell_size();
        ClimateSample::from_packed(self.climate_cell(x.div_euclid(climate_size), z.div_euclid(climate_size)))
    }

    /// Builds the padded maps of every channel for one region.
    pub fn generate_region(&self, pos: RegionPos) -> RegionLattice {
        let map = |channel: Channel| self.generate_map(channel, pos);
        RegionLattice {
            pos,
            climate: map(Channel::Climate),
            forest: map(Channel::Forest),
            landform: map(Channel::Landform),
            province: map(Channel::Province),
            ores: (0..self.ore_maps.len())
                .map(|i| map(Channel::Ore(i as u16)))
                .collect(),
        }
    }

    fn generate_map(&self, channel: Channel, pos: RegionPos) -> IntDataMap2D {
        let inner = channel.cells_per_region();
        let stride = PADDING_TOP_LEFT + inner + PADDING_BOTTOM_RIGHT;
        let origin_x = pos.x * inner - PADDING_TOP_LEFT;
        let origin_z = pos.z * inner - PADDING_TOP_LEFT;
        let mut data = Vec::with_capacity((stride * stride) as usize);
        for dz in 0..stride {
            for dx in 0..stride {
                data.push(self.cell(channel, origin_x + dx, origin_z + dz));
            }
        }
        IntDataMap2D {
            inner_size: inner,
            top_left_padding: PADDING_TOP_LEFT,
            bottom_right_padding: PADDING_BOTTOM_RIGHT,
            data,
        }
    }
}

impl LatticeSampler for LatticeGenerator {
    fn cell(&self, channel: Channel, cx: i32, cz: i32) -> i32 {
        let size = channel.cell_size() as f64;
        let (x, z) = (cx as f64 * size, cz as f64 * size);
        match channel {
            Channel::Climate => self.climate_cell(cx, cz),
            Channel::Forest => Self::unit_to_byte(self.forest.sample_unit(x, z)) as i32,
            Channel::Landform => {
                let zone = self.landforms.zone_of(cx, cz);
                let climate = self.zone_climate(channel, &self.landforms, zone);
                self.landforms.pick(self.seed, zone, &climate)
            }
            Channel::Province => {
                let zone = self.provinces.zone_of(cx, cz);
                let climate = self.zone_climate(channel, &self.provinces, zone);
                self.provinces.pick(self.seed, zone, &climate)
            }
            Channel::Ore(i) => self
                .ore_maps
                .get(i as usize)
                .map_or(0, |(_, noise)| Self::unit_to_byte(noise.sample_unit(x, z)) as i32),
        }
    }
}

// ---------------------------------------------------------------------------
// Cached region lattice
// ---------------------------------------------------------------------------

/// All channel maps of one region, as produced by [`LatticeGenerator::generate_region`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionLattice {
    pub pos: RegionPos,
    pub climate: IntDataMap2D,
    pub forest: IntDataMap2D,
    pub landform: IntDataMap2D,
    pub province: IntDataMap2D,
    pub ores: Vec<IntDataMap2D>,
}

impl RegionLattice {
    fn map(&self, channel: Channel) -> Option<&IntDataMap2D> {
        match channel {
            Channel::Climate => Some(&self.climate),
            Channel::Forest => Some(&self.forest),
            Channel::Landform => Some(&self.landform),
            Channel::Province => Some(&self.province),
            Channel::Ore(i) => self.ores.get(i as usize),
        }
    }
}

impl LatticeSampler for RegionLattice {
    fn cell(&self, channel: Channel, cx: i32, cz: i32) -> i32 {
        let inner = channel.cells_per_region();
        let value = self
            .map(channel)
            .and_then(|map| map.get(cx - self.pos.x * inner, cz - self.pos.z * inner));
        match value {
            Some(v) => v,
            None => {
                tracing::warn!(
                    "lattice cell ({cx}, {cz}) of {channel:?} outside region {:?}",
                    self.pos
                );
                0
            }
        }
    }
}
