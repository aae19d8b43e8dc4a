//! Mineral deposit placement.
//!
//! Deposits are flat elliptical discs of an output block embedded in host
//! rock. For every variant, each chunk within `chunk_range` of the chunk
//! being generated rolls its own placements from a stream seeded by its own
//! position, so a disc straddling a chunk border is carved identically from
//! both sides. Only blocks inside the generating chunk are written.

use std::f32::consts::TAU;

use glam::IVec3;
use nebula_voxel::{BlockAccessor, BlockId, BlockRegistry, CHUNK_AREA, CHUNK_SIZE, ColumnPos, wildcard_match};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::climate::ClimateEnvelope;
use crate::error::TerrainError;
use crate::landform::blended_roughness;
use crate::lattice::{Channel, LatticeGenerator, LatticeSampler};
use crate::natfloat::NatFloat;
use crate::random::{SeededRandomStream, code_salt, position_seed_3d, salted_seed};

/// Upper bound on child placements carved while generating one chunk.
const MAX_CHILD_PLACEMENTS: usize = 512;

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Which block whitelist a child deposit embeds itself in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositAnchor {
    /// The variant's own `parent_blocks`.
    #[default]
    Own,
    /// The whitelist of the deposit that spawned it.
    Parent,
    /// The whitelist of the spawning deposit's own parent.
    Grandparent,
}

/// Maps host blocks matching `parent` to `output`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputMapping {
    pub parent: String,
    pub output: String,
}

/// Declarative deposit, as loaded from assets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositVariant {
    pub code: String,
    /// Host block patterns, `*` wildcards allowed.
    pub parent_blocks: Vec<String>,
    pub output_by_parent: Vec<OutputMapping>,
    /// Output for hosts no mapping covers.
    pub output_block: Option<String>,
    /// Placements per chunk. For children: expected triggers per
    /// chunk-area of replaced blocks.
    pub quantity: NatFloat,
    pub radius: NatFloat,
    pub thickness: NatFloat,
    /// Fraction of the column's surface height below the surface.
    pub depth: NatFloat,
    pub climate: Option<ClimateEnvelope>,
    pub max_roughness: Option<f32>,
    pub ore_map: Option<String>,
    pub anchor: DepositAnchor,
    pub children: Vec<DepositVariant>,
}

impl Default for DepositVariant {
    fn default() -> Self {
        Self {
            code: String::new(),
            parent_blocks: Vec::new(),
            output_by_parent: Vec::new(),
            output_block: None,
            quantity: NatFloat::ONE,
            radius: NatFloat::uniform(4.0, 1.0),
            thickness: NatFloat::uniform(2.0, 1.0),
            depth: NatFloat::uniform(0.5, 0.3),
            climate: None,
            max_roughness: None,
            ore_map: None,
            anchor: DepositAnchor::Own,
            children: Vec::new(),
        }
    }
}

/// A deposit with every block code resolved.
#[derive(Clone, Debug)]
pub struct ResolvedDeposit {
    pub code: String,
    salt: u64,
    /// Host block → output block. The keys are the whitelist.
    outputs: FxHashMap<BlockId, BlockId>,
    whitelist: Vec<BlockId>,
    quantity: NatFloat,
    radius: NatFloat,
    thickness: NatFloat,
    depth: NatFloat,
    climate: Option<ClimateEnvelope>,
    max_roughness: Option<f32>,
    ore_channel: Option<Channel>,
    children: Vec<ResolvedDeposit>,
}

impl ResolvedDeposit {
    /// Resolves `variant` and its children.
    ///
    /// # Errors
    ///
    /// [`TerrainError::UnresolvedBlock`] for unknown host or output codes,
    /// [`TerrainError::InvalidDeposit`] for a missing output, an unknown
    /// ore map, or an anchor with no ancestor to anchor to.
    pub fn resolve(
        variant: &DepositVariant,
        registry: &BlockRegistry,
        lattice: &LatticeGenerator,
    ) -> Result<Self, TerrainError> {
        Self::resolve_with_ancestors(variant, registry, lattice, &[])
    }

    fn resolve_with_ancestors(
        variant: &DepositVariant,
        registry: &BlockRegistry,
        lattice: &LatticeGenerator,
        ancestors: &[&[BlockId]],
    ) -> Result<Self, TerrainError> {
        let invalid = |reason: String| TerrainError::InvalidDeposit {
            code: variant.code.clone(),
            reason,
        };

        let whitelist: Vec<BlockId> = match variant.anchor {
            DepositAnchor::Own => registry
                .resolve_all(&variant.parent_blocks)
                .map_err(TerrainError::unresolved(&variant.code))?,
            DepositAnchor::Parent => ancestors
                .last()
                .map(|w| w.to_vec())
                .ok_or_else(|| invalid("anchored to a parent but has none".into()))?,
            DepositAnchor::Grandparent => ancestors
                .len()
                .checked_sub(2)
                .map(|i| ancestors[i].to_vec())
                .ok_or_else(|| invalid("anchored to a grandparent but has none".into()))?,
        };
        if whitelist.is_empty() {
            return Err(invalid("empty host block whitelist".into()));
        }

        let mut outputs = FxHashMap::default();
        for &host in &whitelist {
            let host_code = registry.get(host).map_or("", |def| def.code.as_str());
            let output_code = variant
                .output_by_parent
                .iter()
                .find(|m| wildcard_match(&m.parent, host_code))
                .map(|m| m.output.as_str())
                .or(variant.output_block.as_deref())
                .ok_or_else(|| invalid(format!("no output block for host '{host_code}'")))?;
            let output = registry
                .resolve(output_code)
                .map_err(TerrainError::unresolved(&variant.code))?;
            outputs.insert(host, output);
        }

        let ore_channel = match &variant.ore_map {
            Some(name) => Some(
                lattice
                    .ore_channel(name)
                    .ok_or_else(|| invalid(format!("unknown ore map '{name}'")))?,
            ),
            None => None,
        };

        let mut lineage = ancestors.to_vec();
        lineage.push(&whitelist);
        let children = variant
            .children
            .iter()
            .map(|child| Self::resolve_with_ancestors(child, registry, lattice, &lineage))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            code: variant.code.clone(),
            salt: code_salt(&variant.code),
            outputs,
            whitelist: whitelist.clone(),
            quantity: variant.quantity,
            radius: variant.radius,
            thickness: variant.thickness,
            depth: variant.depth,
            climate: variant.climate,
            max_roughness: variant.max_roughness,
            ore_channel,
            children,
        })
    }

    pub fn whitelist(&self) -> &[BlockId] {
        &self.whitelist
    }

    pub fn output_for(&self, host: BlockId) -> Option<BlockId> {
        self.outputs.get(&host).copied()
    }
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// Vertical anchoring of a disc.
#[derive(Clone, Copy, Debug, PartialEq)]
enum DiscCenter {
    /// Fraction of each column's surface height below its surface.
    Depth(f32),
    Absolute(i32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Disc {
    x: i32,
    z: i32,
    center: DiscCenter,
    radius: f32,
    thickness: f32,
    angle: f32,
    /// Minor over major semi-axis, `0.5..=1.0`.
    ratio: f32,
}

impl Disc {
    fn sample(rng: &mut SeededRandomStream, deposit: &ResolvedDeposit, x: i32, z: i32, center: Option<DiscCenter>) -> Self {
        let radius = deposit.radius.sample(rng).max(0.0);
        let thickness = deposit.thickness.sample(rng).max(0.0);
        let depth = deposit.depth.sample(rng).clamp(0.0, 1.0);
        let angle = rng.next_float() * TAU;
        let ratio = 0.5 + 0.5 * rng.next_float();
        Self {
            x,
            z,
            center: center.unwrap_or(DiscCenter::Depth(depth)),
            radius,
            thickness,
            angle,
            ratio,
        }
    }
}

/// One deposit disc that wrote blocks into the generated chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct DepositPlacement {
    pub code: String,
    /// Horizontal disc centre; `y` is the centre height at that column if
    /// loaded, or the anchor height for child deposits.
    pub center: IVec3,
    pub radius: f32,
    pub thickness: f32,
    pub blocks_replaced: u32,
    pub is_child: bool,
}

/// Outcome of [`DepositPlacer::place`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DepositReport {
    pub placements: Vec<DepositPlacement>,
    pub blocks_replaced: u32,
}

struct ChildTask<'a> {
    deposit: &'a ResolvedDeposit,
    pos: IVec3,
}

/// Places every resolved deposit into chunk columns.
pub struct DepositPlacer {
    seed: u64,
    deposits: Vec<ResolvedDeposit>,
    chunk_range: i32,
    landform_roughness: Vec<f32>,
    map_height: i32,
}

impl DepositPlacer {
    pub fn new(
        seed: u64,
        deposits: Vec<ResolvedDeposit>,
        chunk_range: i32,
        landform_roughness: Vec<f32>,
        map_height: i32,
    ) -> Self {
        Self {
            seed,
            deposits,
            chunk_range: chunk_range.max(0),
            landform_roughness,
            map_height,
        }
    }

    /// Resolves a list of variants, collecting errors for the ones that fail.
    pub fn resolve_all(
        variants: &[DepositVariant],
        registry: &BlockRegistry,
        lattice: &LatticeGenerator,
    ) -> (Vec<ResolvedDeposit>, Vec<TerrainError>) {
        let mut deposits = Vec::new();
        let mut errors = Vec::new();
        for variant in variants {
            match ResolvedDeposit::resolve(variant, registry, lattice) {
                Ok(deposit) => deposits.push(deposit),
                Err(err) => errors.push(err),
            }
        }
        (deposits, errors)
    }

    pub fn deposit_count(&self) -> usize {
        self.deposits.len()
    }

    /// Places deposits into chunk column `pos`.
    ///
    /// `lattice` must answer for any position (a [`LatticeGenerator`]):
    /// placements originating in neighbouring regions are gated on climate
    /// and roughness at their own centre.
    pub fn place<A, L>(&self, pos: ColumnPos, accessor: &mut A, lattice: &L) -> DepositReport
    where
        A: BlockAccessor + ?Sized,
        L: LatticeSampler + ?Sized,
    {
        let mut report = DepositReport::default();
        let mut rng = SeededRandomStream::new(self.seed);
        let mut children: Vec<ChildTask<'_>> = Vec::new();

        for deposit in &self.deposits {
            for dz in -self.chunk_range..=self.chunk_range {
                for dx in -self.chunk_range..=self.chunk_range {
                    let origin = pos.offset(dx, dz);
                    for disc in self.roll_discs(&mut rng, deposit, origin, lattice) {
                        let replaced = self.carve(pos, accessor, deposit, &disc, &mut children);
                        self.record(&mut report, deposit, &disc, replaced, false, &*accessor);
                    }
                }
            }
        }

        // Queue grows while children trigger grandchildren.
        let mut next = 0;
        while next < children.len() && next < MAX_CHILD_PLACEMENTS {
            let task = ChildTask {
                deposit: children[next].deposit,
                pos: children[next].pos,
            };
            next += 1;

            let state = position_seed_3d(salted_seed(self.seed, task.deposit.salt), task.pos.x, task.pos.y, task.pos.z);
            let mut child_rng = SeededRandomStream::from_state(self.seed, state);
            let disc = Disc::sample(
                &mut child_rng,
                task.deposit,
                task.pos.x,
                task.pos.z,
                Some(DiscCenter::Absolute(task.pos.y)),
            );
            let replaced = self.carve(pos, accessor, task.deposit, &disc, &mut children);
            self.record(&mut report, task.deposit, &disc, replaced, true, &*accessor);
        }
        if children.len() > MAX_CHILD_PLACEMENTS {
            tracing::debug!(
                "Chunk {pos:?}: {} child deposits dropped past the per-chunk cap",
                children.len() - MAX_CHILD_PLACEMENTS
            );
        }

        report
    }

    /// Rolls every disc originating in chunk `origin`. Draw order is fixed,
    /// so the result is independent of which chunk is being generated.
    fn roll_discs<L>(&self, rng: &mut SeededRandomStream, deposit: &ResolvedDeposit, origin: ColumnPos, lattice: &L) -> Vec<Disc>
    where
        L: LatticeSampler + ?Sized,
    {
        rng.init_salted_position_seed(deposit.salt, origin.x, origin.z);
        let mut quantity = deposit.quantity.sample(rng);
        if let Some(channel) = deposit.ore_channel {
            let half = CHUNK_SIZE / 2;
            quantity *= lattice.scalar_at(channel, origin.block_x() + half, origin.block_z() + half) / 255.0;
        }
        let quantity = quantity.max(0.0);
        let extra = rng.next_float() < quantity.fract();
        let count = quantity.floor() as u32 + extra as u32;

        let mut discs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let x = origin.block_x() + rng.next_int(CHUNK_SIZE as u32) as i32;
            let z = origin.block_z() + rng.next_int(CHUNK_SIZE as u32) as i32;
            discs.push(Disc::sample(rng, deposit, x, z, None));
        }

        discs.retain(|disc| self.passes_gates(deposit, disc, lattice));
        discs
    }

    fn passes_gates<L>(&self, deposit: &ResolvedDeposit, disc: &Disc, lattice: &L) -> bool
    where
        L: LatticeSampler + ?Sized,
    {
        if let Some(envelope) = &deposit.climate {
            if !envelope.contains(&lattice.climate_at(disc.x, disc.z)) {
                tracing::trace!("Deposit {} at ({}, {}) rejected by climate", deposit.code, disc.x, disc.z);
                return false;
            }
        }
        if let Some(max) = deposit.max_roughness {
            let weights = lattice.weights_at(Channel::Landform, disc.x, disc.z);
            if blended_roughness(&self.landform_roughness, &weights) > max {
                tracing::trace!("Deposit {} at ({}, {}) rejected by roughness", deposit.code, disc.x, disc.z);
                return false;
            }
        }
        true
    }

    /// Writes the part of `disc` that lies inside chunk `pos`.
    fn carve<'a, A>(
        &self,
        pos: ColumnPos,
        accessor: &mut A,
        deposit: &'a ResolvedDeposit,
        disc: &Disc,
        children: &mut Vec<ChildTask<'a>>,
    ) -> u32
    where
        A: BlockAccessor + ?Sized,
    {
        if disc.radius <= 0.0 || disc.thickness <= 0.0 {
            return 0;
        }
        let reach = disc.radius.ceil() as i32;
        let (x0, z0) = (pos.block_x(), pos.block_z());
        let min_x = (disc.x - reach).max(x0);
        let max_x = (disc.x + reach).min(x0 + CHUNK_SIZE - 1);
        let min_z = (disc.z - reach).max(z0);
        let max_z = (disc.z + reach).min(z0 + CHUNK_SIZE - 1);
        if min_x > max_x || min_z > max_z {
            return 0;
        }

        // libm keeps the disc outline identical across platforms.
        let (sin, cos) = (libm::sinf(disc.angle), libm::cosf(disc.angle));
        let major = disc.radius;
        let minor = (disc.radius * disc.ratio).max(0.5);
        let max_thickness = disc.thickness.ceil() as i32;
        let mut replaced = 0;

        for z in min_z..=max_z {
            for x in min_x..=max_x {
                let (dx, dz) = ((x - disc.x) as f32, (z - disc.z) as f32);
                let u = (dx * cos + dz * sin) / major;
                let v = (dz * cos - dx * sin) / minor;
                let d2 = u * u + v * v;
                if d2 > 1.0 {
                    continue;
                }
                let local = ((disc.thickness * libm::sqrtf(1.0 - d2)).ceil() as i32).min(max_thickness);
                if local <= 0 {
                    continue;
                }
                let Some(center_y) = self.center_y(&*accessor, disc.center, x, z) else {
                    continue;
                };

                let bottom = center_y - local / 2;
                for y in bottom..bottom + local {
                    if y < 1 || y >= self.map_height {
                        continue;
                    }
                    let block_pos = IVec3::new(x, y, z);
                    let Some(output) = deposit.output_for(accessor.block(block_pos)) else {
                        continue;
                    };
                    if accessor.set_block(block_pos, output) {
                        replaced += 1;
                        self.roll_children(deposit, block_pos, children);
                    }
                }
            }
        }
        replaced
    }

    fn center_y<A>(&self, accessor: &A, center: DiscCenter, x: i32, z: i32) -> Option<i32>
    where
        A: BlockAccessor + ?Sized,
    {
        match center {
            DiscCenter::Absolute(y) => Some(y),
            DiscCenter::Depth(depth) => {
                let surface = accessor.terrain_height(x, z)?;
                Some((surface as f32 * (1.0 - depth)).round() as i32)
            }
        }
    }

    fn roll_children<'a>(&self, deposit: &'a ResolvedDeposit, at: IVec3, children: &mut Vec<ChildTask<'a>>) {
        for child in &deposit.children {
            let state = position_seed_3d(salted_seed(self.seed, child.salt ^ 0x0052_4f4c_4c00), at.x, at.y, at.z);
            let mut roll = SeededRandomStream::from_state(self.seed, state);
            let chance = child.quantity.sample(&mut roll) / CHUNK_AREA as f32;
            if roll.next_float() < chance {
                children.push(ChildTask { deposit: child, pos: at });
            }
        }
    }

    fn record<A>(
        &self,
        report: &mut DepositReport,
        deposit: &ResolvedDeposit,
        disc: &Disc,
        replaced: u32,
        is_child: bool,
        accessor: &A,
    ) where
        A: BlockAccessor + ?Sized,
    {
        if replaced == 0 {
            return;
        }
        let y = self.center_y(accessor, disc.center, disc.x, disc.z).unwrap_or(-1);
        report.blocks_replaced += replaced;
        report.placements.push(DepositPlacement {
            code: deposit.code.clone(),
            center: IVec3::new(disc.x, y, disc.z),
            radius: disc.radius,
            thickness: disc.thickness,
            blocks_replaced: replaced,
            is_child,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::climate::ClimateEnvelope;
    use crate::lattice::ZoneEntry;
    use nebula_voxel::{BlockDef, BlockMaterial, ChunkColumn, ColumnStore};

    const MAP_HEIGHT: i32 = 128;
    const SURFACE: i32 = 100;

    fn registry() -> BlockRegistry {
        let mut registry = BlockRegistry::new();
        for (code, material) in [
            ("rock-granite", BlockMaterial::Stone),
            ("rock-andesite", BlockMaterial::Stone),
            ("ore-gold-granite", BlockMaterial::Ore),
            ("ore-gold-andesite", BlockMaterial::Ore),
            ("quartz", BlockMaterial::Ore),
        ] {
            registry.register(BlockDef::new(code, material)).unwrap();
        }
        registry
    }

    fn lattice(seed: u64) -> LatticeGenerator {
        let one = vec![ZoneEntry {
            weight: 1.0,
            envelope: ClimateEnvelope::default(),
        }];
        LatticeGenerator::new(seed, one.clone(), one, &["gold".to_string()])
    }

    fn granite_store(positions: &[ColumnPos]) -> ColumnStore {
        let mut store = ColumnStore::new(MAP_HEIGHT);
        for &pos in positions {
            let mut column = ChunkColumn::new(pos, MAP_HEIGHT);
            for lz in 0..CHUNK_SIZE {
                for lx in 0..CHUNK_SIZE {
                    for y in 1..=SURFACE {
                        column.set(lx, y, lz, BlockId(1));
                    }
                    column.set_terrain_height(lx, lz, SURFACE);
                }
            }
            store.insert(column);
        }
        store
    }

    fn granite_variant() -> DepositVariant {
        DepositVariant {
            code: "granite-blob".into(),
            parent_blocks: vec!["rock-granite".into()],
            output_block: Some("quartz".into()),
            quantity: NatFloat::uniform(1.0, 0.0),
            radius: NatFloat::uniform(5.0, 0.0),
            thickness: NatFloat::uniform(2.0, 0.0),
            depth: NatFloat::uniform(0.5, 0.0),
            ..Default::default()
        }
    }

    fn placer(seed: u64, variants: &[DepositVariant], range: i32) -> DepositPlacer {
        let lattice = lattice(seed);
        let (deposits, errors) = DepositPlacer::resolve_all(variants, &registry(), &lattice);
        assert!(errors.is_empty(), "{errors:?}");
        DepositPlacer::new(seed, deposits, range, vec![0.0], MAP_HEIGHT)
    }

    fn changed(store: &ColumnStore, pos: ColumnPos) -> Vec<IVec3> {
        let mut out = Vec::new();
        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                for y in 0..MAP_HEIGHT {
                    let p = IVec3::new(pos.block_x() + lx, y, pos.block_z() + lz);
                    let b = store.block(p);
                    let expected = if (1..=SURFACE).contains(&y) { BlockId(1) } else { BlockId::AIR };
                    if b != expected {
                        out.push(p);
                    }
                }
            }
        }
        out
    }

    #[test]
    fn test_single_disc_seed_42_chunk_10_10() {
        let pos = ColumnPos::new(10, 10);
        let placer = placer(42, &[granite_variant()], 0);
        let mut store = granite_store(&[pos]);
        let report = placer.place(pos, &mut store, &lattice(42));

        assert_eq!(report.placements.len(), 1, "{report:?}");
        let placement = &report.placements[0];
        assert_eq!(placement.radius, 5.0);
        assert_eq!(placement.thickness, 2.0);
        assert_eq!(ColumnPos::containing(placement.center.x, placement.center.z), pos);

        let changed = changed(&store, pos);
        assert_eq!(changed.len() as u32, report.blocks_replaced);
        assert!(!changed.is_empty());

        let mut per_column: FxHashMap<(i32, i32), Vec<i32>> = FxHashMap::default();
        for p in &changed {
            assert_eq!(store.block(*p), BlockId(5), "only quartz written");
            let dx = p.x - placement.center.x;
            let dz = p.z - placement.center.z;
            assert!(dx * dx + dz * dz <= 25, "block {p} outside radius 5");
            per_column.entry((p.x, p.z)).or_default().push(p.y);
        }
        for ys in per_column.values() {
            assert!(ys.len() <= 2, "column thicker than 2: {ys:?}");
            let (lo, hi) = (ys.iter().min().unwrap(), ys.iter().max().unwrap());
            assert!(hi - lo < 2, "column not contiguous: {ys:?}");
        }
        // Centre column lies at half the surface height.
        assert_eq!(placement.center.y, 50);
    }

    #[test]
    fn test_same_inputs_same_output() {
        let pos = ColumnPos::new(-3, 7);
        let placer = placer(9, &[DepositVariant {
            quantity: NatFloat::uniform(3.0, 1.0),
            radius: NatFloat::uniform(6.0, 2.0),
            ..granite_variant()
        }], 1);
        let mut a = granite_store(&[pos]);
        let mut b = granite_store(&[pos]);
        let ra = placer.place(pos, &mut a, &lattice(9));
        let rb = placer.place(pos, &mut b, &lattice(9));
        assert_eq!(ra, rb);
        assert_eq!(changed(&a, pos), changed(&b, pos));
    }

    #[test]
    fn test_cross_chunk_disc_carved_identically_from_both_sides() {
        let west = ColumnPos::new(0, 0);
        let east = ColumnPos::new(1, 0);
        let variant = DepositVariant {
            quantity: NatFloat::uniform(4.0, 0.0),
            radius: NatFloat::uniform(8.0, 0.0),
            ..granite_variant()
        };
        let placer = placer(5, &[variant], 1);

        // Generate east then west in one store, and only west in another.
        let mut both = granite_store(&[west, east]);
        placer.place(east, &mut both, &lattice(5));
        placer.place(west, &mut both, &lattice(5));
        let mut alone = granite_store(&[west]);
        placer.place(west, &mut alone, &lattice(5));

        assert_eq!(changed(&both, west), changed(&alone, west));
    }

    #[test]
    fn test_writes_stay_in_generated_chunk() {
        let pos = ColumnPos::new(0, 0);
        let neighbour = ColumnPos::new(1, 0);
        let placer = placer(3, &[DepositVariant {
            quantity: NatFloat::uniform(6.0, 0.0),
            radius: NatFloat::uniform(10.0, 0.0),
            ..granite_variant()
        }], 1);
        let mut store = granite_store(&[pos, neighbour]);
        placer.place(pos, &mut store, &lattice(3));
        assert!(changed(&store, neighbour).is_empty());
    }

    #[test]
    fn test_output_mapping_per_host() {
        let registry = registry();
        let variant = DepositVariant {
            code: "gold".into(),
            parent_blocks: vec!["rock-*".into()],
            output_by_parent: vec![OutputMapping {
                parent: "*-granite".into(),
                output: "ore-gold-granite".into(),
            }],
            output_block: Some("ore-gold-andesite".into()),
            ..Default::default()
        };
        let deposit = ResolvedDeposit::resolve(&variant, &registry, &lattice(1)).unwrap();
        assert_eq!(deposit.output_for(BlockId(1)), Some(BlockId(3)));
        assert_eq!(deposit.output_for(BlockId(2)), Some(BlockId(4)));
        assert_eq!(deposit.output_for(BlockId(5)), None);
    }

    #[test]
    fn test_missing_output_is_error() {
        let variant = DepositVariant {
            code: "nothing".into(),
            parent_blocks: vec!["rock-granite".into()],
            ..Default::default()
        };
        assert!(matches!(
            ResolvedDeposit::resolve(&variant, &registry(), &lattice(1)),
            Err(TerrainError::InvalidDeposit { .. })
        ));
    }

    #[test]
    fn test_unknown_host_is_unresolved() {
        let variant = DepositVariant {
            parent_blocks: vec!["rock-basalt".into()],
            ..granite_variant()
        };
        assert!(matches!(
            ResolvedDeposit::resolve(&variant, &registry(), &lattice(1)),
            Err(TerrainError::UnresolvedBlock { .. })
        ));
    }

    #[test]
    fn test_unknown_ore_map_is_error() {
        let variant = DepositVariant {
            ore_map: Some("platinum".into()),
            ..granite_variant()
        };
        assert!(ResolvedDeposit::resolve(&variant, &registry(), &lattice(1)).is_err());
    }

    #[test]
    fn test_child_anchors_to_parent_whitelist() {
        let child = DepositVariant {
            code: "quartz-vein".into(),
            anchor: DepositAnchor::Parent,
            output_block: Some("quartz".into()),
            quantity: NatFloat::uniform(2048.0, 0.0),
            radius: NatFloat::uniform(1.0, 0.0),
            thickness: NatFloat::uniform(1.0, 0.0),
            ..Default::default()
        };
        let parent = DepositVariant {
            code: "gold".into(),
            parent_blocks: vec!["rock-granite".into()],
            output_block: Some("ore-gold-granite".into()),
            radius: NatFloat::uniform(4.0, 0.0),
            thickness: NatFloat::uniform(2.0, 0.0),
            depth: NatFloat::uniform(0.5, 0.0),
            children: vec![child],
            ..Default::default()
        };
        let deposit = ResolvedDeposit::resolve(&parent, &registry(), &lattice(1)).unwrap();
        assert_eq!(deposit.children[0].whitelist(), &[BlockId(1)]);

        // A certain trigger: every replaced block queues a child, which then
        // replaces remaining granite next to it.
        let pos = ColumnPos::new(4, 4);
        let placer = DepositPlacer::new(1, vec![deposit], 0, vec![0.0], MAP_HEIGHT);
        let mut store = granite_store(&[pos]);
        let report = placer.place(pos, &mut store, &lattice(1));
        assert!(report.placements.iter().any(|p| !p.is_child));
        for p in report.placements.iter().filter(|p| p.is_child) {
            assert_eq!(p.code, "quartz-vein");
        }
    }

    #[test]
    fn test_grandparent_anchor_without_grandparent_fails() {
        let variant = DepositVariant {
            anchor: DepositAnchor::Grandparent,
            ..granite_variant()
        };
        assert!(ResolvedDeposit::resolve(&variant, &registry(), &lattice(1)).is_err());
    }

    #[test]
    fn test_climate_gate_rejects_everything() {
        let variant = DepositVariant {
            climate: Some(ClimateEnvelope {
                min_temp: 1000.0,
                ..Default::default()
            }),
            ..granite_variant()
        };
        let placer = placer(42, &[variant], 0);
        let pos = ColumnPos::new(10, 10);
        let mut store = granite_store(&[pos]);
        let report = placer.place(pos, &mut store, &lattice(42));
        assert!(report.placements.is_empty());
        assert!(changed(&store, pos).is_empty());
    }

    #[test]
    fn test_roughness_gate() {
        let variant = DepositVariant {
            max_roughness: Some(0.5),
            ..granite_variant()
        };
        let lattice_gen = lattice(42);
        let (deposits, _) = DepositPlacer::resolve_all(&[variant], &registry(), &lattice_gen);
        let rough = DepositPlacer::new(42, deposits.clone(), 0, vec![0.9], MAP_HEIGHT);
        let smooth = DepositPlacer::new(42, deposits, 0, vec![0.1], MAP_HEIGHT);
        let pos = ColumnPos::new(10, 10);
        let mut a = granite_store(&[pos]);
        let mut b = granite_store(&[pos]);
        assert!(rough.place(pos, &mut a, &lattice_gen).placements.is_empty());
        assert_eq!(smooth.place(pos, &mut b, &lattice_gen).placements.len(), 1);
    }
}
