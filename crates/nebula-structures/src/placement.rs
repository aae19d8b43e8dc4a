//! Per-chunk structure and village placement.
//!
//! What a chunk ends up holding depends on the seed, the tuning and the
//! terrain pass alone, never on which chunks generated first:
//!
//! * Each chunk rolls its proposals from a stream salted with the structure
//!   code and the chunk position, so any chunk can recompute a neighbour's.
//! * Two proposals that would overlap or crowd each other are settled by a
//!   priority rolled with them. The lower one is dropped even if the higher
//!   one later finds no valid spot.
//! * Slope, liquid and ground checks read the terrain snapshot, which later
//!   passes do not touch.
//! * A chunk writes only the part of each structure inside its own column,
//!   and records only the structures rolled in it.

use std::sync::Arc;

use glam::IVec3;
use nebula_math::Cuboid;
use nebula_terrain::{GeneratedStructure, LatticeSampler, RegionCache, RegionPos, RngState, SeededRandomStream};
use nebula_voxel::{BlockAccessor, BlockId, BlockMaterial, BlockRegistry, CHUNK_SIZE, ColumnPos};
use rand::RngCore;
use rand::seq::SliceRandom;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::claims::LandClaim;
use crate::error::StructureError;
use crate::schematic::{BlockSchematic, Pathway, Rotation, SchematicLibrary, in_xz};
use crate::structure::{MAX_PATHWAY_DISTANCE, Placement, RUIN_TOLERANCE_FACTOR, ResolvedStructure, WorldGenStructure};
use crate::village::{ResolvedVillage, WorldGenVillage};

const SHUFFLE_SALT: u64 = 0x5f3a_91c2_7d4e_b803;

/// Most trials one structure rolls in one chunk, whatever the chance.
pub const MAX_TRIALS: u32 = 64;

/// Largest chance multiplier a tuning may carry, globally or per code.
pub const MAX_CHANCE_MULTIPLIER: f32 = 1024.0;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// Caller-owned per-request overrides, applied before any trial is rolled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureTuning {
    /// Applies to every structure and village.
    pub chance_multiplier: f32,
    pub chance_multipliers: FxHashMap<String, f32>,
    pub max_count_overrides: FxHashMap<String, u32>,
}

impl Default for StructureTuning {
    fn default() -> Self {
        Self {
            chance_multiplier: 1.0,
            chance_multipliers: FxHashMap::default(),
            max_count_overrides: FxHashMap::default(),
        }
    }
}

impl StructureTuning {
    pub fn chance(&self, code: &str, base: f32) -> f32 {
        let per_code = self.chance_multipliers.get(code).copied().unwrap_or(1.0);
        (base * self.chance_multiplier * per_code).max(0.0)
    }

    pub fn max_count(&self, code: &str, base: u32) -> u32 {
        self.max_count_overrides.get(code).copied().unwrap_or(base)
    }

    /// # Errors
    ///
    /// [`StructureError::InvalidTuning`] for the first multiplier that is
    /// NaN, negative, infinite or above [`MAX_CHANCE_MULTIPLIER`]. Per-code
    /// entries are checked in code order.
    pub fn validate(&self) -> Result<(), StructureError> {
        let check = |scope: String, multiplier: f32| {
            if multiplier.is_finite() && (0.0..=MAX_CHANCE_MULTIPLIER).contains(&multiplier) {
                Ok(())
            } else {
                Err(StructureError::InvalidTuning {
                    scope,
                    multiplier,
                    max: MAX_CHANCE_MULTIPLIER,
                })
            }
        };
        check("all structures".into(), self.chance_multiplier)?;
        let mut codes: Vec<(&String, &f32)> = self.chance_multipliers.iter().collect();
        codes.sort_by(|a, b| a.0.cmp(b.0));
        for (code, &multiplier) in codes {
            check(format!("'{code}'"), multiplier)?;
        }
        Ok(())
    }
}

/// Which worldgen stage is placing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementPass {
    /// Terrain features: regular structures and villages.
    Primary,
    /// Decoration: structures flagged `post_pass`.
    PostPass,
}

/// Shared state a placement reads besides the chunk's blocks.
pub struct PlacementContext<'a, L: ?Sized> {
    pub regions: &'a RegionCache,
    pub lattice: &'a L,
    pub tuning: &'a StructureTuning,
    /// Volumes no structure may enter, such as planned dungeon tiles.
    pub reserved: &'a [Cuboid],
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlacedStructure {
    pub code: String,
    pub schematic: String,
    pub origin: IVec3,
    pub rotation: Rotation,
    pub location: Cuboid,
    /// Blocks written into the chunk that rolled it.
    pub blocks_written: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlacementReport {
    /// Structures rolled in this chunk and recorded by this call.
    pub placed: Vec<PlacedStructure>,
    pub claims: Vec<LandClaim>,
    /// Trials rolled in this chunk.
    pub trials: u32,
    /// Trials of this chunk that found no valid spot or yielded to a
    /// neighbour.
    pub rejected: u32,
    /// Blocks written into this chunk, including parts of structures
    /// rolled by its neighbours.
    pub blocks_written: u32,
}

impl PlacementReport {
    pub fn count(&self, code: &str) -> usize {
        self.placed.iter().filter(|p| p.code == code).count()
    }
}

struct Candidate {
    rotation: Rotation,
    origin: IVec3,
    location: Cuboid,
    corridor: Vec<IVec3>,
}

impl Candidate {
    fn crosses(&self, reserved: &[Cuboid]) -> bool {
        reserved
            .iter()
            .any(|r| r.intersects(&self.location) || self.corridor.iter().any(|&cell| r.contains(cell)))
    }
}

// ---------------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Site {
    Structure(usize),
    Village(usize),
}

/// One rolled trial. Every field follows from the seed, the tuning and the
/// chunk it was rolled in.
#[derive(Clone, Debug)]
struct Proposal {
    site: Site,
    chunk: ColumnPos,
    trial: u32,
    /// Wins conflicts when higher. Also the batch id of its records.
    priority: u64,
    x: i32,
    z: i32,
    schematic: usize,
    rolled: usize,
    depth: i32,
    /// Every column the proposal may read or write.
    area: Cuboid,
    /// Where the centres of its records can fall.
    anchor: Cuboid,
}

impl Proposal {
    fn rank(&self) -> (u64, ColumnPos, Site, u32) {
        (self.priority, self.chunk, self.site, self.trial)
    }
}

/// xz square of `side` blocks centred the way schematics are centred.
fn square(x: i32, z: i32, side: i32) -> Cuboid {
    Cuboid::from_origin_size(IVec3::new(x - side / 2, 0, z - side / 2), IVec3::new(side, 1, side))
}

/// Squared xz gap between the nearest blocks of two boxes.
fn gap_sq_xz(a: &Cuboid, b: &Cuboid) -> i64 {
    let gap = |a0: i32, a1: i32, b0: i32, b1: i32| i64::from((b0 - (a1 - 1)).max(a0 - (b1 - 1)).max(0));
    let dx = gap(a.min.x, a.max.x, b.min.x, b.max.x);
    let dz = gap(a.min.z, a.max.z, b.min.z, b.max.z);
    dx * dx + dz * dz
}

/// One trial per whole unit of `chance`, plus one more with the fraction as
/// its probability, capped at `max_count` and [`MAX_TRIALS`].
fn roll_trials(rng: &mut SeededRandomStream, chance: f32, max_count: u32) -> u32 {
    let cap = max_count.min(MAX_TRIALS);
    if chance.is_nan() || chance <= 0.0 {
        return 0;
    }
    let whole = chance.floor();
    let mut trials = (whole as u32).min(cap);
    if trials < cap && rng.next_float() < chance - whole {
        trials += 1;
    }
    trials
}

/// Proposals by chunk, rolled on demand during one `place_chunk` call.
struct Rolls<'a> {
    engine: &'a StructurePlacementEngine,
    tuning: &'a StructureTuning,
    chunks: FxHashMap<ColumnPos, Vec<Proposal>>,
}

impl Rolls<'_> {
    fn chunk(&mut self, pos: ColumnPos) -> &[Proposal] {
        let (engine, tuning) = (self.engine, self.tuning);
        self.chunks.entry(pos).or_insert_with(|| engine.roll_chunk(pos, tuning))
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct StructurePlacementEngine {
    seed: u64,
    sea_level: i32,
    registry: Arc<BlockRegistry>,
    structures: Vec<ResolvedStructure>,
    villages: Vec<ResolvedVillage>,
    /// Chunk distance within which two proposals can overlap.
    overlap_reach: i32,
    /// Chunk distance within which two proposals of a group can crowd.
    group_reach: FxHashMap<String, i32>,
}

impl StructurePlacementEngine {
    pub fn new(
        seed: u64,
        sea_level: i32,
        registry: Arc<BlockRegistry>,
        structures: Vec<ResolvedStructure>,
        villages: Vec<ResolvedVillage>,
    ) -> Self {
        let max_span = structures
            .iter()
            .flat_map(|s| (0..s.rotations.len()).map(move |i| s.span(i)))
            .chain(villages.iter().map(|v| v.span()))
            .max()
            .unwrap_or(0);
        let max_anchor = villages
            .iter()
            .map(|v| v.slot_reach() * 2 + 1)
            .max()
            .unwrap_or(1)
            .max(1);
        let mut group_reach: FxHashMap<String, i32> = FxHashMap::default();
        let groups = structures
            .iter()
            .map(|s| (&s.def.group, s.def.min_group_distance))
            .chain(villages.iter().map(|v| (&v.def.group, v.def.min_group_distance)));
        for (group, distance) in groups {
            if group.is_empty() || distance <= 0 {
                continue;
            }
            let reach = (distance + max_anchor + 1) / CHUNK_SIZE + 1;
            let entry = group_reach.entry(group.clone()).or_insert(0);
            *entry = (*entry).max(reach);
        }
        Self {
            seed,
            sea_level,
            registry,
            structures,
            villages,
            overlap_reach: max_span / CHUNK_SIZE + 1,
            group_reach,
        }
    }

    /// Resolves structure definitions, keeping the ones that succeed.
    pub fn resolve_structures(
        defs: &[WorldGenStructure],
        library: &SchematicLibrary,
    ) -> (Vec<ResolvedStructure>, Vec<StructureError>) {
        let mut resolved = Vec::new();
        let mut errors = Vec::new();
        for def in defs {
            match ResolvedStructure::resolve(def, library) {
                Ok(s) => resolved.push(s),
                Err(e) => errors.push(e),
            }
        }
        (resolved, errors)
    }

    pub fn resolve_villages(
        defs: &[WorldGenVillage],
        library: &SchematicLibrary,
    ) -> (Vec<ResolvedVillage>, Vec<StructureError>) {
        let mut resolved = Vec::new();
        let mut errors = Vec::new();
        for def in defs {
            match ResolvedVillage::resolve(def, library) {
                Ok(v) => resolved.push(v),
                Err(e) => errors.push(e),
            }
        }
        (resolved, errors)
    }

    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }

    pub fn village_count(&self) -> usize {
        self.villages.len()
    }

    /// Places the structures of `pass` that touch chunk column `pos`.
    ///
    /// Reads the terrain of the column and its eight neighbours and writes
    /// only inside the column. Structures rolled in `pos` are recorded in
    /// the region holding their centre. Running a chunk twice records
    /// nothing new.
    pub fn place_chunk<A, L>(
        &self,
        pos: ColumnPos,
        accessor: &mut A,
        ctx: &PlacementContext<'_, L>,
        pass: PlacementPass,
    ) -> PlacementReport
    where
        A: BlockAccessor + ?Sized,
        L: LatticeSampler + ?Sized,
    {
        let mut report = PlacementReport::default();
        let column = Cuboid::from_origin_size(
            IVec3::new(pos.block_x(), 0, pos.block_z()),
            IVec3::new(CHUNK_SIZE, accessor.map_size_y(), CHUNK_SIZE),
        );

        let post_pass = pass == PlacementPass::PostPass;
        let mut order: Vec<usize> = (0..self.structures.len())
            .filter(|&i| self.structures[i].def.post_pass == post_pass)
            .collect();
        let mut rng = SeededRandomStream::new(self.seed);
        rng.init_salted_position_seed(SHUFFLE_SALT, pos.x, pos.z);
        order.shuffle(&mut rng);
        let sequence = |site: Site| match site {
            Site::Structure(i) => order.iter().position(|&j| j == i).unwrap_or(usize::MAX),
            Site::Village(i) => order.len() + i,
        };

        let mut rolls = Rolls {
            engine: self,
            tuning: ctx.tuning,
            chunks: FxHashMap::default(),
        };
        let mut relevant: Vec<Proposal> = Vec::new();
        for dz in -self.overlap_reach..=self.overlap_reach {
            for dx in -self.overlap_reach..=self.overlap_reach {
                let chunk = pos.offset(dx, dz);
                relevant.extend(
                    rolls
                        .chunk(chunk)
                        .iter()
                        .filter(|p| self.runs_in(p.site, pass))
                        .filter(|p| p.chunk == pos || p.area.intersects_xz(&column))
                        .cloned(),
                );
            }
        }
        relevant.sort_by_key(|p| (sequence(p.site), p.chunk, p.trial));

        for proposal in &relevant {
            let own = proposal.chunk == pos;
            if own {
                report.trials += 1;
            }
            if !self.survives(proposal, &mut rolls) {
                if own {
                    tracing::trace!(
                        "{}: yields to a neighbour at ({}, {})",
                        self.site_code(proposal.site),
                        proposal.x,
                        proposal.z
                    );
                    report.rejected += 1;
                }
                continue;
            }
            let realized = match proposal.site {
                Site::Structure(i) => {
                    self.realize_structure(&self.structures[i], proposal, own, &column, accessor, ctx, &mut report)
                }
                Site::Village(i) => {
                    self.realize_village(&self.villages[i], proposal, own, &column, accessor, ctx, &mut report)
                }
            };
            if own && !realized {
                report.rejected += 1;
            }
        }

        if !report.placed.is_empty() {
            tracing::debug!(
                "Placed {} structures in chunk ({}, {}) after {} trials",
                report.placed.len(),
                pos.x,
                pos.z,
                report.trials
            );
        }
        report
    }

    fn runs_in(&self, site: Site, pass: PlacementPass) -> bool {
        match site {
            Site::Structure(i) => self.structures[i].def.post_pass == (pass == PlacementPass::PostPass),
            Site::Village(_) => pass == PlacementPass::Primary,
        }
    }

    fn site_code(&self, site: Site) -> &str {
        match site {
            Site::Structure(i) => self.structures[i].code(),
            Site::Village(i) => self.villages[i].code(),
        }
    }

    fn site_group(&self, site: Site) -> (&str, i32) {
        match site {
            Site::Structure(i) => {
                let def = &self.structures[i].def;
                (def.group.as_str(), def.min_group_distance)
            }
            Site::Village(i) => {
                let def = &self.villages[i].def;
                (def.group.as_str(), def.min_group_distance)
            }
        }
    }

    /// Every proposal of chunk `pos`, in site order.
    fn roll_chunk(&self, pos: ColumnPos, tuning: &StructureTuning) -> Vec<Proposal> {
        let mut out = Vec::new();
        let mut rng = SeededRandomStream::new(self.seed);
        let position = |rng: &mut SeededRandomStream| {
            (
                pos.block_x() + rng.next_int(CHUNK_SIZE as u32) as i32,
                pos.block_z() + rng.next_int(CHUNK_SIZE as u32) as i32,
            )
        };

        for (index, structure) in self.structures.iter().enumerate() {
            let def = &structure.def;
            rng.init_salted_position_seed(structure.salt, pos.x, pos.z);
            let chance = tuning.chance(&def.code, def.chance);
            let trials = roll_trials(&mut rng, chance, tuning.max_count(&def.code, def.max_count));
            for trial in 0..trials {
                let (x, z) = position(&mut rng);
                let schematic = rng.next_int(structure.rotations.len() as u32) as usize;
                let rolled = rng.next_int(4) as usize;
                let depth = def.underground_depth.sample(&mut rng).max(0.0) as i32;
                let priority = rng.next_u64();
                out.push(Proposal {
                    site: Site::Structure(index),
                    chunk: pos,
                    trial,
                    priority,
                    x,
                    z,
                    schematic,
                    rolled,
                    depth,
                    area: square(x, z, structure.span(schematic)),
                    anchor: square(x, z, 1),
                });
            }
        }

        for (index, village) in self.villages.iter().enumerate() {
            rng.init_salted_position_seed(village.salt, pos.x, pos.z);
            let chance = tuning.chance(&village.def.code, village.def.chance);
            if roll_trials(&mut rng, chance, 1) == 0 {
                continue;
            }
            let (x, z) = position(&mut rng);
            let priority = rng.next_u64();
            out.push(Proposal {
                site: Site::Village(index),
                chunk: pos,
                trial: 0,
                priority,
                x,
                z,
                schematic: 0,
                rolled: 0,
                depth: 0,
                area: square(x, z, village.span()),
                anchor: square(x, z, village.slot_reach() * 2 + 1),
            });
        }
        out
    }

    /// True unless a higher-ranked proposal overlaps or crowds `p`.
    fn survives(&self, p: &Proposal, rolls: &mut Rolls<'_>) -> bool {
        let (group, _) = self.site_group(p.site);
        let group_reach = self.group_reach.get(group).copied().unwrap_or(0);
        let reach = self.overlap_reach.max(group_reach);
        for dz in -reach..=reach {
            for dx in -reach..=reach {
                let near = dx.abs() <= self.overlap_reach && dz.abs() <= self.overlap_reach;
                for q in rolls.chunk(p.chunk.offset(dx, dz)) {
                    if q.rank() <= p.rank() {
                        continue;
                    }
                    if (near && q.area.intersects_xz(&p.area)) || self.crowds(p, q) {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn crowds(&self, p: &Proposal, q: &Proposal) -> bool {
        let (group, p_distance) = self.site_group(p.site);
        let (other, q_distance) = self.site_group(q.site);
        let distance = p_distance.max(q_distance);
        !group.is_empty()
            && group == other
            && distance > 0
            && gap_sq_xz(&p.anchor, &q.anchor) < i64::from(distance).pow(2)
    }

    /// Writes the part of a surviving structure inside `column`. For the
    /// chunk that rolled it, also records it. Returns whether it found a
    /// valid spot.
    #[allow(clippy::too_many_arguments)]
    fn realize_structure<A, L>(
        &self,
        structure: &ResolvedStructure,
        p: &Proposal,
        own: bool,
        column: &Cuboid,
        accessor: &mut A,
        ctx: &PlacementContext<'_, L>,
        report: &mut PlacementReport,
    ) -> bool
    where
        A: BlockAccessor + ?Sized,
        L: LatticeSampler + ?Sized,
    {
        let def = &structure.def;
        let Some(candidate) = self.structure_candidate(structure, p, &*accessor, ctx) else {
            return false;
        };
        let schematic = &structure.rotations[p.schematic][candidate.rotation.quarter_turns()];
        let mut written = schematic.place_within(accessor, candidate.origin, column);
        for &cell in &candidate.corridor {
            if in_xz(column, cell) && accessor.set_block(cell, BlockId::AIR) {
                written += 1;
            }
        }
        report.blocks_written += written;
        if !own {
            return true;
        }

        let record = GeneratedStructure {
            code: def.code.clone(),
            group: def.group.clone(),
            location: candidate.location,
            suppress_trees: def.suppress_trees,
            suppress_rivulets: def.suppress_rivulets,
            batch: p.priority,
        };
        if !commit(ctx.regions, vec![record]) {
            return true;
        }
        if def.build_protected {
            report.claims.push(LandClaim {
                area: candidate.location,
                protection_level: def.protection_level,
                description: def.protection_description.clone(),
                structure: def.code.clone(),
            });
        }
        report.placed.push(PlacedStructure {
            code: def.code.clone(),
            schematic: schematic.code.clone(),
            origin: candidate.origin,
            rotation: candidate.rotation,
            location: candidate.location,
            blocks_written: written,
        });
        true
    }

    fn structure_candidate<A, L>(
        &self,
        structure: &ResolvedStructure,
        p: &Proposal,
        accessor: &A,
        ctx: &PlacementContext<'_, L>,
    ) -> Option<Candidate>
    where
        A: BlockAccessor + ?Sized,
        L: LatticeSampler + ?Sized,
    {
        let def = &structure.def;
        let rotations = &structure.rotations[p.schematic];
        let (x, z) = (p.x, p.z);
        let candidate = match def.placement {
            Placement::Surface | Placement::SurfaceRuin => self.surface_candidate(
                &rotations[p.rolled],
                Rotation::from_quarter_turns(p.rolled),
                x,
                z,
                def.placement,
                def.max_height_difference,
                def.burial_offset,
                accessor,
            ),
            Placement::Underground => self.underground_candidate(rotations, p.rolled, x, z, p.depth, accessor),
        };
        let Some(candidate) = candidate else {
            tracing::trace!("{}: no valid spot at ({x}, {z})", def.code);
            return None;
        };
        if candidate.crosses(ctx.reserved) {
            tracing::trace!("{}: crosses a dungeon at ({x}, {z})", def.code);
            return None;
        }

        let climate = ctx
            .lattice
            .climate_at(x, z)
            .at_height(candidate.origin.y, self.sea_level, accessor.map_size_y());
        if !def.climate.contains(&climate) {
            tracing::trace!("{}: climate rejected at ({x}, {z})", def.code);
            return None;
        }
        Some(candidate)
    }

    #[allow(clippy::too_many_arguments)]
    fn realize_village<A, L>(
        &self,
        village: &ResolvedVillage,
        p: &Proposal,
        own: bool,
        column: &Cuboid,
        accessor: &mut A,
        ctx: &PlacementContext<'_, L>,
        report: &mut PlacementReport,
    ) -> bool
    where
        A: BlockAccessor + ?Sized,
        L: LatticeSampler + ?Sized,
    {
        let def = &village.def;
        let Some(picks) = self.village_layout(village, p, &*accessor, ctx) else {
            return false;
        };
        let mut placed = Vec::with_capacity(picks.len());
        for (building, candidate) in &picks {
            let building = &village.buildings[*building];
            let schematic = &building.rotations[candidate.rotation.quarter_turns()];
            let written = schematic.place_within(accessor, candidate.origin, column);
            report.blocks_written += written;
            placed.push(PlacedStructure {
                code: def.code.clone(),
                schematic: building.schematic.clone(),
                origin: candidate.origin,
                rotation: candidate.rotation,
                location: candidate.location,
                blocks_written: written,
            });
        }
        if !own {
            return true;
        }

        let records: Vec<GeneratedStructure> = placed
            .iter()
            .map(|b| GeneratedStructure {
                code: b.schematic.clone(),
                group: def.group.clone(),
                location: b.location,
                suppress_trees: def.suppress_trees,
                suppress_rivulets: def.suppress_rivulets,
                batch: p.priority,
            })
            .collect();
        if !commit(ctx.regions, records) {
            return true;
        }
        if def.build_protected {
            report.claims.extend(placed.iter().map(|b| LandClaim {
                area: b.location,
                protection_level: def.protection_level,
                description: def.protection_description.clone(),
                structure: def.code.clone(),
            }));
        }
        report.placed.extend(placed);
        tracing::debug!("Village {} placed at ({}, {})", def.code, p.x, p.z);
        true
    }

    /// Buildings and spots for a surviving village, or `None` when fewer
    /// than `min_buildings` fit. The layout rolls come from the proposal's
    /// priority, so every chunk the village touches lays it out the same.
    fn village_layout<A, L>(
        &self,
        village: &ResolvedVillage,
        p: &Proposal,
        accessor: &A,
        ctx: &PlacementContext<'_, L>,
    ) -> Option<Vec<(usize, Candidate)>>
    where
        A: BlockAccessor + ?Sized,
        L: LatticeSampler + ?Sized,
    {
        let def = &village.def;
        let mut rng = SeededRandomStream::from_state(self.seed, RngState(p.priority));
        let mut slots = village.slot_offsets();
        slots.shuffle(&mut rng);
        let mut wanted = Vec::new();
        for i in 0..village.buildings.len() {
            let count = village.roll_count(i, &mut rng);
            wanted.extend(std::iter::repeat_n(i, count as usize));
        }
        let rotations: Vec<usize> = wanted.iter().map(|_| rng.next_int(4) as usize).collect();

        let surface = accessor.terrain_height(p.x, p.z)?;
        let climate = ctx
            .lattice
            .climate_at(p.x, p.z)
            .at_height(surface, self.sea_level, accessor.map_size_y());
        if !def.climate.contains(&climate) {
            return None;
        }

        let mut picks: Vec<(usize, Candidate)> = Vec::new();
        let mut slots = slots.into_iter();
        'buildings: for (&building, &rolled) in wanted.iter().zip(&rotations) {
            let schematic = &village.buildings[building].rotations[rolled];
            for (dx, dz) in slots.by_ref() {
                let Some(candidate) = self.surface_candidate(
                    schematic,
                    Rotation::from_quarter_turns(rolled),
                    p.x + dx,
                    p.z + dz,
                    Placement::Surface,
                    def.max_height_difference,
                    0,
                    accessor,
                ) else {
                    continue;
                };
                if candidate.crosses(ctx.reserved) {
                    continue;
                }
                if picks.iter().all(|(_, c)| !c.location.intersects(&candidate.location)) {
                    picks.push((building, candidate));
                    continue 'buildings;
                }
            }
            break;
        }

        if (picks.len() as u32) < def.min_buildings || picks.is_empty() {
            tracing::trace!("{}: only {} buildings fit", def.code, picks.len());
            return None;
        }
        Some(picks)
    }

    // -- Geometry checks --

    /// Centres the schematic on `(x, z)` and checks the footprint corners and
    /// centre for slope and adjoining liquid.
    #[allow(clippy::too_many_arguments)]
    fn surface_candidate<A: BlockAccessor + ?Sized>(
        &self,
        schematic: &BlockSchematic,
        rotation: Rotation,
        x: i32,
        z: i32,
        placement: Placement,
        max_height_difference: i32,
        burial_offset: i32,
        accessor: &A,
    ) -> Option<Candidate> {
        let size = schematic.size;
        let (ox, oz) = (x - size.x / 2, z - size.z / 2);
        let probes = [
            (ox, oz),
            (ox + size.x - 1, oz),
            (ox, oz + size.z - 1),
            (ox + size.x - 1, oz + size.z - 1),
            (x, z),
        ];

        let mut min = i32::MAX;
        let mut max = i32::MIN;
        for (px, pz) in probes {
            let height = accessor.terrain_height(px, pz)?;
            if self.registry.is_liquid(accessor.terrain_block(IVec3::new(px, height + 1, pz))) {
                return None;
            }
            min = min.min(height);
            max = max.max(height);
        }

        let (tolerance, sink) = match placement {
            Placement::SurfaceRuin => (max_height_difference * RUIN_TOLERANCE_FACTOR, burial_offset),
            _ => (max_height_difference, 0),
        };
        if max - min > tolerance {
            return None;
        }

        let origin = IVec3::new(ox, min + 1 - sink + schematic.offset_y, oz);
        if origin.y < 1 || origin.y + size.y > accessor.map_size_y() {
            return None;
        }
        Some(Candidate {
            rotation,
            origin,
            location: schematic.footprint(origin),
            corridor: Vec::new(),
        })
    }

    /// With pathways: the first rotation (starting at `rolled`) and distance
    /// where a pathway runs into rock backed by air. Without pathways: the
    /// rolled rotation, if every probe sits in stone or soil.
    fn underground_candidate<A: BlockAccessor + ?Sized>(
        &self,
        rotations: &[BlockSchematic; 4],
        rolled: usize,
        x: i32,
        z: i32,
        depth: i32,
        accessor: &A,
    ) -> Option<Candidate> {
        let surface = accessor.terrain_height(x, z)?;
        let origin_for = |schematic: &BlockSchematic| {
            IVec3::new(
                x - schematic.size.x / 2,
                surface - depth - schematic.size.y + schematic.offset_y,
                z - schematic.size.z / 2,
            )
        };
        let candidate = |r: usize, origin: IVec3, corridor: Vec<IVec3>| Candidate {
            rotation: Rotation::from_quarter_turns(r),
            origin,
            location: rotations[r].footprint(origin),
            corridor,
        };

        if rotations[rolled].pathways.is_empty() {
            let schematic = &rotations[rolled];
            let origin = origin_for(schematic);
            if origin.y < 1 {
                return None;
            }
            let grounded = schematic.probes.iter().all(|&p| {
                matches!(
                    self.registry.material(accessor.terrain_block(origin + p)),
                    BlockMaterial::Stone | BlockMaterial::Soil
                )
            });
            return grounded.then(|| candidate(rolled, origin, Vec::new()));
        }

        for step in 0..4 {
            let r = (rolled + step) % 4;
            let schematic = &rotations[r];
            let origin = origin_for(schematic);
            if origin.y < 1 {
                return None;
            }
            for pathway in &schematic.pathways {
                for distance in 1..=MAX_PATHWAY_DISTANCE {
                    if self.pathway_opens(pathway, origin, distance, accessor) {
                        let normal = pathway.facing.normal();
                        let corridor = pathway
                            .cells
                            .iter()
                            .flat_map(|&cell| (1..=distance).map(move |k| origin + cell + normal * k))
                            .collect();
                        return Some(candidate(r, origin, corridor));
                    }
                }
            }
        }
        None
    }

    fn pathway_opens<A: BlockAccessor + ?Sized>(
        &self,
        pathway: &Pathway,
        origin: IVec3,
        distance: i32,
        accessor: &A,
    ) -> bool {
        let normal = pathway.facing.normal();
        !pathway.cells.is_empty()
            && pathway.cells.iter().all(|&cell| {
                let wall = origin + cell + normal * distance;
                self.registry.material(accessor.terrain_block(wall)) == BlockMaterial::Stone
                    && accessor.terrain_block(wall + normal).is_air()
            })
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Records a settled batch in the region of its first entry. Returns false
/// when the batch is already recorded.
fn commit(regions: &RegionCache, batch: Vec<GeneratedStructure>) -> bool {
    let Some(first) = batch.first() else {
        return false;
    };
    let id = first.batch;
    let anchor = first.location.center();
    regions
        .get_or_create(RegionPos::of_block(anchor.x, anchor.z))
        .try_commit(batch, |records| records.iter().all(|r| r.batch != id))
}
