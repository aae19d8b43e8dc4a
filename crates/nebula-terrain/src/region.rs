//! Map regions: the per-region lattice cache, structure records and
//! opaque mod-data, plus the [`RegionCache`] that owns loaded regions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use dashmap::DashMap;
use nebula_math::Cuboid;
use nebula_voxel::ColumnPos;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::lattice::{LatticeGenerator, REGION_CHUNKS, REGION_SIZE, RegionLattice};

/// Format version prefixed to every encoded region payload.
pub const REGION_FORMAT_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Region-grid position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn of_column(pos: ColumnPos) -> Self {
        Self {
            x: pos.x.div_euclid(REGION_CHUNKS),
            z: pos.z.div_euclid(REGION_CHUNKS),
        }
    }

    pub fn of_block(x: i32, z: i32) -> Self {
        Self {
            x: x.div_euclid(REGION_SIZE),
            z: z.div_euclid(REGION_SIZE),
        }
    }

    /// This region and its eight neighbours, row by row.
    pub fn neighborhood(self) -> impl Iterator<Item = RegionPos> {
        (-1..=1).flat_map(move |dz| (-1..=1).map(move |dx| RegionPos::new(self.x + dx, self.z + dz)))
    }
}

/// A structure placement recorded in its region. Never moved or shrunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedStructure {
    pub code: String,
    pub group: String,
    pub location: Cuboid,
    pub suppress_trees: bool,
    pub suppress_rivulets: bool,
    /// Placements committed together share a batch id and may touch.
    pub batch: u64,
}

impl GeneratedStructure {
    fn sort_key(&self) -> (u64, [i32; 3], &str) {
        (self.batch, self.location.min.to_array(), &self.code)
    }
}

/// Errors of the region payload codec.
#[derive(Debug, thiserror::Error)]
pub enum RegionDataError {
    #[error("empty payload, no version byte")]
    EmptyPayload,

    #[error("unsupported region data version: {0}")]
    UnsupportedVersion(u8),

    #[error("region was generated with seed {found}, cache uses seed {expected}")]
    SeedMismatch { expected: u64, found: u64 },

    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
}

/// Encodes `value` as `[version: u8] [postcard body]`.
pub fn encode_versioned<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, RegionDataError> {
    let body = postcard::to_allocvec(value)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(REGION_FORMAT_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Inverse of [`encode_versioned`].
pub fn decode_versioned<T: DeserializeOwned>(data: &[u8]) -> Result<T, RegionDataError> {
    let Some((&version, body)) = data.split_first() else {
        return Err(RegionDataError::EmptyPayload);
    };
    if version != REGION_FORMAT_VERSION {
        return Err(RegionDataError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// MapRegion
// ---------------------------------------------------------------------------

/// Shared per-region generation state.
///
/// The lattice is built at most once: concurrent first accesses block on the
/// same [`OnceLock`] and all observe the winner's instance. Structure and
/// mod-data lists are guarded per region.
#[derive(Debug)]
pub struct MapRegion {
    pos: RegionPos,
    lattice: OnceLock<Arc<RegionLattice>>,
    structures: Mutex<Vec<GeneratedStructure>>,
    mod_data: Mutex<FxHashMap<String, Vec<u8>>>,
    dirty: AtomicBool,
}

impl MapRegion {
    pub fn new(pos: RegionPos) -> Self {
        Self {
            pos,
            lattice: OnceLock::new(),
            structures: Mutex::new(Vec::new()),
            mod_data: Mutex::new(FxHashMap::default()),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn pos(&self) -> RegionPos {
        self.pos
    }

    /// The region's lattice, generating it on first access.
    pub fn lattice(&self, generator: &LatticeGenerator) -> Arc<RegionLattice> {
        Arc::clone(self.lattice.get_or_init(|| {
            tracing::debug!("Generating lattice for region {:?}", self.pos);
            self.dirty.store(true, Ordering::Release);
            Arc::new(generator.generate_region(self.pos))
        }))
    }

    pub fn cached_lattice(&self) -> Option<Arc<RegionLattice>> {
        self.lattice.get().cloned()
    }

    /// Snapshot of the recorded structures.
    pub fn structures(&self) -> Vec<GeneratedStructure> {
        lock(&self.structures).clone()
    }

    pub fn structure_count(&self) -> usize {
        lock(&self.structures).len()
    }

    /// Adds `batch` if `accept` approves it against the current records.
    ///
    /// The check and the insert happen under one lock. Records are kept
    /// sorted by batch and position, so the list does not depend on the
    /// order batches arrive in.
    pub fn try_commit(
        &self,
        batch: Vec<GeneratedStructure>,
        accept: impl FnOnce(&[GeneratedStructure]) -> bool,
    ) -> bool {
        let mut structures = lock(&self.structures);
        if !accept(&structures) {
            return false;
        }
        structures.extend(batch);
        structures.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        self.dirty.store(true, Ordering::Release);
        true
    }

    /// Decodes the mod-data stored under `key`. Absent data is `Ok(None)`.
    pub fn mod_data<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RegionDataError> {
        lock(&self.mod_data)
            .get(key)
            .map(|bytes| decode_versioned(bytes))
            .transpose()
    }

    pub fn set_mod_data<T: Serialize>(&self, key: &str, value: &T) -> Result<(), RegionDataError> {
        let bytes = encode_versioned(value)?;
        lock(&self.mod_data).insert(key.to_string(), bytes);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Decodes, mutates and re-encodes the mod-data under `key` while
    /// holding the region's mod-data lock. Absent data starts as `T::default()`.
    pub fn update_mod_data<T, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> Result<R, RegionDataError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let mut guard = lock(&self.mod_data);
        let mut value: T = match guard.get(key) {
            Some(bytes) => decode_versioned(bytes)?,
            None => T::default(),
        };
        let result = f(&mut value);
        guard.insert(key.to_string(), encode_versioned(&value)?);
        self.dirty.store(true, Ordering::Release);
        Ok(result)
    }

    /// Whether anything changed since the region was created or restored.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn to_persisted(&self, seed: u64) -> PersistedRegion {
        let mut mod_data: Vec<(String, Vec<u8>)> = lock(&self.mod_data)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        mod_data.sort_by(|a, b| a.0.cmp(&b.0));
        PersistedRegion {
            seed,
            pos: self.pos,
            lattice: self.cached_lattice().map(|l| (*l).clone()),
            structures: self.structures(),
            mod_data,
        }
    }

    fn from_persisted(persisted: PersistedRegion) -> Self {
        let region = Self::new(persisted.pos);
        if let Some(lattice) = persisted.lattice {
            let _ = region.lattice.set(Arc::new(lattice));
        }
        *lock(&region.structures) = persisted.structures;
        *lock(&region.mod_data) = persisted.mod_data.into_iter().collect();
        region
    }
}

/// Everything a region owns, in a form the external store can keep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedRegion {
    pub seed: u64,
    pub pos: RegionPos,
    pub lattice: Option<RegionLattice>,
    pub structures: Vec<GeneratedStructure>,
    pub mod_data: Vec<(String, Vec<u8>)>,
}

impl PersistedRegion {
    pub fn to_bytes(&self) -> Result<Vec<u8>, RegionDataError> {
        encode_versioned(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, RegionDataError> {
        decode_versioned(data)
    }
}

// ---------------------------------------------------------------------------
// RegionCache
// ---------------------------------------------------------------------------

/// Loaded regions of one world seed.
///
/// Uses [`DashMap`] so workers in different regions never contend on a
/// global lock.
pub struct RegionCache {
    seed: u64,
    regions: DashMap<RegionPos, Arc<MapRegion>>,
}

impl RegionCache {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            regions: DashMap::new(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The loaded region at `pos`, creating an empty one if needed.
    pub fn get_or_create(&self, pos: RegionPos) -> Arc<MapRegion> {
        let entry = self
            .regions
            .entry(pos)
            .or_insert_with(|| Arc::new(MapRegion::new(pos)));
        Arc::clone(entry.value())
    }

    pub fn get(&self, pos: RegionPos) -> Option<Arc<MapRegion>> {
        self.regions.get(&pos).map(|r| Arc::clone(r.value()))
    }

    pub fn is_loaded(&self, pos: RegionPos) -> bool {
        self.regions.contains_key(&pos)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sorted positions of every loaded region.
    pub fn loaded_positions(&self) -> Vec<RegionPos> {
        let mut positions: Vec<RegionPos> = self.regions.iter().map(|r| *r.key()).collect();
        positions.sort_unstable();
        positions
    }

    /// Evicts a region and hands back its persisted form.
    pub fn unload(&self, pos: RegionPos) -> Option<PersistedRegion> {
        let (_, region) = self.regions.remove(&pos)?;
        tracing::debug!("Unloading region {pos:?}");
        Some(region.to_persisted(self.seed))
    }

    /// Persisted form of a loaded region without evicting it.
    pub fn snapshot(&self, pos: RegionPos) -> Option<PersistedRegion> {
        self.get(pos).map(|region| region.to_persisted(self.seed))
    }

    /// Loads a persisted region. An already-loaded region at the same
    /// position is kept as is and returned instead.
    pub fn restore(&self, persisted: PersistedRegion) -> Result<Arc<MapRegion>, RegionDataError> {
        if persisted.seed != self.seed {
            return Err(RegionDataError::SeedMismatch {
                expected: self.seed,
                found: persisted.seed,
            });
        }
        let pos = persisted.pos;
        let entry = self
            .regions
            .entry(pos)
            .or_insert_with(|| Arc::new(MapRegion::from_persisted(persisted)));
        Ok(Arc::clone(entry.value()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::climate::ClimateEnvelope;
    use crate::lattice::ZoneEntry;
    use glam::IVec3;

    fn generator() -> LatticeGenerator {
        let one = vec![ZoneEntry {
            weight: 1.0,
            envelope: ClimateEnvelope::default(),
        }];
        LatticeGenerator::new(42, one.clone(), one, &[])
    }

    fn record(code: &str, batch: u64) -> GeneratedStructure {
        GeneratedStructure {
            code: code.into(),
            group: "ruins".into(),
            location: Cuboid::from_origin_size(IVec3::new(0, 100, 0), IVec3::new(5, 5, 5)),
            suppress_trees: true,
            suppress_rivulets: false,
            batch,
        }
    }

    #[test]
    fn test_region_pos_of_column_negative() {
        assert_eq!(RegionPos::of_column(ColumnPos::new(-1, 16)), RegionPos::new(-1, 1));
        assert_eq!(RegionPos::of_block(511, -512), RegionPos::new(0, -1));
        assert_eq!(RegionPos::new(0, 0).neighborhood().count(), 9);
    }

    #[test]
    fn test_lattice_is_cached() {
        let generator = generator();
        let cache = RegionCache::new(42);
        let region = cache.get_or_create(RegionPos::new(2, 3));
        let first = region.lattice(&generator);
        let second = cache.get_or_create(RegionPos::new(2, 3)).lattice(&generator);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_concurrent_first_access_single_instance() {
        let generator = Arc::new(generator());
        let region = Arc::new(MapRegion::new(RegionPos::new(0, 0)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                let region = Arc::clone(&region);
                std::thread::spawn(move || region.lattice(&generator))
            })
            .collect();
        let lattices: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for lattice in &lattices[1..] {
            assert!(Arc::ptr_eq(&lattices[0], lattice));
        }
    }

    #[test]
    fn test_try_commit_respects_check() {
        let region = MapRegion::new(RegionPos::new(0, 0));
        assert!(region.try_commit(vec![record("a", 1)], |existing| existing.is_empty()));
        assert!(!region.try_commit(vec![record("b", 2)], |existing| existing.is_empty()));
        assert_eq!(region.structure_count(), 1);
    }

    #[test]
    fn test_commit_order_does_not_change_records() {
        let forward = MapRegion::new(RegionPos::new(0, 0));
        let backward = MapRegion::new(RegionPos::new(0, 0));
        for batch in [5, 1, 3] {
            forward.try_commit(vec![record("a", batch)], |_| true);
        }
        for batch in [3, 1, 5] {
            backward.try_commit(vec![record("a", batch)], |_| true);
        }
        assert_eq!(forward.structures(), backward.structures());
        let batches: Vec<u64> = forward.structures().iter().map(|r| r.batch).collect();
        assert_eq!(batches, vec![1, 3, 5]);
    }

    #[test]
    fn test_absent_mod_data_is_none() {
        let region = MapRegion::new(RegionPos::new(0, 0));
        let data: Option<Vec<u32>> = region.mod_data("missing").unwrap();
        assert!(data.is_none());
    }

    #[test]
    fn test_update_mod_data_starts_from_default() {
        let region = MapRegion::new(RegionPos::new(0, 0));
        region
            .update_mod_data("counter", |v: &mut Vec<u32>| v.push(7))
            .unwrap();
        region
            .update_mod_data("counter", |v: &mut Vec<u32>| v.push(8))
            .unwrap();
        assert_eq!(region.mod_data::<Vec<u32>>("counter").unwrap(), Some(vec![7, 8]));
    }

    #[test]
    fn test_unload_restore_roundtrip() {
        let generator = generator();
        let cache = RegionCache::new(42);
        let pos = RegionPos::new(-3, 1);
        let region = cache.get_or_create(pos);
        let lattice = region.lattice(&generator);
        region.try_commit(vec![record("tower", 9)], |_| true);
        region.set_mod_data("tasks", &vec![1u8, 2, 3]).unwrap();
        drop(region);

        let bytes = cache.unload(pos).unwrap().to_bytes().unwrap();
        assert!(!cache.is_loaded(pos));

        let restored = cache.restore(PersistedRegion::from_bytes(&bytes).unwrap()).unwrap();
        assert_eq!(*restored.cached_lattice().unwrap(), *lattice);
        assert_eq!(restored.structures(), vec![record("tower", 9)]);
        assert_eq!(restored.mod_data::<Vec<u8>>("tasks").unwrap(), Some(vec![1, 2, 3]));
        assert!(!restored.is_dirty());
    }

    #[test]
    fn test_restore_rejects_other_seed() {
        let cache = RegionCache::new(1);
        let other = RegionCache::new(2);
        other.get_or_create(RegionPos::new(0, 0));
        let persisted = other.unload(RegionPos::new(0, 0)).unwrap();
        assert!(matches!(
            cache.restore(persisted),
            Err(RegionDataError::SeedMismatch { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_version() {
        assert!(matches!(decode_versioned::<u32>(&[]), Err(RegionDataError::EmptyPayload)));
        assert!(matches!(
            decode_versioned::<u32>(&[99, 0]),
            Err(RegionDataError::UnsupportedVersion(99))
        ));
    }
}
