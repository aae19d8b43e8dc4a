//! Extension points called by the generation context.

use nebula_structures::{LandClaim, PlacedStructure};
use nebula_voxel::{BlockAccessor, ColumnPos, GenPass};

/// Runs after the core work of a pass on one column, before the pass is
/// marked complete. Vegetation and other out-of-core passes hook in here.
pub trait ColumnPassListener: Send + Sync {
    fn on_column_pass(&self, pass: GenPass, pos: ColumnPos, accessor: &mut dyn BlockAccessor);
}

/// Observes structure placements and the claims they emit.
pub trait StructureListener: Send + Sync {
    fn on_structure_placed(&self, structure: &PlacedStructure);

    fn on_land_claim(&self, _claim: &LandClaim) {}
}

/// Listeners registered on one generation context, called in registration order.
#[derive(Default)]
pub struct GenerationListeners {
    column: Vec<(GenPass, Box<dyn ColumnPassListener>)>,
    structure: Vec<Box<dyn StructureListener>>,
}

impl GenerationListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_column_listener(&mut self, pass: GenPass, listener: Box<dyn ColumnPassListener>) {
        self.column.push((pass, listener));
    }

    pub fn add_structure_listener(&mut self, listener: Box<dyn StructureListener>) {
        self.structure.push(listener);
    }

    pub fn column_listener_count(&self) -> usize {
        self.column.len()
    }

    pub fn structure_listener_count(&self) -> usize {
        self.structure.len()
    }

    pub(crate) fn column_pass(&self, pass: GenPass, pos: ColumnPos, accessor: &mut dyn BlockAccessor) {
        for (_, listener) in self.column.iter().filter(|(p, _)| *p == pass) {
            listener.on_column_pass(pass, pos, accessor);
        }
    }

    pub(crate) fn structures(&self, placed: &[PlacedStructure], claims: &[LandClaim]) {
        for listener in &self.structure {
            for structure in placed {
                listener.on_structure_placed(structure);
            }
            for claim in claims {
                listener.on_land_claim(claim);
            }
        }
    }
}

impl std::fmt::Debug for GenerationListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationListeners")
            .field("column", &self.column.len())
            .field("structure", &self.structure.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use nebula_voxel::{ChunkColumn, ColumnStore};

    struct Counter(Arc<AtomicUsize>);

    impl ColumnPassListener for Counter {
        fn on_column_pass(&self, _pass: GenPass, _pos: ColumnPos, _accessor: &mut dyn BlockAccessor) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_column_listeners_filter_by_pass() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut listeners = GenerationListeners::new();
        listeners.add_column_listener(GenPass::Vegetation, Box::new(Counter(Arc::clone(&count))));

        let mut store = ColumnStore::new(16);
        store.insert(ChunkColumn::new(ColumnPos::new(0, 0), 16));
        listeners.column_pass(GenPass::Terrain, ColumnPos::new(0, 0), &mut store);
        assert_eq!(count.load(Ordering::Relaxed), 0);
        listeners.column_pass(GenPass::Vegetation, ColumnPos::new(0, 0), &mut store);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
