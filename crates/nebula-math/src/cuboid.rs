use glam::IVec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned block-space box.
///
/// Invariant: `min <= max` on every axis. `min` is inclusive, `max` is
/// exclusive, so a single block at `p` is `Cuboid::new(p, p + 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cuboid {
    pub min: IVec3,
    pub max: IVec3,
}

impl Cuboid {
    /// Create a cuboid from two corners. Components are sorted so that
    /// `min <= max` on every axis.
    pub fn new(a: IVec3, b: IVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Create a cuboid from its minimum corner and size.
    pub fn from_origin_size(origin: IVec3, size: IVec3) -> Self {
        Self::new(origin, origin + size)
    }

    /// Returns true if the block position lies inside.
    pub fn contains(&self, p: IVec3) -> bool {
        p.x >= self.min.x
            && p.x < self.max.x
            && p.y >= self.min.y
            && p.y < self.max.y
            && p.z >= self.min.z
            && p.z < self.max.z
    }

    /// Returns true if the two cuboids share at least one block.
    /// Touching faces do not count.
    pub fn intersects(&self, other: &Cuboid) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Same as [`Cuboid::intersects`] but ignoring the Y axis.
    pub fn intersects_xz(&self, other: &Cuboid) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Smallest cuboid enclosing both.
    pub fn union(&self, other: &Cuboid) -> Cuboid {
        Cuboid {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Center block (integer division, rounds toward `min`).
    pub fn center(&self) -> IVec3 {
        self.min + (self.max - self.min) / 2
    }

    pub fn size(&self) -> IVec3 {
        self.max - self.min
    }

    pub fn volume(&self) -> i64 {
        let s = self.size();
        s.x as i64 * s.y as i64 * s.z as i64
    }

    /// Returns the cuboid moved by `offset`.
    pub fn translate(&self, offset: IVec3) -> Cuboid {
        Cuboid {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Returns a cuboid grown by `margin` on every side.
    pub fn expand_by(&self, margin: i32) -> Cuboid {
        Cuboid {
            min: self.min - IVec3::splat(margin),
            max: self.max + IVec3::splat(margin),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x == self.max.x || self.min.y == self.max.y || self.min.z == self.max.z
    }

    /// Horizontal squared distance between the centers of two cuboids.
    pub fn center_distance_sq_xz(&self, other: &Cuboid) -> i64 {
        let a = self.center();
        let b = other.center();
        let dx = (a.x - b.x) as i64;
        let dz = (a.z - b.z) as i64;
        dx * dx + dz * dz
    }
}
