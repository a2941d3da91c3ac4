//! Model geometry types and the importer contract.

pub mod importer;

pub use importer::{ImportError, Importer, ModelData};

use glam::Vec3;

/// Axis-aligned bounding box grown point by point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new() -> Aabb {
        Aabb {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn expand_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn expand(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

impl Default for Aabb {
    fn default() -> Aabb {
        Aabb::new()
    }
}

/// Mesh description as read from a model file: an element range plus the
/// material it draws with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshDescription {
    pub offset: usize,
    pub count: usize,
    pub material: String,
}

/// Importer output mesh: one per material, with combined bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub offset: usize,
    pub count: usize,
    pub material: String,
    pub bounds: Aabb,
}
