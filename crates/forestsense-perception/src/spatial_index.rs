//! Radius queries over a generated [`Field`].
//!
//! [`SpatialIndex`] is built once from an `Arc<Field>` snapshot and answers
//! "which field points lie within `radius` of this position?" for the
//! sensing loop. The field is static, so there is no insert/remove API and
//! the index never goes stale.

use std::sync::Arc;

use forestsense_types::Point3;
use tracing::debug;

use crate::field::Field;
use crate::octree::{Aabb, Octree};

/// Maximum entries per octree leaf before subdivision.
const LEAF_CAPACITY: usize = 16;

/// Maximum octree depth; bounds the tree for dense pillar columns.
const MAX_DEPTH: usize = 10;

/// Read-only radius-query index over one [`Field`] snapshot.
#[derive(Debug)]
pub struct SpatialIndex {
    field: Arc<Field>,
    tree: Octree,
}

impl SpatialIndex {
    /// Build the index over every point of `field`.
    pub fn build(field: Arc<Field>) -> Self {
        let origin = Point3::new(0.0, 0.0, 0.0);
        let bounds = Aabb::enclosing(field.points()).unwrap_or(Aabb::new(origin, origin));
        let mut tree = Octree::with_max_depth(bounds, LEAF_CAPACITY, MAX_DEPTH);
        for (i, p) in field.points().iter().enumerate() {
            tree.insert(i, *p);
        }
        debug!(points = tree.len(), "spatial index built");
        Self { field, tree }
    }

    /// The snapshot this index was built from.
    pub fn field(&self) -> &Arc<Field> {
        &self.field
    }

    /// Indices into [`field`][Self::field] of every point within `radius`
    /// of `center`, ascending.
    pub fn query_indices(&self, center: Point3, radius: f32) -> Vec<usize> {
        self.tree.query_radius(center, radius)
    }

    /// Every field point within `radius` of `center`, in field order.
    ///
    /// An empty result is a normal outcome, not an error.
    pub fn query(&self, center: Point3, radius: f32) -> Vec<Point3> {
        let points = self.field.points();
        self.query_indices(center, radius)
            .into_iter()
            .map(|i| points[i])
            .collect()
    }
}
