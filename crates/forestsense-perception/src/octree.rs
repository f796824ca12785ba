//! Octree spatial partitioning.
//!
//! Partitions 3-D space using a recursive **Octree** so that radius queries
//! against a static cloud only visit the nodes that can possibly intersect
//! the query sphere.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`Aabb`]     | An axis-aligned bounding box.                          |
//! | [`Octree`]   | Spatial index over `(index, point)` entries.           |
//!
//! # Example
//!
//! ```rust
//! use forestsense_perception::octree::{Aabb, Octree};
//! use forestsense_types::Point3;
//!
//! let bounds = Aabb::new(Point3::new(-10.0, -10.0, -10.0),
//!                        Point3::new( 10.0,  10.0,  10.0));
//! let mut tree = Octree::new(bounds, 8);
//!
//! tree.insert(0, Point3::new(1.0, 2.0, 3.0));
//! tree.insert(1, Point3::new(9.0, 9.0, 9.0));
//!
//! assert_eq!(tree.query_radius(Point3::new(1.0, 2.0, 2.5), 1.0), vec![0]);
//! ```

use forestsense_types::Point3;

// ────────────────────────────────────────────────────────────────────────────
// Aabb
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    /// Create a bounding box from its two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Smallest box containing every point in `points`, or `None` when the
    /// slice is empty.
    pub fn enclosing(points: &[Point3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut min = *first;
        let mut max = *first;
        for p in rest {
            min = Point3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Point3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        Some(Self { min, max })
    }

    /// Return the centre point of the box.
    pub fn centre(&self) -> Point3 {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// True when the point lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Squared distance from `p` to the closest point of the box (zero when
    /// `p` is inside).
    pub fn distance_squared_to(&self, p: Point3) -> f32 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        dx * dx + dy * dy + dz * dz
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Octree
// ────────────────────────────────────────────────────────────────────────────

/// A recursive spatial index that subdivides 3-D space into eight octants.
///
/// Each entry is a point tagged with the caller's index for it. Entries are
/// stored in the deepest node whose bounding box still contains them.
/// Subdividing stops when either
/// - the number of entries in a node is ≤ `capacity`, or
/// - `max_depth` levels have already been created.
#[derive(Debug)]
pub struct Octree {
    root: OctreeNode,
    max_depth: usize,
}

impl Octree {
    /// Create an empty octree covering `bounds`.
    ///
    /// - `capacity` – maximum entries per leaf before subdivision is attempted.
    pub fn new(bounds: Aabb, capacity: usize) -> Self {
        Self {
            root: OctreeNode::new(bounds, capacity),
            max_depth: 8,
        }
    }

    /// Create an empty octree with an explicit maximum subdivision depth.
    pub fn with_max_depth(bounds: Aabb, capacity: usize, max_depth: usize) -> Self {
        Self {
            root: OctreeNode::new(bounds, capacity),
            max_depth,
        }
    }

    /// Insert `point` under `index`.
    ///
    /// Returns `false` (and stores nothing) when the point lies outside the
    /// root bounding box.
    pub fn insert(&mut self, index: usize, point: Point3) -> bool {
        if !self.root.bounds.contains_point(point) {
            return false;
        }
        self.root.insert(index, point, self.max_depth, 0);
        true
    }

    /// Return the total number of entries stored in the tree.
    pub fn len(&self) -> usize {
        self.root.count()
    }

    /// True when the tree contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices of every entry within Euclidean distance `radius` of
    /// `center` (boundary inclusive), sorted ascending.
    ///
    /// A NaN/infinite centre or a negative/non-finite radius matches nothing.
    pub fn query_radius(&self, center: Point3, radius: f32) -> Vec<usize> {
        let finite = center.x.is_finite() && center.y.is_finite() && center.z.is_finite();
        if !finite || !radius.is_finite() || radius < 0.0 {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.root.query_radius(center, radius * radius, &mut out);
        out.sort_unstable();
        out
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OctreeNode – internal implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct OctreeNode {
    bounds: Aabb,
    capacity: usize,
    /// Entries stored at this node (only non-empty when the node is a leaf).
    entries: Vec<(usize, Point3)>,
    /// Eight children; `None` while this node is a leaf.
    children: Option<Box<[OctreeNode; 8]>>,
}

impl OctreeNode {
    fn new(bounds: Aabb, capacity: usize) -> Self {
        Self {
            bounds,
            capacity,
            entries: Vec::new(),
            children: None,
        }
    }

    fn count(&self) -> usize {
        match &self.children {
            None => self.entries.len(),
            Some(children) => children.iter().map(|c| c.count()).sum(),
        }
    }

    fn insert(&mut self, index: usize, point: Point3, max_depth: usize, depth: usize) {
        match self.children.as_mut() {
            None => {
                self.entries.push((index, point));
                // Subdivide when over capacity and depth budget remains.
                if self.entries.len() > self.capacity && depth < max_depth {
                    self.subdivide(max_depth, depth);
                }
            }
            Some(children) => {
                if let Some(child) = children.iter_mut().find(|c| c.bounds.contains_point(point)) {
                    child.insert(index, point, max_depth, depth + 1);
                }
            }
        }
    }

    fn query_radius(&self, center: Point3, radius_sq: f32, out: &mut Vec<usize>) {
        if self.bounds.distance_squared_to(center) > radius_sq {
            return;
        }
        match &self.children {
            None => out.extend(
                self.entries
                    .iter()
                    .filter(|(_, p)| p.distance_squared(&center) <= radius_sq)
                    .map(|(i, _)| *i),
            ),
            Some(children) => {
                for child in children.iter() {
                    child.query_radius(center, radius_sq, out);
                }
            }
        }
    }

    /// Split this leaf into eight children and redistribute existing entries.
    fn subdivide(&mut self, max_depth: usize, depth: usize) {
        let c = self.bounds.centre();
        let min = self.bounds.min;
        let max = self.bounds.max;

        let octants = [
            Aabb::new(min, c),
            Aabb::new(Point3::new(c.x, min.y, min.z), Point3::new(max.x, c.y, c.z)),
            Aabb::new(Point3::new(min.x, c.y, min.z), Point3::new(c.x, max.y, c.z)),
            Aabb::new(Point3::new(c.x, c.y, min.z), Point3::new(max.x, max.y, c.z)),
            Aabb::new(Point3::new(min.x, min.y, c.z), Point3::new(c.x, c.y, max.z)),
            Aabb::new(Point3::new(c.x, min.y, c.z), Point3::new(max.x, c.y, max.z)),
            Aabb::new(Point3::new(min.x, c.y, c.z), Point3::new(c.x, max.y, max.z)),
            Aabb::new(c, max),
        ];

        let cap = self.capacity;
        let mut children = Box::new(octants.map(|b| OctreeNode::new(b, cap)));

        let entries = std::mem::take(&mut self.entries);
        for (index, p) in entries {
            if let Some(child) = children.iter_mut().find(|c| c.bounds.contains_point(p)) {
                child.insert(index, p, max_depth, depth + 1);
            }
        }

        self.children = Some(children);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
