//! Procedural obstacle field generation.
//!
//! [`FieldGenerator`] scatters `obstacle_num` square pillars over a bounded
//! region and rasterises each one into a lattice of points at a fixed
//! `resolution`:
//!
//! 1. Draw a centre `(x, y)` uniformly inside the bounds and a width `w`
//!    uniformly inside `[lower_rad, upper_rad]`.
//! 2. Split the footprint into `n = ceil(w / resolution)` cells per side,
//!    offset from the centre by `k · resolution` for
//!    `k ∈ [-(n / 2), n - n / 2)`.
//! 3. For **every cell** draw a fresh height in `[lower_hei, upper_hei]` and
//!    stack points at `z = t · resolution` for `t ∈ [0, ceil(h / resolution))`.
//!
//! Per-cell heights give the pillars jagged tops. Cells that would land
//! outside the horizontal bounds are skipped, so every point of a [`Field`]
//! lies inside the region with `z ≥ 0`.
//!
//! # Example
//!
//! ```rust
//! use forestsense_perception::field::{FieldGenerator, FieldParams};
//!
//! let params = FieldParams { obstacle_num: 5, ..FieldParams::default() };
//! let field = FieldGenerator::with_seed(params, 7).generate();
//! assert!(field.points().iter().all(|p| p.z >= 0.0));
//! ```

use forestsense_types::Point3;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::info;

// ────────────────────────────────────────────────────────────────────────────
// Parameters
// ────────────────────────────────────────────────────────────────────────────

/// Shape and extent parameters for one field generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldParams {
    pub lower_x: f64,
    pub upper_x: f64,
    pub lower_y: f64,
    pub upper_y: f64,
    /// Obstacle width range (metres).
    pub lower_rad: f64,
    pub upper_rad: f64,
    /// Per-cell height range (metres).
    pub lower_hei: f64,
    pub upper_hei: f64,
    pub obstacle_num: usize,
    /// Lattice spacing in all three axes (metres).
    pub resolution: f64,
}

impl Default for FieldParams {
    fn default() -> Self {
        Self {
            lower_x: 0.0,
            upper_x: 100.0,
            lower_y: 0.0,
            upper_y: 100.0,
            lower_rad: 0.3,
            upper_rad: 0.8,
            lower_hei: 3.0,
            upper_hei: 7.0,
            obstacle_num: 30,
            resolution: 0.2,
        }
    }
}

impl FieldParams {
    fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.lower_x && x <= self.upper_x && y >= self.lower_y && y <= self.upper_y
    }
}

/// One obstacle's random draw. Heights are drawn per lattice cell during
/// [`FieldGenerator::rasterize`], not stored here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleSpec {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Field
// ────────────────────────────────────────────────────────────────────────────

/// The complete generated obstacle cloud, in generation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Field {
    points: Vec<Point3>,
}

impl Field {
    /// Wrap an existing point list.
    pub fn from_points(points: Vec<Point3>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FieldGenerator
// ────────────────────────────────────────────────────────────────────────────

/// Owns the RNG for a single generation run.
///
/// The generator is consumed by [`generate`][Self::generate], so a field can
/// only be produced once per generator.
#[derive(Debug)]
pub struct FieldGenerator {
    params: FieldParams,
    seed: u64,
    rng: ChaCha8Rng,
}

impl FieldGenerator {
    /// Create a generator seeded from the thread-local entropy source.
    ///
    /// The drawn seed is available via [`seed`][Self::seed] and logged by
    /// [`generate`][Self::generate] so a run can be reproduced.
    pub fn new(params: FieldParams) -> Self {
        Self::with_seed(params, rand::random())
    }

    /// Create a deterministic generator.
    pub fn with_seed(params: FieldParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn params(&self) -> &FieldParams {
        &self.params
    }

    /// Draw the next obstacle's centre and width.
    pub fn draw_obstacle(&mut self) -> ObstacleSpec {
        let p = &self.params;
        let (lx, ux, ly, uy) = (p.lower_x, p.upper_x, p.lower_y, p.upper_y);
        let (lw, uw) = (p.lower_rad, p.upper_rad);
        ObstacleSpec {
            center_x: uniform(&mut self.rng, lx, ux),
            center_y: uniform(&mut self.rng, ly, uy),
            width: uniform(&mut self.rng, lw, uw),
        }
    }

    /// Append the lattice points of `obstacle` to `out`.
    ///
    /// Obstacles narrower than one cell, or a non-positive resolution,
    /// contribute nothing.
    pub fn rasterize(&mut self, obstacle: &ObstacleSpec, out: &mut Vec<Point3>) {
        let res = self.params.resolution;
        if !(res > 0.0) {
            return;
        }
        let cells = (obstacle.width / res).ceil();
        if !(cells >= 1.0) {
            return;
        }
        let cells = cells as i64;
        let (first, last) = (-(cells / 2), cells - cells / 2);

        for r in first..last {
            let x = obstacle.center_x + r as f64 * res;
            for s in first..last {
                let y = obstacle.center_y + s as f64 * res;
                if !self.params.contains_xy(x, y) {
                    continue;
                }
                let height = uniform(&mut self.rng, self.params.lower_hei, self.params.upper_hei);
                let layers = (height / res).ceil().max(0.0) as i64;
                out.extend((0..layers).map(|t| Point3::new(x as f32, y as f32, (t as f64 * res) as f32)));
            }
        }
    }

    /// Generate the full field.
    pub fn generate(mut self) -> Field {
        let mut points = Vec::new();
        for _ in 0..self.params.obstacle_num {
            let obstacle = self.draw_obstacle();
            self.rasterize(&obstacle, &mut points);
        }
        info!(
            seed = self.seed,
            obstacles = self.params.obstacle_num,
            points = points.len(),
            "finished generating random map"
        );
        Field { points }
    }
}

/// Uniform draw from `[low, high]`; degenerate or inverted ranges yield `low`.
fn uniform(rng: &mut ChaCha8Rng, low: f64, high: f64) -> f64 {
    if high > low {
        rng.random_range(low..=high)
    } else {
        low
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
