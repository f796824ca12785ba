//! `forestsense-perception` – the simulated world and its spatial queries.
//!
//! # Modules
//!
//! - [`field`] – [`FieldGenerator`][field::FieldGenerator]: scatters random
//!   pillars over a bounded region and rasterises them into a point cloud.
//! - [`octree`] – [`Octree`][octree::Octree]: partitions 3-D space so radius
//!   queries only visit nearby points.
//! - [`spatial_index`] – [`SpatialIndex`][spatial_index::SpatialIndex]: the
//!   read-only radius-query view over one generated field.
//! - [`observer`] – [`ObserverState`][observer::ObserverState] and
//!   [`ObserverReader`][observer::ObserverReader]: last-write-wins cell
//!   holding the observer's most recent pose.

pub mod field;
pub mod observer;
pub mod octree;
pub mod spatial_index;

pub use field::{Field, FieldGenerator, FieldParams, ObstacleSpec};
pub use observer::{ObserverReader, ObserverSample, ObserverState};
pub use spatial_index::SpatialIndex;
