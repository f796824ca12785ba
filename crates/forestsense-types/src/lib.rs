use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Reference frame every published point cloud is expressed in.
pub const WORLD_FRAME: &str = "world";

/// A point in 3-D space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    /// Create a new point.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean distance to `other`.
    pub fn distance_squared(&self, other: &Point3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// True when any coordinate is NaN.
    pub fn is_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan()
    }
}

/// Unified event wrapper for the headless event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "forestsense-runtime::sensing_loop"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Inbound pose update for the observer.
    Odometry(OdometryData),
    /// The complete obstacle field, published during the warm-up window.
    GlobalMap(PointCloudFrame),
    /// Obstacle points within sensing range of the observer.
    LocalMap(PointCloudFrame),
}

/// Observer pose and linear velocity, shaped after `nav_msgs/Odometry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdometryData {
    /// Origin label of the odometry source. Some labels are known to be
    /// non-physical and are rejected by the observer.
    pub child_frame_id: String,
    pub position_x: f32,
    pub position_y: f32,
    pub position_z: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub velocity_z: f32,
}

/// An ordered point cloud tagged with the frame it is expressed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudFrame {
    pub frame_id: String,
    pub points: Vec<Point3>,
}

impl PointCloudFrame {
    /// Wrap `points` in a frame expressed in [`WORLD_FRAME`].
    pub fn world(points: Vec<Point3>) -> Self {
        Self {
            frame_id: WORLD_FRAME.to_string(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Error type shared by every forestsense crate.
#[derive(Error, Debug)]
pub enum SenseError {
    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Bridge Error: {0}")]
    Bridge(String),
}
