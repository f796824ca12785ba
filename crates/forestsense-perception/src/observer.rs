//! Latest-known observer pose.
//!
//! [`ObserverState`] is the single write side: the pose listener feeds every
//! inbound [`OdometryData`] into it. [`ObserverReader`] is the read side held
//! by the sensing loop. Both wrap one `tokio::sync::watch` cell, so a read
//! always sees a complete sample (never half of one update and half of the
//! next) and no lock is held while the reader works with its copy.
//!
//! Updates whose `child_frame_id` is in the excluded set (by default `"X"`
//! and `"O"`, the labels of known non-physical odometry sources) are dropped.
//!
//! # Example
//!
//! ```rust
//! use forestsense_perception::observer::ObserverState;
//! use forestsense_types::OdometryData;
//!
//! let state = ObserverState::default();
//! let reader = state.reader();
//! assert!(!reader.is_available());
//!
//! state.update(&OdometryData {
//!     child_frame_id: "base_link".into(),
//!     position_x: 1.0, position_y: 2.0, position_z: 0.5,
//!     velocity_x: 0.0, velocity_y: 0.0, velocity_z: 0.0,
//! });
//! assert_eq!(reader.snapshot().unwrap().position.y, 2.0);
//! ```

use std::collections::HashSet;

use forestsense_types::{OdometryData, Point3};
use tokio::sync::watch;

/// Origin labels rejected by [`ObserverState::default`].
pub const DEFAULT_EXCLUDED_FRAMES: [&str; 2] = ["X", "O"];

/// One accepted pose update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverSample {
    pub position: Point3,
    /// Linear velocity (m/s) in the world frame.
    pub velocity: [f32; 3],
}

impl From<&OdometryData> for ObserverSample {
    fn from(odom: &OdometryData) -> Self {
        Self {
            position: Point3::new(odom.position_x, odom.position_y, odom.position_z),
            velocity: [odom.velocity_x, odom.velocity_y, odom.velocity_z],
        }
    }
}

/// Write side of the observer cell.
#[derive(Debug)]
pub struct ObserverState {
    tx: watch::Sender<Option<ObserverSample>>,
    excluded: HashSet<String>,
}

impl ObserverState {
    /// Create an empty state that ignores updates from `excluded` origins.
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, _) = watch::channel(None);
        Self {
            tx,
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    /// Overwrite the current sample with `odom`.
    ///
    /// Returns `false` without touching the state when the update's origin
    /// label is excluded.
    pub fn update(&self, odom: &OdometryData) -> bool {
        if self.excluded.contains(&odom.child_frame_id) {
            return false;
        }
        self.tx.send_replace(Some(ObserverSample::from(odom)));
        true
    }

    /// True once any update has been accepted.
    pub fn is_available(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The most recently accepted sample.
    pub fn current(&self) -> Option<ObserverSample> {
        *self.tx.borrow()
    }

    /// True when updates from `origin` are dropped.
    pub fn is_excluded(&self, origin: &str) -> bool {
        self.excluded.contains(origin)
    }

    /// Create a read handle for the sensing loop.
    pub fn reader(&self) -> ObserverReader {
        ObserverReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ObserverState {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_FRAMES)
    }
}

/// Read side of the observer cell.
#[derive(Debug, Clone)]
pub struct ObserverReader {
    rx: watch::Receiver<Option<ObserverSample>>,
}

impl ObserverReader {
    /// Copy out the latest sample, or `None` if no update was ever accepted.
    pub fn snapshot(&self) -> Option<ObserverSample> {
        *self.rx.borrow()
    }

    /// True once any update has been accepted.
    pub fn is_available(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn odom(frame: &str, x: f32, y: f32, z: f32) -> OdometryData {
        OdometryData {
            child_frame_id: frame.to_string(),
            position_x: x,
            position_y: y,
            position_z: z,
            velocity_x: 0.5,
            velocity_y: -0.5,
            velocity_z: 0.0,
        }
    }

    #[test]
    fn unavailable_until_first_update() {
        let state = ObserverState::default();
        let reader = state.reader();
        assert!(!state.is_available());
        assert!(!reader.is_available());
        assert!(reader.snapshot().is_none());
    }

    #[test]
    fn update_is_visible_to_reader() {
        let state = ObserverState::default();
        let reader = state.reader();
        assert!(state.update(&odom("base_link", 1.0, 2.0, 3.0)));

        let sample = reader.snapshot().unwrap();
        assert_eq!(sample.position, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(sample.velocity, [0.5, -0.5, 0.0]);
        assert!(reader.is_available());
    }

    #[test]
    fn last_write_wins() {
        let state = ObserverState::default();
        let reader = state.reader();
        state.update(&odom("base_link", 1.0, 1.0, 1.0));
        state.update(&odom("base_link", 7.0, 8.0, 9.0));
        assert_eq!(reader.snapshot().unwrap().position, Point3::new(7.0, 8.0, 9.0));
    }

    #[test]
    fn excluded_origin_does_not_overwrite() {
        let state = ObserverState::default();
        let reader = state.reader();
        assert!(state.update(&odom("base_link", 1.0, 2.0, 3.0)));

        assert!(!state.update(&odom("X", 50.0, 50.0, 50.0)));
        assert!(!state.update(&odom("O", 60.0, 60.0, 60.0)));

        assert_eq!(reader.snapshot().unwrap().position, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn excluded_origin_alone_leaves_state_unavailable() {
        let state = ObserverState::default();
        assert!(!state.update(&odom("X", 1.0, 1.0, 1.0)));
        assert!(!state.is_available());
        assert!(state.current().is_none());
    }

    #[test]
    fn custom_exclusion_set() {
        let state = ObserverState::new(["sim_ghost"]);
        assert!(state.is_excluded("sim_ghost"));
        assert!(!state.is_excluded("X"));
        assert!(state.update(&odom("X", 1.0, 1.0, 1.0)));
        assert!(!state.update(&odom("sim_ghost", 2.0, 2.0, 2.0)));
        assert_eq!(state.current().unwrap().position, Point3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn nan_position_is_stored_verbatim() {
        let state = ObserverState::default();
        state.update(&odom("base_link", f32::NAN, 0.0, 0.0));
        assert!(state.current().unwrap().position.is_nan());
    }

    #[test]
    fn reader_clones_share_the_cell() {
        let state = ObserverState::default();
        let a = state.reader();
        let b = a.clone();
        state.update(&odom("base_link", 4.0, 4.0, 0.0));
        assert_eq!(a.snapshot(), b.snapshot());
    }
}
