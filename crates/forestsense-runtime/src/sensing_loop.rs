//! [`SensingLoop`] – the fixed-rate simulated depth sensor.
//!
//! Each tick:
//!
//! 1. **Warm-up** – while fewer than `global_map_ticks` ticks have elapsed,
//!    publish the whole field on [`Topic::GlobalMap`].
//! 2. **Gate** – stop unless a field exists and a pose has been accepted.
//! 3. **Guard** – stop if the observer position contains a NaN.
//! 4. **Sense** – radius-query the [`SpatialIndex`] around the observer.
//! 5. **Publish** – an empty result is logged and skipped; anything else is
//!    published on [`Topic::LocalMap`].
//!
//! Nothing in a tick is fatal. Every anomaly degrades to "no local map this
//! tick" and the [`TickReport`] says why.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use forestsense_middleware::EventBus;
//! use forestsense_perception::{FieldGenerator, FieldParams, ObserverState, SpatialIndex};
//! use forestsense_runtime::sensing_loop::{SensingLoop, SensingLoopConfig};
//!
//! # async fn demo() {
//! let field = Arc::new(FieldGenerator::new(FieldParams::default()).generate());
//! let index = Arc::new(SpatialIndex::build(field));
//! let observer = ObserverState::default();
//! let sensing = SensingLoop::new(
//!     SensingLoopConfig::default(),
//!     Some(index),
//!     observer.reader(),
//!     EventBus::default(),
//! );
//! sensing.run(Arc::new(AtomicBool::new(false))).await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use forestsense_middleware::{EventBus, Topic};
use forestsense_perception::{ObserverReader, SpatialIndex};
use forestsense_types::{Event, EventPayload, PointCloudFrame};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

const SOURCE: &str = "forestsense-runtime::sensing_loop";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`SensingLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct SensingLoopConfig {
    /// Radius of the simulated sensor (metres).
    pub sensing_radius: f32,
    /// Tick frequency (Hz).
    pub sensing_rate_hz: f64,
    /// Number of leading ticks that also publish the full field.
    pub global_map_ticks: u64,
}

impl Default for SensingLoopConfig {
    fn default() -> Self {
        Self {
            sensing_radius: 10.0,
            sensing_rate_hz: 10.0,
            global_map_ticks: 100,
        }
    }
}

impl SensingLoopConfig {
    /// Tick period derived from [`sensing_rate_hz`][Self::sensing_rate_hz].
    ///
    /// Falls back to the default 10 Hz when the rate is not a positive,
    /// finite number.
    pub fn period(&self) -> Duration {
        let rate = if self.sensing_rate_hz.is_finite() && self.sensing_rate_hz > 0.0 {
            self.sensing_rate_hz
        } else {
            warn!(rate = self.sensing_rate_hz, "invalid sensing rate; using 10 Hz");
            Self::default().sensing_rate_hz
        };
        Duration::from_secs_f64(1.0 / rate)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tick outcome
// ─────────────────────────────────────────────────────────────────────────────

/// What happened to the local map on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOutcome {
    /// A local map with this many points was published.
    Published { points: usize },
    /// No field has been attached to the loop.
    NoField,
    /// No pose update has been accepted yet.
    NoPose,
    /// The observer position contained a NaN.
    NanPose,
    /// The radius query found no obstacle points.
    NoObstacles,
}

/// Summary of one [`SensingLoop::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Zero-based tick number.
    pub tick: u64,
    /// True when the full field was published this tick.
    pub global_published: bool,
    pub local: LocalOutcome,
}

// ─────────────────────────────────────────────────────────────────────────────
// SensingLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed-rate loop that turns the observer pose into local map messages.
pub struct SensingLoop {
    config: SensingLoopConfig,
    index: Option<Arc<SpatialIndex>>,
    observer: ObserverReader,
    bus: EventBus,
    ticks: u64,
}

impl SensingLoop {
    /// Wire the loop to its collaborators.
    ///
    /// `index` is `None` only when no field has been generated; such a loop
    /// never publishes anything.
    pub fn new(
        config: SensingLoopConfig,
        index: Option<Arc<SpatialIndex>>,
        observer: ObserverReader,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            index,
            observer,
            bus,
            ticks: 0,
        }
    }

    /// Number of ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one tick.
    pub fn tick(&mut self) -> TickReport {
        let tick = self.ticks;
        self.ticks = self.ticks.saturating_add(1);

        let global_published = tick < self.config.global_map_ticks && self.publish_global();
        let local = self.sense();

        TickReport {
            tick,
            global_published,
            local,
        }
    }

    /// Drive [`tick`][Self::tick] at the configured rate until `shutdown`
    /// is set. Returns the number of ticks executed.
    ///
    /// The flag is checked between ticks; a tick in progress always
    /// completes.
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) -> u64 {
        let period = self.config.period();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            period_ms = period.as_millis() as u64,
            radius = self.config.sensing_radius,
            "sensing loop started"
        );

        loop {
            interval.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            let report = self.tick();
            trace!(?report, "tick");
        }

        info!(ticks = self.ticks, "sensing loop stopped");
        self.ticks
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    fn publish_global(&self) -> bool {
        let Some(index) = &self.index else {
            return false;
        };
        let frame = PointCloudFrame::world(index.field().points().to_vec());
        self.publish(Topic::GlobalMap, EventPayload::GlobalMap(frame));
        true
    }

    fn sense(&self) -> LocalOutcome {
        let Some(index) = &self.index else {
            debug!("no field yet; skipping local map");
            return LocalOutcome::NoField;
        };
        let Some(sample) = self.observer.snapshot() else {
            debug!("no odometry yet; skipping local map");
            return LocalOutcome::NoPose;
        };
        if sample.position.is_nan() {
            debug!(position = ?sample.position, "observer position is NaN; skipping local map");
            return LocalOutcome::NanPose;
        }

        let points = index.query(sample.position, self.config.sensing_radius);
        if points.is_empty() {
            warn!(position = ?sample.position, "no obstacles within sensing range");
            return LocalOutcome::NoObstacles;
        }

        let count = points.len();
        self.publish(Topic::LocalMap, EventPayload::LocalMap(PointCloudFrame::world(points)));
        LocalOutcome::Published { points: count }
    }

    /// Best-effort publish – no subscribers is not an error.
    fn publish(&self, topic: Topic, payload: EventPayload) {
        match self.bus.publish_to(topic, Event::new(SOURCE, payload)) {
            Ok(receivers) => trace!(?topic, receivers, "published"),
            Err(e) => trace!(?topic, error = %e, "published with no subscribers"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use forestsense_middleware::TopicReceiver;
    use forestsense_perception::{Field, FieldGenerator, FieldParams, ObserverState, ObstacleSpec};
    use forestsense_types::{OdometryData, Point3};

    fn odom(x: f32, y: f32, z: f32) -> OdometryData {
        OdometryData {
            child_frame_id: "base_link".to_string(),
            position_x: x,
            position_y: y,
            position_z: z,
            velocity_x: 0.0,
            velocity_y: 0.0,
            velocity_z: 0.0,
        }
    }

    /// One 2 m pillar at (5, 5), 3 layers, 1 m resolution.
    fn pillar_index() -> Arc<SpatialIndex> {
        let params = FieldParams {
            lower_x: 0.0,
            upper_x: 10.0,
            lower_y: 0.0,
            upper_y: 10.0,
            lower_rad: 2.0,
            upper_rad: 2.0,
            lower_hei: 3.0,
            upper_hei: 3.0,
            obstacle_num: 1,
            resolution: 1.0,
        };
        let mut generator = FieldGenerator::with_seed(params, 3);
        let mut points = Vec::new();
        generator.rasterize(
            &ObstacleSpec { center_x: 5.0, center_y: 5.0, width: 2.0 },
            &mut points,
        );
        Arc::new(SpatialIndex::build(Arc::new(Field::from_points(points))))
    }

    fn config(radius: f32) -> SensingLoopConfig {
        SensingLoopConfig {
            sensing_radius: radius,
            ..SensingLoopConfig::default()
        }
    }

    fn drain(rx: &mut TopicReceiver) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn global_map_only_during_warm_up() {
        let bus = EventBus::new(512);
        let mut global_rx = bus.subscribe_to(Topic::GlobalMap);
        let observer = ObserverState::default();
        let mut sensing = SensingLoop::new(config(1.0), Some(pillar_index()), observer.reader(), bus);

        let reports: Vec<TickReport> = (0..150).map(|_| sensing.tick()).collect();

        assert!(reports[..100].iter().all(|r| r.global_published));
        assert!(reports[100..].iter().all(|r| !r.global_published));
        let events = drain(&mut global_rx);
        assert_eq!(events.len(), 100);
        for event in events {
            let EventPayload::GlobalMap(frame) = event.payload else {
                panic!("expected GlobalMap");
            };
            assert_eq!(frame.frame_id, "world");
            assert_eq!(frame.len(), 12);
        }
    }

    #[test]
    fn warm_up_window_is_configurable() {
        let observer = ObserverState::default();
        let cfg = SensingLoopConfig { global_map_ticks: 3, ..config(1.0) };
        let mut sensing =
            SensingLoop::new(cfg, Some(pillar_index()), observer.reader(), EventBus::default());
        let published = (0..10).filter(|_| sensing.tick().global_published).count();
        assert_eq!(published, 3);
        assert_eq!(sensing.ticks(), 10);
    }

    #[test]
    fn no_local_map_without_pose() {
        let bus = EventBus::default();
        let mut local_rx = bus.subscribe_to(Topic::LocalMap);
        let observer = ObserverState::default();
        let mut sensing = SensingLoop::new(config(1.0), Some(pillar_index()), observer.reader(), bus);

        for _ in 0..5 {
            assert_eq!(sensing.tick().local, LocalOutcome::NoPose);
        }
        assert!(drain(&mut local_rx).is_empty());
    }

    #[test]
    fn no_local_map_without_field() {
        let bus = EventBus::default();
        let mut local_rx = bus.subscribe_to(Topic::LocalMap);
        let mut global_rx = bus.subscribe_to(Topic::GlobalMap);
        let observer = ObserverState::default();
        observer.update(&odom(5.0, 5.0, 0.0));
        let mut sensing = SensingLoop::new(config(1.0), None, observer.reader(), bus);

        let report = sensing.tick();
        assert_eq!(report.local, LocalOutcome::NoField);
        assert!(!report.global_published);
        assert!(drain(&mut local_rx).is_empty());
        assert!(drain(&mut global_rx).is_empty());
    }

    #[test]
    fn excluded_origin_does_not_unlock_local_map() {
        let observer = ObserverState::default();
        observer.update(&OdometryData {
            child_frame_id: "X".to_string(),
            ..odom(5.0, 5.0, 0.0)
        });
        let mut sensing =
            SensingLoop::new(config(1.0), Some(pillar_index()), observer.reader(), EventBus::default());
        assert_eq!(sensing.tick().local, LocalOutcome::NoPose);
    }

    #[test]
    fn local_map_within_radius() {
        let bus = EventBus::default();
        let mut local_rx = bus.subscribe_to(Topic::LocalMap);
        let observer = ObserverState::default();
        let mut sensing = SensingLoop::new(config(1.0), Some(pillar_index()), observer.reader(), bus);

        observer.update(&odom(5.0, 5.0, 0.0));
        let report = sensing.tick();
        assert_eq!(report.local, LocalOutcome::Published { points: 4 });

        let events = drain(&mut local_rx);
        assert_eq!(events.len(), 1);
        let EventPayload::LocalMap(frame) = &events[0].payload else {
            panic!("expected LocalMap");
        };
        assert_eq!(frame.frame_id, "world");
        let center = Point3::new(5.0, 5.0, 0.0);
        assert!(frame.points.iter().all(|p| p.distance_squared(&center) <= 1.0));
    }

    #[test]
    fn nan_pose_skips_then_recovers() {
        let bus = EventBus::default();
        let mut local_rx = bus.subscribe_to(Topic::LocalMap);
        let observer = ObserverState::default();
        let mut sensing = SensingLoop::new(config(1.0), Some(pillar_index()), observer.reader(), bus);

        observer.update(&odom(5.0, f32::NAN, 0.0));
        assert_eq!(sensing.tick().local, LocalOutcome::NanPose);
        assert!(drain(&mut local_rx).is_empty());

        observer.update(&odom(5.0, 5.0, 0.0));
        assert!(matches!(sensing.tick().local, LocalOutcome::Published { .. }));
        assert_eq!(drain(&mut local_rx).len(), 1);
    }

    #[test]
    fn empty_query_is_not_published() {
        let bus = EventBus::default();
        let mut local_rx = bus.subscribe_to(Topic::LocalMap);
        let observer = ObserverState::default();
        let mut sensing = SensingLoop::new(config(1.0), Some(pillar_index()), observer.reader(), bus);

        observer.update(&odom(0.0, 0.0, 0.0));
        assert_eq!(sensing.tick().local, LocalOutcome::NoObstacles);
        assert!(drain(&mut local_rx).is_empty());
    }

    #[test]
    fn global_precedes_local_within_a_tick() {
        let observer = ObserverState::default();
        observer.update(&odom(5.0, 5.0, 0.0));
        let mut sensing =
            SensingLoop::new(config(1.0), Some(pillar_index()), observer.reader(), EventBus::default());
        let report = sensing.tick();
        assert!(report.global_published);
        assert!(matches!(report.local, LocalOutcome::Published { .. }));
        assert_eq!(report.tick, 0);
    }

    #[test]
    fn period_falls_back_on_invalid_rate() {
        let cfg = SensingLoopConfig { sensing_rate_hz: 0.0, ..SensingLoopConfig::default() };
        assert_eq!(cfg.period(), Duration::from_millis(100));
        let cfg = SensingLoopConfig { sensing_rate_hz: 50.0, ..SensingLoopConfig::default() };
        assert_eq!(cfg.period(), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn run_stops_when_shutdown_already_requested() {
        let observer = ObserverState::default();
        let sensing =
            SensingLoop::new(config(1.0), Some(pillar_index()), observer.reader(), EventBus::default());
        let ticks = sensing.run(Arc::new(AtomicBool::new(true))).await;
        assert_eq!(ticks, 0);
    }

    #[tokio::test]
    async fn run_publishes_until_shutdown() {
        let bus = EventBus::new(1024);
        let mut local_rx = bus.subscribe_to(Topic::LocalMap);
        let observer = ObserverState::default();
        observer.update(&odom(5.0, 5.0, 0.0));
        let cfg = SensingLoopConfig { sensing_rate_hz: 200.0, ..config(1.0) };
        let sensing = SensingLoop::new(cfg, Some(pillar_index()), observer.reader(), bus);

        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(sensing.run(Arc::clone(&shutdown)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.store(true, Ordering::SeqCst);
        let ticks = handle.await.expect("sensing task panicked");

        assert!(ticks > 0);
        assert_eq!(drain(&mut local_rx).len() as u64, ticks);
    }
}
