//! `forestsense-runtime` – the periodic sensing engine.
//!
//! # Modules
//!
//! - [`sensing_loop`] – [`SensingLoop`][sensing_loop::SensingLoop]: the
//!   fixed-rate tick that publishes the full field during warm-up and the
//!   observer's local map on every tick once a pose is known.
//! - [`pose_listener`] – [`run_pose_listener`][pose_listener::run_pose_listener]:
//!   drains odometry events from the bus into an
//!   [`ObserverState`][forestsense_perception::ObserverState].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter. Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

pub mod pose_listener;
pub mod sensing_loop;
pub mod telemetry;

pub use pose_listener::run_pose_listener;
pub use sensing_loop::{LocalOutcome, SensingLoop, SensingLoopConfig, TickReport};
pub use telemetry::{init_tracing, TracerProviderGuard};
