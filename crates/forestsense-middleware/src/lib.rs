//! `forestsense-middleware` – event routing and transport.
//!
//! Moves pose updates and point clouds between the simulator core and the
//! outside world without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`ws_bridge`] – rosbridge-style WebSocket bridge: odometry in, point
//!   clouds out.

pub mod bus;
pub mod ws_bridge;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use ws_bridge::WsBridge;
