//! rosbridge-style WebSocket bridge.
//!
//! [`WsBridge`] is the only path by which the outside world talks to the
//! simulator:
//!
//! 1. **Ingests** `nav_msgs/Odometry`-shaped publish frames on `/odometry`
//!    and republishes them as [`EventPayload::Odometry`] on the bus.
//!
//! 2. **Serves** every global/local map event to each connected client as a
//!    JSON text frame `{"topic": ..., "event": ...}`.
//!
//! The bridge does not interpret poses or clouds; it only handles
//! serialisation and transport.

use std::net::SocketAddr;

use forestsense_types::{Event, EventPayload, OdometryData, SenseError};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, Topic};

const ODOMETRY_SOURCE: &str = "forestsense-middleware::ws_bridge/odometry";

// rosbridge publish frame: {"op":"publish","topic":"/odometry","msg":{...}}
#[derive(Debug, Deserialize)]
struct PublishFrame {
    #[serde(default)]
    op: String,
    topic: String,
    msg: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct Vector3Msg {
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    z: f32,
}

#[derive(Debug, Deserialize)]
struct PoseMsg {
    position: Vector3Msg,
}

#[derive(Debug, Deserialize)]
struct PoseWithCovarianceMsg {
    pose: PoseMsg,
}

#[derive(Debug, Default, Deserialize)]
struct TwistMsg {
    #[serde(default)]
    linear: Vector3Msg,
}

#[derive(Debug, Default, Deserialize)]
struct TwistWithCovarianceMsg {
    #[serde(default)]
    twist: TwistMsg,
}

#[derive(Debug, Deserialize)]
struct OdometryMsg {
    #[serde(default)]
    child_frame_id: String,
    pose: PoseWithCovarianceMsg,
    #[serde(default)]
    twist: TwistWithCovarianceMsg,
}

impl From<OdometryMsg> for OdometryData {
    fn from(msg: OdometryMsg) -> Self {
        let position = msg.pose.pose.position;
        let linear = msg.twist.twist.linear;
        OdometryData {
            child_frame_id: msg.child_frame_id,
            position_x: position.x,
            position_y: position.y,
            position_z: position.z,
            velocity_x: linear.x,
            velocity_y: linear.y,
            velocity_z: linear.z,
        }
    }
}

/// Bridge between WebSocket clients and the internal [`EventBus`].
#[derive(Clone)]
pub struct WsBridge {
    bus: EventBus,
}

impl WsBridge {
    /// Create a new bridge backed by `bus`.
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Publish an odometry sample on [`Topic::Odometry`].
    pub fn ingest_odometry(&self, data: OdometryData) -> Result<usize, SenseError> {
        self.bus
            .publish_to(Topic::Odometry, Event::new(ODOMETRY_SOURCE, EventPayload::Odometry(data)))
    }

    /// Bind a WebSocket server on `addr` and serve clients until a fatal
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`SenseError::Bridge`] if the TCP listener cannot be bound.
    pub async fn run_ws_server(self, addr: SocketAddr) -> Result<(), SenseError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SenseError::Bridge(format!("ws bind error on {addr}: {e}")))?;
        info!(%addr, "websocket bridge listening");
        self.serve(listener).await
    }

    /// Accept clients on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), SenseError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_ws_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_ws_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), SenseError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| SenseError::Bridge(format!("ws handshake from {peer}: {e}")))?;
        debug!(%peer, "ws client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut global_rx = self.bus.subscribe_to(Topic::GlobalMap);
        let mut local_rx = self.bus.subscribe_to(Topic::LocalMap);

        loop {
            let outbound = tokio::select! {
                result = global_rx.recv() => (Topic::GlobalMap, result),
                result = local_rx.recv() => (Topic::LocalMap, result),
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        Some(Ok(Message::Text(text))) => {
                            self.handle_incoming_ws_message(text.as_str());
                        }
                        _ => {}
                    }
                    continue;
                }
            };

            match outbound {
                (topic, Ok(event)) => {
                    let frame = serde_json::json!({ "topic": topic.name(), "event": event });
                    if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                (topic, Err(RecvError::Lagged(n))) => {
                    warn!(peer = %peer, topic = ?topic, lagged_by = n, "ws client lagged");
                }
                (_, Err(RecvError::Closed)) => break,
            }
        }

        debug!(%peer, "ws client disconnected");
        Ok(())
    }

    /// Parse an incoming WebSocket text frame.
    ///
    /// Only `publish` frames on `/odometry` carrying a `nav_msgs/Odometry`
    /// message are recognised; anything else is ignored.
    fn handle_incoming_ws_message(&self, text: &str) {
        let Ok(frame) = serde_json::from_str::<PublishFrame>(text) else {
            return;
        };
        if frame.op != "publish" || frame.topic != Topic::Odometry.name() {
            return;
        }
        match serde_json::from_value::<OdometryMsg>(frame.msg) {
            Ok(msg) => {
                if let Err(e) = self.ingest_odometry(msg.into()) {
                    debug!(error = %e, "odometry dropped");
                }
            }
            Err(e) => warn!(error = %e, "malformed odometry frame"),
        }
    }
}
