//! Background task that feeds [`Topic::Odometry`][forestsense_middleware::Topic::Odometry]
//! events into an [`ObserverState`].
//!
//! Runs until the bus closes. A lagging subscriber only loses stale poses, so
//! lag is logged and the listener keeps going.

use forestsense_middleware::TopicReceiver;
use forestsense_perception::ObserverState;
use forestsense_types::EventPayload;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, trace, warn};

/// Consume odometry events from `rx` until the bus shuts down.
///
/// Returns the number of updates accepted into `state`.
pub async fn run_pose_listener(mut rx: TopicReceiver, state: ObserverState) -> u64 {
    let mut accepted = 0u64;
    info!(topic = rx.topic().name(), "pose listener started");

    loop {
        match rx.recv().await {
            Ok(event) => {
                let EventPayload::Odometry(odom) = &event.payload else {
                    debug!(source = %event.source, "non-odometry event on odometry topic");
                    continue;
                };
                if state.update(odom) {
                    accepted += 1;
                    trace!(
                        x = odom.position_x,
                        y = odom.position_y,
                        z = odom.position_z,
                        "pose updated"
                    );
                } else {
                    debug!(origin = %odom.child_frame_id, "odometry from excluded origin ignored");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "pose listener lagged; continuing with newest poses");
            }
            Err(RecvError::Closed) => break,
        }
    }

    info!(accepted, "pose listener stopped");
    accepted
}
