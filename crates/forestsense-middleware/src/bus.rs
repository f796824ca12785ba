//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Odometry`] | Inbound observer pose updates |
//! | [`Topic::GlobalMap`] | The full obstacle field during warm-up |
//! | [`Topic::LocalMap`] | Obstacle points within sensing range, every tick |

use forestsense_types::{Event, SenseError};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Observer pose updates delivered by the bridge.
    Odometry,
    /// Complete obstacle field snapshots.
    GlobalMap,
    /// Sensed subset of the obstacle field around the observer.
    LocalMap,
}

impl Topic {
    /// Wire name used by the WebSocket bridge.
    pub fn name(&self) -> &'static str {
        match self {
            Topic::Odometry => "/odometry",
            Topic::GlobalMap => "/all_map",
            Topic::LocalMap => "/random_map",
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    odometry: broadcast::Sender<Event>,
    global_map: broadcast::Sender<Event>,
    local_map: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (odometry, _) = broadcast::channel(capacity);
        let (global_map, _) = broadcast::channel(capacity);
        let (local_map, _) = broadcast::channel(capacity);
        Self {
            odometry,
            global_map,
            local_map,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`SenseError::Channel`] when nobody is listening on the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, SenseError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| SenseError::Channel(format!("No subscribers for topic {:?}", topic)))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of receivers currently subscribed to `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Odometry => &self.odometry,
            Topic::GlobalMap => &self.global_map,
            Topic::LocalMap => &self.local_map,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forestsense_types::{EventPayload, OdometryData, Point3, PointCloudFrame};

    fn odom_event() -> Event {
        Event::new(
            "forestsense-middleware::test",
            EventPayload::Odometry(OdometryData {
                child_frame_id: "base_link".to_string(),
                position_x: 1.0,
                position_y: 2.0,
                position_z: 0.0,
                velocity_x: 0.0,
                velocity_y: 0.0,
                velocity_z: 0.0,
            }),
        )
    }

    fn map_event() -> Event {
        Event::new(
            "forestsense-runtime::test",
            EventPayload::LocalMap(PointCloudFrame::world(vec![Point3::new(1.0, 1.0, 0.0)])),
        )
    }

    #[test]
    fn publish_no_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::LocalMap, map_event());
        assert!(matches!(result, Err(SenseError::Channel(_))));
    }

    #[test]
    fn topic_names_are_distinct() {
        assert_eq!(Topic::Odometry.name(), "/odometry");
        assert_ne!(Topic::GlobalMap.name(), Topic::LocalMap.name());
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::Odometry);
        let mut subscriber2 = bus.subscribe_to(Topic::Odometry);

        let event = odom_event();
        let delivered = bus.publish_to(Topic::Odometry, event.clone())?;
        assert_eq!(delivered, 2);

        assert_eq!(subscriber1.recv().await?.id, event.id);
        assert_eq!(subscriber2.recv().await?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut global_sub = bus.subscribe_to(Topic::GlobalMap);
        let _local_sub = bus.subscribe_to(Topic::LocalMap);

        bus.publish_to(Topic::LocalMap, map_event())?;

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            global_sub.recv(),
        )
        .await;
        assert!(result.is_err(), "GlobalMap subscriber must not receive a LocalMap event");
        Ok(())
    }

    #[test]
    fn try_recv_drains_in_publish_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::LocalMap);
        let first = map_event();
        let second = map_event();
        bus.publish_to(Topic::LocalMap, first.clone()).unwrap();
        bus.publish_to(Topic::LocalMap, second.clone()).unwrap();

        assert_eq!(rx.try_recv().unwrap().id, first.id);
        assert_eq!(rx.try_recv().unwrap().id, second.id);
        assert!(rx.try_recv().is_err());
        assert_eq!(rx.topic(), Topic::LocalMap);
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(Topic::Odometry), 0);
        let rx = bus.subscribe_to(Topic::Odometry);
        assert_eq!(bus.subscriber_count(Topic::Odometry), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(Topic::Odometry), 0);
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        const CAPACITY: usize = 16;
        let bus = EventBus::new(CAPACITY);
        let mut slow_sub = bus.subscribe_to(Topic::Odometry);

        for _ in 0..1_000 {
            let _ = bus.publish_to(Topic::Odometry, odom_event());
        }

        let result = slow_sub.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
