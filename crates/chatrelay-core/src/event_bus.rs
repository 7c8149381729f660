//! Fan-out of decoded OpenCode events to any number of consumers.
//!
//! One upstream subscription per working directory publishes here; each
//! browser stream subscribes and keeps only its own session's events.
//!
//! # Example
//!
//! ```rust
//! use chatrelay_core::event_bus::{EventBus, RelayEvent};
//! use chatrelay_core::events::ChatEvent;
//!
//! let bus = EventBus::new();
//! let rx = bus.subscribe();
//! assert_eq!(bus.subscriber_count(), 1);
//!
//! bus.publish(RelayEvent::new("/workspace", ChatEvent::Other {
//!     event_type: "server.connected".to_string(),
//!     session_id: None,
//! }));
//! # drop(rx);
//!
//! // In async context:
//! // let event = rx.recv().await.unwrap();
//! ```

use serde::Serialize;
use tokio::sync::broadcast;

use crate::events::ChatEvent;

/// Events beyond this many unread cause slow subscribers to lag.
const DEFAULT_CAPACITY: usize = 1024;

/// A decoded event tagged with the directory whose stream produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayEvent {
    pub directory: String,
    pub event: ChatEvent,
}

impl RelayEvent {
    pub fn new(directory: impl Into<String>, event: ChatEvent) -> Self {
        Self {
            directory: directory.into(),
            event,
        }
    }

    /// Whether a consumer watching `session_id` in `directory` wants this.
    pub fn is_for(&self, directory: &str, session_id: &str) -> bool {
        self.directory == directory && self.event.session_id() == Some(session_id)
    }
}

/// Broadcast channel of [`RelayEvent`]s.
///
/// Publishing never blocks. A subscriber that falls more than the capacity
/// behind gets `RecvError::Lagged` and skips ahead.
pub struct EventBus {
    sender: broadcast::Sender<RelayEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Returns how many received it.
    pub fn publish(&self, event: RelayEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionStatus;

    fn status(session: &str) -> ChatEvent {
        ChatEvent::StatusChanged {
            session_id: session.to_string(),
            status: SessionStatus::Busy,
        }
    }

    mod relay_event {
        use super::*;

        #[test]
        fn is_for_matches_directory_and_session() {
            let event = RelayEvent::new("/w", status("s1"));
            assert!(event.is_for("/w", "s1"));
            assert!(!event.is_for("/w", "s2"));
            assert!(!event.is_for("/other", "s1"));
        }

        #[test]
        fn sessionless_event_is_for_nobody() {
            let event = RelayEvent::new(
                "/w",
                ChatEvent::Other {
                    event_type: "server.connected".to_string(),
                    session_id: None,
                },
            );
            assert!(!event.is_for("/w", "s1"));
        }

        #[test]
        fn serializes_event_inline() {
            let value = serde_json::to_value(RelayEvent::new("/w", status("s1"))).unwrap();
            assert_eq!(value["directory"], "/w");
            assert_eq!(value["event"]["type"], "session.status");
        }
    }

    mod event_bus {
        use super::*;

        #[test]
        fn subscriber_count_tracks_receivers() {
            let bus = EventBus::new();
            assert_eq!(bus.subscriber_count(), 0);

            let rx1 = bus.subscribe();
            let _rx2 = bus.subscribe();
            assert_eq!(bus.subscriber_count(), 2);

            drop(rx1);
            assert_eq!(bus.subscriber_count(), 1);
        }

        #[test]
        fn publish_without_subscribers_returns_zero() {
            let bus = EventBus::default();
            assert_eq!(bus.publish(RelayEvent::new("/w", status("s1"))), 0);
        }

        #[tokio::test]
        async fn every_subscriber_receives_in_order() {
            let bus = EventBus::new();
            let mut rx1 = bus.subscribe();
            let mut rx2 = bus.subscribe();

            assert_eq!(bus.publish(RelayEvent::new("/w", status("s1"))), 2);
            bus.publish(RelayEvent::new("/w", status("s2")));

            for rx in [&mut rx1, &mut rx2] {
                let first = rx.recv().await.unwrap();
                let second = rx.recv().await.unwrap();
                assert_eq!(first.event.session_id(), Some("s1"));
                assert_eq!(second.event.session_id(), Some("s2"));
            }
        }

        #[tokio::test]
        async fn late_subscriber_misses_earlier_events() {
            let bus = EventBus::new();
            let _early = bus.subscribe();
            bus.publish(RelayEvent::new("/w", status("early")));

            let mut late = bus.subscribe();
            bus.publish(RelayEvent::new("/w", status("later")));

            let event = late.recv().await.unwrap();
            assert_eq!(event.event.session_id(), Some("later"));
        }

        #[tokio::test]
        async fn slow_subscriber_lags() {
            let bus = EventBus::with_capacity(2);
            let mut rx = bus.subscribe();
            for session in ["a", "b", "c"] {
                bus.publish(RelayEvent::new("/w", status(session)));
            }

            assert!(matches!(
                rx.recv().await,
                Err(broadcast::error::RecvError::Lagged(1))
            ));
            let next = rx.recv().await.unwrap();
            assert_eq!(next.event.session_id(), Some("b"));
        }
    }
}
