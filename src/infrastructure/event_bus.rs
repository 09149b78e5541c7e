//! Process-wide pub-sub event bus (§4.7).
//!
//! One bounded `tokio::broadcast::Sender` backs the whole process rather
//! than the reference architecture's `Arc<RwLock<Vec<listener>>>` push-list
//! (`infrastructure/event_bus.rs` there): `broadcast` gives "a slow
//! subscriber is dropped, never blocks the publisher" natively via
//! `RecvError::Lagged`, which is exactly the semantics called for here.

use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::events::Event;

const DEFAULT_CAPACITY: usize = 1024;

pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes best-effort: with zero subscribers this is a no-op, and a
    /// subscriber that falls behind is dropped (§4.7) -- neither case is
    /// treated as an error here since stores, not events, are the record.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
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

/// Drains `rx` until a matching event arrives or the bus lags past this
/// subscriber, logging and resubscribing transparently on lag rather than
/// surfacing `RecvError::Lagged` to callers -- losing a few advisory events
/// under load is expected and never fatal (§4.7).
pub async fn recv_filtered<F>(rx: &mut broadcast::Receiver<Event>, mut matches: F) -> Option<Event>
where
    F: FnMut(&Event) -> bool,
{
    loop {
        match rx.recv().await {
            Ok(event) if matches(&event) => return Some(event),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event bus subscriber lagged, skipping events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Event::CircuitClosed);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "circuit_closed");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = EventBus::new();
        bus.publish(Event::CircuitClosed);
    }

    #[tokio::test]
    async fn recv_filtered_skips_non_matching_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Event::CircuitClosed);
        bus.publish(Event::RecommendationsReady {
            portfolio_hash: "abc".into(),
        });
        let found = recv_filtered(&mut rx, |e| {
            matches!(e, Event::RecommendationsReady { portfolio_hash } if portfolio_hash == "abc")
        })
        .await;
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn subscriber_count_tracks_active_receivers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(rx1);
        drop(rx2);
    }
}
