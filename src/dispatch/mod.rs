//! Fan-out dispatcher
//!
//! A single task drains the decoded-event channel coming from the upstream
//! connection and routes each event to every consumer currently registered
//! for its channel. Pushes never block: a saturated consumer sheds its own
//! oldest events (counted per consumer) and cannot slow down other
//! consumers or the receive loop. Because one task does all routing in
//! arrival order, per-channel ordering is preserved for every consumer.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::channel::Event;
use crate::registry::SubscriptionRegistry;
use crate::session::SessionTable;

/// Drain decoded events until the upstream connection drops its sender
pub(crate) async fn run(
    mut events: mpsc::Receiver<Event>,
    registry: Arc<SubscriptionRegistry>,
    sessions: Arc<SessionTable>,
) {
    while let Some(event) = events.recv().await {
        dispatch_event(&registry, &sessions, event).await;
    }
    tracing::debug!("Dispatcher stopped");
}

/// Route one event to the delivery queue of every current subscriber.
///
/// The subscriber snapshot is taken per event, so a consumer that
/// unsubscribed is not delivered to and one that just subscribed is.
pub(crate) async fn dispatch_event(
    registry: &SubscriptionRegistry,
    sessions: &SessionTable,
    event: Event,
) {
    let subscribers = registry.subscribers_of(&event.channel).await;
    if subscribers.is_empty() {
        // Typical for a dropped tracked address: upstream keeps sending
        // until the next reconnect sheds it.
        tracing::trace!(channel = %event.channel, "Event for channel with no subscribers");
        return;
    }

    tracing::trace!(
        channel = %event.channel,
        subscribers = subscribers.len(),
        "Dispatching event"
    );
    for consumer in subscribers {
        if let Some(queue) = sessions.get(consumer).await {
            queue.push(event.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::channel::{Channel, ConsumerId};

    use super::*;

    const ADDR: &str = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh";

    fn blocks_event(n: u64) -> Event {
        Event::new(Channel::Blocks, json!({ "block": { "height": n } }))
    }

    fn stats_event() -> Event {
        Event::new(Channel::Stats, json!({ "mempoolInfo": { "count": 1 } }))
    }

    async fn setup() -> (Arc<SubscriptionRegistry>, Arc<SessionTable>) {
        (
            Arc::new(SubscriptionRegistry::new()),
            Arc::new(SessionTable::new(16)),
        )
    }

    #[tokio::test]
    async fn test_routes_only_to_subscribed_consumers() {
        let (registry, sessions) = setup().await;
        let (a, b) = (ConsumerId::new(1), ConsumerId::new(2));

        // A wants blocks and stats; B wants stats only.
        let queue_a = sessions.get_or_create(a).await;
        let queue_b = sessions.get_or_create(b).await;
        registry.add(a, Channel::Blocks).await;
        registry.add(a, Channel::Stats).await;
        registry.add(b, Channel::Stats).await;

        dispatch_event(&registry, &sessions, blocks_event(1)).await;
        dispatch_event(&registry, &sessions, stats_event()).await;

        // A receives both, B only the stats event.
        assert_eq!(queue_a.len().await, 2);
        assert_eq!(queue_b.len().await, 1);
        assert_eq!(
            queue_b.recv().await.unwrap().channel,
            Channel::Stats
        );
    }

    #[tokio::test]
    async fn test_event_without_subscribers_goes_nowhere() {
        let (registry, sessions) = setup().await;
        let a = ConsumerId::new(1);
        let queue = sessions.get_or_create(a).await;
        registry.add(a, Channel::Stats).await;

        dispatch_event(
            &registry,
            &sessions,
            Event::new(Channel::TrackAddress(ADDR.into()), json!({ "address": ADDR })),
        )
        .await;

        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_slow_consumer_does_not_block_fast_one() {
        let registry = Arc::new(SubscriptionRegistry::new());
        // Queues hold 4 events; the slow consumer never drains.
        let sessions = Arc::new(SessionTable::new(4));
        let (slow, fast) = (ConsumerId::new(1), ConsumerId::new(2));

        sessions.get_or_create(slow).await;
        let fast_queue = sessions.get_or_create(fast).await;
        registry.add(slow, Channel::Blocks).await;
        registry.add(fast, Channel::Blocks).await;

        let drain = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(event) = fast_queue.recv().await {
                seen.push(event);
                if seen.len() == 10 {
                    break;
                }
            }
            seen
        });

        // Inject faster than the slow consumer drains (it never does). The
        // yield mirrors the real dispatcher, which reschedules at its
        // channel recv between events.
        for n in 0..10 {
            dispatch_event(&registry, &sessions, blocks_event(n)).await;
            tokio::task::yield_now().await;
        }

        // Every event reached the fast consumer promptly, in order.
        let drained = drain.await.unwrap();
        assert_eq!(drained.len(), 10);
        for (n, event) in drained.iter().enumerate() {
            assert_eq!(event.payload["block"]["height"].as_u64(), Some(n as u64));
        }

        // The slow consumer kept only its freshest 4 and counted the rest.
        let slow_queue = sessions.get(slow).await.unwrap();
        assert_eq!(slow_queue.len().await, 4);
        assert_eq!(slow_queue.dropped(), 6);
    }
}
