use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};

use crate::models::ConversationRecord;

/// Handle returned by [`EventBus::subscribe`]; pass it back to
/// [`EventBus::unsubscribe`] to release the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// In-process publish/subscribe fan-out for conversation updates.
///
/// Subscribers are unbounded channel senders keyed by id. `publish` delivers
/// to a snapshot of the subscriber set taken at call entry, so a subscriber
/// registered mid-publish may or may not see that particular record. A
/// subscriber whose receiver is gone is skipped and pruned; it never blocks
/// delivery to the rest. No persistence, process-lifetime scope.
pub struct EventBus {
    subscribers: RwLock<HashMap<u64, mpsc::UnboundedSender<ConversationRecord>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber and return its handle plus the receiving end.
    pub async fn subscribe(
        &self,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<ConversationRecord>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.insert(id, tx);
        tracing::debug!(subscription_id = id, "subscriber registered");
        (SubscriptionId(id), rx)
    }

    /// Remove a subscriber. Calling this twice with the same handle is a no-op.
    pub async fn unsubscribe(&self, id: SubscriptionId) {
        if self.subscribers.write().await.remove(&id.0).is_some() {
            tracing::debug!(subscription_id = id.0, "subscriber released");
        }
    }

    /// Deliver a record to every subscriber registered at call entry.
    pub async fn publish(&self, record: &ConversationRecord) {
        // Snapshot under the read lock, deliver outside it, so registration
        // and removal during a publish cannot deadlock.
        let snapshot: Vec<(u64, mpsc::UnboundedSender<ConversationRecord>)> = self
            .subscribers
            .read()
            .await
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(record.clone()).is_err() {
                tracing::warn!(subscription_id = id, "subscriber gone, dropping delivery");
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in dead {
                subscribers.remove(&id);
            }
        }
    }

    /// Number of live subscriptions (for diagnostics and tests).
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> ConversationRecord {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "transcript": "assistant: hello",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_publish_with_zero_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(&record("c-1")).await;
        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_delivers_to_live_subscribers() {
        let bus = EventBus::new();
        let (_id, mut rx) = bus.subscribe().await;

        bus.publish(&record("c-1")).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, "c-1");
    }

    #[tokio::test]
    async fn test_unsubscribed_subscriber_receives_nothing() {
        let bus = EventBus::new();
        let (id, mut rx) = bus.subscribe().await;

        bus.unsubscribe(id).await;
        bus.publish(&record("c-1")).await;

        // Sender was dropped on unsubscribe, so the channel reports closed.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let (id, _rx) = bus.subscribe().await;

        bus.unsubscribe(id).await;
        bus.unsubscribe(id).await;

        assert_eq!(bus.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_publish() {
        let bus = EventBus::new();
        bus.publish(&record("early")).await;

        let (_id, mut rx) = bus.subscribe().await;
        bus.publish(&record("late")).await;

        assert_eq!(rx.recv().await.unwrap().id, "late");
    }

    #[tokio::test]
    async fn test_dead_subscriber_does_not_block_the_rest() {
        let bus = EventBus::new();
        let (_dead_id, dead_rx) = bus.subscribe().await;
        let (_live_id, mut live_rx) = bus.subscribe().await;
        drop(dead_rx);

        bus.publish(&record("c-1")).await;

        assert_eq!(live_rx.recv().await.unwrap().id, "c-1");
        // The broken subscription was pruned during publish.
        assert_eq!(bus.subscriber_count().await, 1);
    }
}
