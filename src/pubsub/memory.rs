use std::collections::HashMap;

use futures::future::BoxFuture;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use uuid::Uuid;

use super::{PubSub, PubSubError, SUBSCRIBER_CAPACITY, Subscription};

/// In-process bus; only endpoints of this process see each other's messages.
#[derive(Default)]
pub struct MemoryPubSub {
    topics: Mutex<HashMap<Uuid, Vec<mpsc::Sender<Vec<u8>>>>>,
}

impl MemoryPubSub {
    /// Bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers of `topic`.
    pub async fn subscriber_count(&self, topic: Uuid) -> usize {
        let topics = self.topics.lock().await;
        topics
            .get(&topic)
            .map_or(0, |subscribers| subscribers.iter().filter(|s| !s.is_closed()).count())
    }
}

impl PubSub for MemoryPubSub {
    fn subscribe(&self, topic: Uuid) -> BoxFuture<'_, Result<Subscription, PubSubError>> {
        Box::pin(async move {
            let (sender, receiver) = mpsc::channel(SUBSCRIBER_CAPACITY);
            self.topics
                .lock()
                .await
                .entry(topic)
                .or_default()
                .push(sender);
            Ok(Box::pin(ReceiverStream::new(receiver)) as Subscription)
        })
    }

    fn publish(&self, topic: Uuid, payload: Vec<u8>) -> BoxFuture<'_, Result<(), PubSubError>> {
        Box::pin(async move {
            let mut topics = self.topics.lock().await;
            let Some(subscribers) = topics.get_mut(&topic) else {
                return Ok(());
            };
            subscribers.retain(|subscriber| match subscriber.try_send(payload.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(%topic, "subscriber lagging; payload dropped");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
            if subscribers.is_empty() {
                topics.remove(&topic);
            }
            Ok(())
        })
    }

    fn close(&self, topic: Uuid) -> BoxFuture<'_, Result<(), PubSubError>> {
        Box::pin(async move {
            self.topics
                .lock()
                .await
                .remove(&topic)
                .map(drop)
                .ok_or(PubSubError::NotFound(topic))
        })
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), PubSubError>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn payloads_arrive_in_publish_order() {
        let bus = MemoryPubSub::new();
        let topic = Uuid::now_v7();
        let mut subscription = bus.subscribe(topic).await.unwrap();

        for n in 0..5u8 {
            bus.publish(topic, vec![n]).await.unwrap();
        }
        for n in 0..5u8 {
            assert_eq!(subscription.next().await, Some(vec![n]));
        }
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = MemoryPubSub::new();
        let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());
        let mut alice_sub = bus.subscribe(alice).await.unwrap();
        let _bob_sub = bus.subscribe(bob).await.unwrap();

        bus.publish(bob, b"for bob".to_vec()).await.unwrap();
        bus.publish(alice, b"for alice".to_vec()).await.unwrap();
        assert_eq!(alice_sub.next().await, Some(b"for alice".to_vec()));
    }

    #[tokio::test]
    async fn overflow_is_dropped_for_the_slow_subscriber() {
        let bus = MemoryPubSub::new();
        let topic = Uuid::now_v7();
        let mut subscription = bus.subscribe(topic).await.unwrap();

        for n in 0..(SUBSCRIBER_CAPACITY as u8 + 5) {
            bus.publish(topic, vec![n]).await.unwrap();
        }
        bus.close(topic).await.unwrap();

        let received: Vec<Vec<u8>> = subscription.by_ref().collect().await;
        assert_eq!(received.len(), SUBSCRIBER_CAPACITY);
        assert_eq!(received.first(), Some(&vec![0]));
    }

    #[tokio::test]
    async fn closing_an_unknown_topic_fails() {
        let bus = MemoryPubSub::new();
        let topic = Uuid::now_v7();
        assert!(matches!(
            bus.close(topic).await,
            Err(PubSubError::NotFound(t)) if t == topic
        ));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_no_op() {
        let bus = MemoryPubSub::new();
        bus.publish(Uuid::now_v7(), b"lost".to_vec()).await.unwrap();
    }
}
