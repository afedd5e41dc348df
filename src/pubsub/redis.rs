use std::collections::HashMap;

use futures::{StreamExt, future::BoxFuture};
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{PubSub, PubSubError, SUBSCRIBER_CAPACITY, Subscription};

const HEALTH_KEY: &str = "fibbing-it:health";

/// Bus backed by Redis PUBLISH/SUBSCRIBE, shared by every server instance.
pub struct RedisPubSub {
    client: Client,
    publisher: Mutex<Option<MultiplexedConnection>>,
    listeners: Mutex<HashMap<Uuid, Vec<JoinHandle<()>>>>,
}

impl RedisPubSub {
    /// Connect to the broker at `address` (`redis://host:port`).
    pub async fn connect(address: &str) -> Result<Self, PubSubError> {
        let client = Client::open(address).map_err(unavailable)?;
        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        Ok(Self {
            client,
            publisher: Mutex::new(Some(publisher)),
            listeners: Mutex::new(HashMap::new()),
        })
    }

    async fn publisher(&self) -> Result<MultiplexedConnection, PubSubError> {
        let mut guard = self.publisher.lock().await;
        if let Some(connection) = guard.as_ref() {
            return Ok(connection.clone());
        }
        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        *guard = Some(connection.clone());
        Ok(connection)
    }

    async fn forget_publisher(&self) {
        self.publisher.lock().await.take();
    }

    async fn publish_once(&self, channel: &str, payload: Vec<u8>) -> Result<(), PubSubError> {
        let mut connection = self.publisher().await?;
        let result: redis::RedisResult<i64> = connection.publish(channel, payload).await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                self.forget_publisher().await;
                Err(unavailable(err))
            }
        }
    }
}

impl PubSub for RedisPubSub {
    fn subscribe(&self, topic: Uuid) -> BoxFuture<'_, Result<Subscription, PubSubError>> {
        Box::pin(async move {
            let channel = topic.to_string();
            let mut pubsub = self.client.get_async_pubsub().await.map_err(unavailable)?;
            pubsub.subscribe(&channel).await.map_err(unavailable)?;

            let (sender, receiver) = mpsc::channel(SUBSCRIBER_CAPACITY);
            let listener = tokio::spawn(async move {
                let mut messages = pubsub.into_on_message();
                while let Some(message) = messages.next().await {
                    let payload = message.get_payload_bytes().to_vec();
                    match sender.try_send(payload) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            debug!(%topic, "subscriber lagging; payload dropped");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                debug!(%topic, "redis listener stopped");
            });
            track(&mut *self.listeners.lock().await, topic, listener);
            Ok(Box::pin(ReceiverStream::new(receiver)) as Subscription)
        })
    }

    fn publish(&self, topic: Uuid, payload: Vec<u8>) -> BoxFuture<'_, Result<(), PubSubError>> {
        Box::pin(async move {
            let channel = topic.to_string();
            if let Err(err) = self.publish_once(&channel, payload.clone()).await {
                warn!(%topic, error = %err, "redis publish failed; retrying once");
                self.publish_once(&channel, payload).await?;
            }
            Ok(())
        })
    }

    fn close(&self, topic: Uuid) -> BoxFuture<'_, Result<(), PubSubError>> {
        Box::pin(async move {
            let listeners = self
                .listeners
                .lock()
                .await
                .remove(&topic)
                .ok_or(PubSubError::NotFound(topic))?;
            for listener in listeners {
                listener.abort();
            }
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), PubSubError>> {
        Box::pin(async move {
            let mut connection = self.publisher().await?;
            let result: redis::RedisResult<bool> = connection.exists(HEALTH_KEY).await;
            if let Err(err) = result {
                self.forget_publisher().await;
                return Err(unavailable(err));
            }
            Ok(())
        })
    }
}

/// Record a topic listener, dropping the topic's listeners that already ended.
fn track(listeners: &mut HashMap<Uuid, Vec<JoinHandle<()>>>, topic: Uuid, listener: JoinHandle<()>) {
    let handles = listeners.entry(topic).or_default();
    handles.retain(|handle| !handle.is_finished());
    handles.push(listener);
}

fn unavailable(err: redis::RedisError) -> PubSubError {
    PubSubError::Unavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::future::pending;

    use super::*;

    #[tokio::test]
    async fn ended_listeners_are_dropped_when_a_topic_resubscribes() {
        let topic = Uuid::now_v7();
        let other = Uuid::now_v7();
        let mut listeners = HashMap::new();

        let ended = tokio::spawn(async {});
        while !ended.is_finished() {
            tokio::task::yield_now().await;
        }
        track(&mut listeners, topic, ended);
        track(&mut listeners, other, tokio::spawn(async {}));
        track(&mut listeners, topic, tokio::spawn(pending::<()>()));
        assert_eq!(listeners[&topic].len(), 1);
        assert!(!listeners[&topic][0].is_finished());
        assert_eq!(listeners[&other].len(), 1);

        track(&mut listeners, topic, tokio::spawn(pending::<()>()));
        assert_eq!(listeners[&topic].len(), 2);

        for handle in listeners.into_values().flatten() {
            handle.abort();
        }
    }
}
