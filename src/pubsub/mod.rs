//! Per-player message bus carrying rendered views to connected endpoints.
//!
//! Every player has one topic, named after their id. Payloads published to a
//! topic reach every local subscriber of that topic in publish order.

pub mod memory;
#[cfg(feature = "redis-bus")]
pub mod redis;

use futures::{future::BoxFuture, stream::BoxStream};
use thiserror::Error;
use uuid::Uuid;

/// Capacity of each subscriber channel; payloads beyond it are dropped for that subscriber.
pub const SUBSCRIBER_CAPACITY: usize = 10;

/// Stream of payloads published to one topic.
pub type Subscription = BoxStream<'static, Vec<u8>>;

/// Errors raised by bus backends.
#[derive(Debug, Error)]
pub enum PubSubError {
    /// Nobody is subscribed to the topic.
    #[error("no subscriber for topic {0}")]
    NotFound(Uuid),
    /// The broker could not be reached.
    #[error("pub/sub backend unavailable: {0}")]
    Unavailable(String),
}

/// Topic based fan-out of opaque payloads.
pub trait PubSub: Send + Sync {
    /// Start receiving payloads published to `topic`.
    fn subscribe(&self, topic: Uuid) -> BoxFuture<'_, Result<Subscription, PubSubError>>;
    /// Deliver `payload` to every subscriber of `topic`. Publishing to a topic
    /// without subscribers succeeds and drops the payload.
    fn publish(&self, topic: Uuid, payload: Vec<u8>) -> BoxFuture<'_, Result<(), PubSubError>>;
    /// End every subscription of `topic`.
    fn close(&self, topic: Uuid) -> BoxFuture<'_, Result<(), PubSubError>>;
    /// Cheap round trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'_, Result<(), PubSubError>>;
}
