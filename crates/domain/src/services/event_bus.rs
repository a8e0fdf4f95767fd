//! Event bus abstraction.
//!
//! Emitters publish JSON envelopes to a topic with a partition key (the
//! owning entity id); the bus must preserve per-key publish order. The
//! in-memory implementation records everything it is given and is used by
//! tests and by deployments running without a broker.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Errors that can occur while publishing to the bus.
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}

/// A partitioned, ordered event bus.
#[async_trait::async_trait]
pub trait EventBus: Send + Sync {
    /// Publish `payload` to `topic`, partitioned by `partition_key`.
    ///
    /// Completion implies broker acknowledgment; callers that need
    /// durability await this before committing dependent state.
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: Value,
    ) -> Result<(), EventBusError>;
}

/// An event captured by the in-memory bus.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub topic: String,
    pub partition_key: String,
    pub payload: Value,
}

/// In-memory event bus recording published events in order.
#[derive(Default)]
pub struct InMemoryEventBus {
    events: Mutex<Vec<PublishedEvent>>,
    failing: AtomicBool,
}

impl InMemoryEventBus {
    /// Create a new, empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events in publish order.
    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().expect("event bus lock poisoned").clone()
    }

    /// Events for one partition key, in publish order.
    pub fn events_for_key(&self, partition_key: &str) -> Vec<PublishedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.partition_key == partition_key)
            .collect()
    }

    /// Topics observed for one partition key, in publish order.
    pub fn topics_for_key(&self, partition_key: &str) -> Vec<String> {
        self.events_for_key(partition_key)
            .into_iter()
            .map(|e| e.topic)
            .collect()
    }

    /// Make subsequent publishes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Drop all recorded events.
    pub fn clear(&self) {
        self.events.lock().expect("event bus lock poisoned").clear();
    }
}

#[async_trait::async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: Value,
    ) -> Result<(), EventBusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EventBusError::Publish {
                topic: topic.to_string(),
                reason: "in-memory bus configured to fail".to_string(),
            });
        }

        tracing::debug!(topic = topic, key = partition_key, "In-memory bus publish");
        self.events
            .lock()
            .expect("event bus lock poisoned")
            .push(PublishedEvent {
                topic: topic.to_string(),
                partition_key: partition_key.to_string(),
                payload,
            });
        Ok(())
    }
}
