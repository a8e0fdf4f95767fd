//! NATS-backed event bus publisher.
//!
//! Subjects are `{topic}.{partition_key}`; NATS preserves per-publisher
//! order per subject, which gives the per-entity ordering guarantee the
//! engines rely on. Consumers subscribe with a trailing wildcard, e.g.
//! `ride.requested.*`.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use domain::models::events::{SupplyDemandSnapshot, TripEndedEvent};
use domain::services::event_bus::{EventBus, EventBusError};

use crate::services::{PaymentOrchestrator, SurgeCalculator};

/// Event bus publishing to a NATS cluster.
pub struct NatsEventBus {
    client: async_nats::Client,
}

impl NatsEventBus {
    /// Connect to the cluster.
    pub async fn connect(url: &str) -> Result<Self, async_nats::ConnectError> {
        let client = async_nats::connect(url).await?;
        Ok(Self { client })
    }

    fn subject(topic: &str, partition_key: &str) -> String {
        format!("{}.{}", topic, partition_key)
    }

    /// Subscribe to every partition of a topic.
    pub async fn subscribe_topic(
        &self,
        topic: &str,
    ) -> Result<async_nats::Subscriber, async_nats::SubscribeError> {
        self.client.subscribe(format!("{}.*", topic)).await
    }
}

/// Feed `trip.ended` events into the payment orchestrator.
///
/// Offsets are implicit: a message is handled once per delivery, and the
/// orchestrator's trip-id idempotency absorbs redeliveries.
pub fn spawn_trip_ended_consumer(bus: Arc<NatsEventBus>, payments: Arc<PaymentOrchestrator>) {
    tokio::spawn(async move {
        let mut sub = match bus.subscribe_topic(domain::models::topics::TRIP_ENDED).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(error = %e, "trip.ended subscription failed");
                return;
            }
        };
        while let Some(message) = sub.next().await {
            match serde_json::from_slice::<TripEndedEvent>(&message.payload) {
                Ok(event) => {
                    if let Err(e) = payments.initiate(&event).await {
                        warn!(trip_id = %event.trip_id, error = %e, "Payment initiation failed");
                    }
                }
                Err(e) => warn!(error = %e, "Malformed trip.ended payload"),
            }
        }
    });
}

/// Feed `supply.demand.snapshot` events into the surge calculator.
pub fn spawn_snapshot_consumer(bus: Arc<NatsEventBus>, surge: Arc<SurgeCalculator>) {
    tokio::spawn(async move {
        let mut sub = match bus
            .subscribe_topic(domain::models::topics::SUPPLY_DEMAND_SNAPSHOT)
            .await
        {
            Ok(sub) => sub,
            Err(e) => {
                warn!(error = %e, "supply.demand.snapshot subscription failed");
                return;
            }
        };
        while let Some(message) = sub.next().await {
            match serde_json::from_slice::<SupplyDemandSnapshot>(&message.payload) {
                Ok(event) => {
                    if let Err(e) = surge.on_snapshot(&event).await {
                        warn!(cell_id = %event.cell_id, error = %e, "Surge recompute failed");
                    }
                }
                Err(e) => warn!(error = %e, "Malformed snapshot payload"),
            }
        }
    });
}

#[async_trait::async_trait]
impl EventBus for NatsEventBus {
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: Value,
    ) -> Result<(), EventBusError> {
        let subject = Self::subject(topic, partition_key);
        let bytes = serde_json::to_vec(&payload).map_err(|e| EventBusError::Publish {
            topic: topic.to_string(),
            reason: format!("serialization failed: {}", e),
        })?;

        self.client
            .publish(subject.clone(), bytes.into())
            .await
            .map_err(|e| EventBusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        // Publish buffers locally; flush waits for the server to take it.
        self.client.flush().await.map_err(|e| EventBusError::Publish {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        debug!(subject = %subject, "Event published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_layout() {
        assert_eq!(
            NatsEventBus::subject("ride.requested", "a1b2"),
            "ride.requested.a1b2"
        );
        assert_eq!(
            NatsEventBus::subject("supply.demand.snapshot", "8860145181bffff"),
            "supply.demand.snapshot.8860145181bffff"
        );
    }
}
