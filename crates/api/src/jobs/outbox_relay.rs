//! Outbox relay.
//!
//! Drains PENDING outbox rows in creation order and publishes them to the
//! event bus, marking each row inside the same transaction that locked
//! the batch. A row is never dropped: publish failures count retries and
//! only retry exhaustion parks a row as FAILED for ops.

use std::sync::Arc;

use domain::services::event_bus::EventBus;
use persistence::repositories::OutboxRepository;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::OutboxConfig;

use super::scheduler::{Job, JobFrequency};

/// Background job publishing the transactional outbox.
pub struct OutboxRelayJob {
    pool: PgPool,
    outbox: OutboxRepository,
    bus: Arc<dyn EventBus>,
    config: OutboxConfig,
}

impl OutboxRelayJob {
    /// Create a new outbox relay.
    pub fn new(pool: PgPool, bus: Arc<dyn EventBus>, config: OutboxConfig) -> Self {
        Self {
            outbox: OutboxRepository::new(pool.clone()),
            pool,
            bus,
            config,
        }
    }

    /// One relay cycle. Public so tests and callers can drain on demand.
    pub async fn drain_once(&self) -> Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let batch = self
            .outbox
            .lock_pending_batch_tx(&mut *tx, self.config.batch_size)
            .await?;
        if batch.is_empty() {
            tx.rollback().await?;
            return Ok(0);
        }

        let mut published = 0;
        for row in batch {
            // The payment id is the partition key, so per-payment order
            // follows the FIFO batch order.
            let result = self
                .bus
                .publish(&row.event_type, &row.payment_id.to_string(), row.payload.clone())
                .await;

            match result {
                Ok(()) => {
                    self.outbox.mark_published_tx(&mut *tx, row.id).await?;
                    published += 1;
                }
                Err(e) => {
                    let status = self
                        .outbox
                        .record_failure_tx(&mut *tx, row.id, self.config.max_retries)
                        .await?;
                    warn!(
                        outbox_id = %row.id,
                        event_type = %row.event_type,
                        status = %status,
                        error = %e,
                        "Outbox publish failed"
                    );
                }
            }
        }
        tx.commit().await?;

        if published > 0 {
            metrics::counter!("ride_hailing_outbox_published_total").increment(published as u64);
            info!(published = published, "Outbox rows published");
        }
        Ok(published)
    }
}

#[async_trait::async_trait]
impl Job for OutboxRelayJob {
    fn name(&self) -> &'static str {
        "outbox_relay"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Millis(self.config.poll_interval_ms)
    }

    async fn execute(&self) -> Result<(), String> {
        self.drain_once()
            .await
            .map(|_| ())
            .map_err(|e| format!("Outbox relay cycle failed: {}", e))
    }
}
