//! Offer timeout sweep.
//!
//! Every few seconds, close expired open offers as TIMEOUT and re-enter
//! the dispatch loop for their rides. Timeouts are normal flow; multiple
//! sweep instances coordinate through the per-ride dispatch lock.

use std::sync::Arc;

use persistence::repositories::DriverOfferRepository;
use sqlx::PgPool;
use tracing::info;

use crate::services::DispatchEngine;

use super::scheduler::{Job, JobFrequency};

/// Offers examined per sweep.
const SWEEP_BATCH: i64 = 100;

/// Background job closing expired offers and re-dispatching their rides.
pub struct OfferTimeoutJob {
    offers: DriverOfferRepository,
    dispatch: Arc<DispatchEngine>,
    interval_secs: u64,
}

impl OfferTimeoutJob {
    /// Create a new offer timeout sweep.
    pub fn new(pool: PgPool, dispatch: Arc<DispatchEngine>, interval_secs: u64) -> Self {
        Self {
            offers: DriverOfferRepository::new(pool),
            dispatch,
            interval_secs,
        }
    }
}

#[async_trait::async_trait]
impl Job for OfferTimeoutJob {
    fn name(&self) -> &'static str {
        "offer_timeout"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let expired = self
            .offers
            .find_expired_open(SWEEP_BATCH)
            .await
            .map_err(|e| format!("Failed to scan expired offers: {}", e))?;

        if expired.is_empty() {
            return Ok(());
        }
        info!(count = expired.len(), "Expired offers found");

        for offer in expired {
            self.dispatch
                .handle_offer_timeout(offer.id, offer.ride_id, &offer.driver_id)
                .await
                .map_err(|e| format!("Failed to time out offer {}: {}", offer.id, e))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_job_frequency_follows_config() {
        let freq = JobFrequency::Seconds(5);
        assert_eq!(freq.duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_sweep_batch_is_bounded() {
        assert!(SWEEP_BATCH >= 1);
        assert!(SWEEP_BATCH <= 1000);
    }
}
