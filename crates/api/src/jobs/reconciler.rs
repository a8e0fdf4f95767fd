//! Payment reconciliation sweeps.
//!
//! Two schedules: FAILED payments are re-charged every few minutes until
//! their retry budget is spent; PENDING payments that outlived the
//! staleness threshold (the orchestrator crashed between commit and
//! charge scheduling) are picked up on a slower cadence. Both go through
//! the same PSP + circuit-breaker path as the original charge.

use std::sync::Arc;

use tracing::info;

use crate::config::ReconcilerConfig;
use crate::services::PaymentOrchestrator;

use super::scheduler::{Job, JobFrequency};

/// Background job retrying FAILED payments.
pub struct FailedPaymentSweepJob {
    payments: Arc<PaymentOrchestrator>,
    config: ReconcilerConfig,
}

impl FailedPaymentSweepJob {
    /// Create a new FAILED payment sweep.
    pub fn new(payments: Arc<PaymentOrchestrator>, config: ReconcilerConfig) -> Self {
        Self { payments, config }
    }
}

#[async_trait::async_trait]
impl Job for FailedPaymentSweepJob {
    fn name(&self) -> &'static str {
        "reconcile_failed_payments"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.config.failed_sweep_interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let swept = self
            .payments
            .reconcile_failed(self.config.max_retries, self.config.batch_size)
            .await
            .map_err(|e| format!("Failed payment sweep error: {}", e))?;

        if swept > 0 {
            info!(swept = swept, "Reconciled FAILED payments");
        }
        Ok(())
    }
}

/// Background job charging stale PENDING payments.
pub struct StalePendingSweepJob {
    payments: Arc<PaymentOrchestrator>,
    config: ReconcilerConfig,
}

impl StalePendingSweepJob {
    /// Create a new stale-PENDING sweep.
    pub fn new(payments: Arc<PaymentOrchestrator>, config: ReconcilerConfig) -> Self {
        Self { payments, config }
    }
}

#[async_trait::async_trait]
impl Job for StalePendingSweepJob {
    fn name(&self) -> &'static str {
        "reconcile_stale_pending"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.config.stale_sweep_interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let swept = self
            .payments
            .reconcile_stale_pending(self.config.stale_threshold_secs, self.config.batch_size)
            .await
            .map_err(|e| format!("Stale pending sweep error: {}", e))?;

        if swept > 0 {
            info!(swept = swept, "Reconciled stale PENDING payments");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sweep_cadences() {
        let config = ReconcilerConfig::default();
        assert_eq!(
            JobFrequency::Seconds(config.failed_sweep_interval_secs).duration(),
            Duration::from_secs(300)
        );
        assert_eq!(
            JobFrequency::Seconds(config.stale_sweep_interval_secs).duration(),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_stale_threshold_matches_sweep() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.stale_threshold_secs, 600);
        assert_eq!(config.max_retries, 5);
    }
}
