//! Payment orchestrator.
//!
//! Consumes trip-ended events and owns the payment lifecycle. The payment
//! row and its `payment.initiated` outbox row are written in one database
//! transaction, so the event cannot be lost between the write and the
//! publish (the dual-write problem). The PSP charge runs asynchronously
//! behind the circuit breaker and retry policy; trip completion latency
//! depends only on the local transaction.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use domain::models::events::{PaymentEvent, TripEndedEvent};
use domain::models::payment::PaymentStatus;
use domain::models::topics;
use domain::services::psp::{ChargeRequest, PspClient, PspError};
use persistence::entities::PaymentEntity;
use persistence::flags::{FeatureFlag, FeatureFlagStore};
use persistence::repositories::{OutboxRepository, PaymentInput, PaymentRepository};

use crate::services::resilience::{BreakerError, CircuitBreaker, RetryPolicy};

/// Errors surfaced by payment orchestration.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Orchestrates payment rows, outbox entries and the async PSP charge.
pub struct PaymentOrchestrator {
    pool: PgPool,
    payments: PaymentRepository,
    outbox: OutboxRepository,
    flags: FeatureFlagStore,
    psp: Arc<dyn PspClient>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl PaymentOrchestrator {
    pub fn new(
        pool: PgPool,
        flags: FeatureFlagStore,
        psp: Arc<dyn PspClient>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            payments: PaymentRepository::new(pool.clone()),
            outbox: OutboxRepository::new(pool.clone()),
            pool,
            flags,
            psp,
            breaker,
            retry,
        }
    }

    // ------------------------------------------------------------------
    // Entry point
    // ------------------------------------------------------------------

    /// React to a trip-ended event.
    ///
    /// Idempotent on trip id: the unique index makes replays no-ops.
    /// Returns the payment id when a new payment was created.
    pub async fn initiate(
        self: &Arc<Self>,
        event: &TripEndedEvent,
    ) -> Result<Option<Uuid>, PaymentError> {
        let Some(amount) = event.fare_amount.filter(|_| event.is_chargeable()) else {
            return Ok(None);
        };

        let input = PaymentInput {
            trip_id: event.trip_id.clone(),
            rider_id: event.rider_id.clone(),
            tenant_id: event.tenant_id.clone(),
            amount,
            currency: event.currency.clone(),
            payment_method: event.payment_method.as_str().to_string(),
        };

        let mut tx = self.pool.begin().await?;
        let Some(payment) = self.payments.insert_pending_tx(&mut *tx, &input).await? else {
            tx.rollback().await?;
            info!(trip_id = %event.trip_id, "Payment already exists for trip (idempotent)");
            return Ok(None);
        };

        let initiated = payment_event(&payment);
        self.outbox
            .insert_tx(
                &mut *tx,
                payment.id,
                &payment.tenant_id,
                topics::PAYMENT_INITIATED,
                serde_json::to_value(&initiated).unwrap_or_default(),
            )
            .await?;
        tx.commit().await?;

        info!(payment_id = %payment.id, trip_id = %payment.trip_id, "Payment initiated");

        if !self
            .flags
            .is_enabled(&payment.tenant_id, FeatureFlag::AutoPaymentCharge, true)
        {
            info!(
                payment_id = %payment.id,
                "Auto charge disabled for tenant, leaving payment PENDING for manual review"
            );
            return Ok(Some(payment.id));
        }

        // The charge must not block trip completion.
        let this = Arc::clone(self);
        let payment_id = payment.id;
        tokio::spawn(async move {
            if let Err(e) = this.charge(payment_id).await {
                warn!(payment_id = %payment_id, error = %e, "Async charge task failed");
            }
        });

        Ok(Some(payment.id))
    }

    // ------------------------------------------------------------------
    // Charge path
    // ------------------------------------------------------------------

    /// Charge a payment through the breaker + retry policies and record
    /// the outcome. Used by the async charge task and by reconciliation.
    pub async fn charge(&self, payment_id: Uuid) -> Result<PaymentStatus, PaymentError> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or(PaymentError::NotFound)?;

        if payment.status == PaymentStatus::Captured.as_str() {
            return Ok(PaymentStatus::Captured);
        }
        let was_failed = payment.status == PaymentStatus::Failed.as_str();

        let request = ChargeRequest {
            rider_id: payment.rider_id.clone(),
            amount: payment.amount,
            currency: payment.currency.trim().to_string(),
            payment_method: payment
                .payment_method
                .parse()
                .unwrap_or(domain::models::PaymentMethod::Cash),
        };

        let outcome = self
            .breaker
            .call(|| {
                self.retry
                    .run(|| self.psp.charge(&request), PspError::is_retryable)
            })
            .await;

        match outcome {
            Ok(receipt) => {
                self.record_captured(payment_id, &receipt.reference).await?;
                Ok(PaymentStatus::Captured)
            }
            Err(error) => {
                let reason = match &error {
                    BreakerError::Open => "circuit breaker open".to_string(),
                    BreakerError::Inner(e) => e.to_string(),
                };
                self.record_failed(payment_id, &reason, was_failed).await?;
                Ok(PaymentStatus::Failed)
            }
        }
    }

    async fn record_captured(&self, payment_id: Uuid, reference: &str) -> Result<(), PaymentError> {
        let mut tx = self.pool.begin().await?;
        let payment = self
            .payments
            .mark_captured_tx(&mut *tx, payment_id, reference)
            .await?
            .ok_or(PaymentError::NotFound)?;

        let event = payment_event(&payment);
        self.outbox
            .insert_tx(
                &mut *tx,
                payment.id,
                &payment.tenant_id,
                topics::PAYMENT_CAPTURED,
                serde_json::to_value(&event).unwrap_or_default(),
            )
            .await?;
        tx.commit().await?;

        metrics::counter!("ride_hailing_payments_captured_total").increment(1);
        info!(payment_id = %payment_id, reference = reference, "Payment captured");
        Ok(())
    }

    /// Fallback: mark FAILED and, on the first failure only, announce it.
    /// Repeat reconciliation failures bump the retry count silently so the
    /// per-payment event sequence stays INITIATED → FAILED [→ CAPTURED].
    async fn record_failed(
        &self,
        payment_id: Uuid,
        reason: &str,
        was_already_failed: bool,
    ) -> Result<(), PaymentError> {
        let mut tx = self.pool.begin().await?;
        let payment = self
            .payments
            .mark_failed_tx(&mut *tx, payment_id, reason)
            .await?
            .ok_or(PaymentError::NotFound)?;

        if !was_already_failed {
            let event = payment_event(&payment);
            self.outbox
                .insert_tx(
                    &mut *tx,
                    payment.id,
                    &payment.tenant_id,
                    topics::PAYMENT_FAILED,
                    serde_json::to_value(&event).unwrap_or_default(),
                )
                .await?;
        }
        tx.commit().await?;

        metrics::counter!("ride_hailing_payments_failed_total").increment(1);
        warn!(
            payment_id = %payment_id,
            retry_count = payment.retry_count,
            reason = reason,
            "Payment charge failed"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reconciliation sweeps
    // ------------------------------------------------------------------

    /// Retry FAILED payments (skipping exhausted ones) through the same
    /// PSP + breaker path as the original charge.
    pub async fn reconcile_failed(
        &self,
        max_retries: i32,
        batch_size: i64,
    ) -> Result<usize, PaymentError> {
        let failed = self
            .payments
            .find_failed_for_retry(max_retries, batch_size)
            .await?;
        let count = failed.len();

        for payment in failed {
            match self.charge(payment.id).await {
                Ok(PaymentStatus::Captured) => {
                    info!(payment_id = %payment.id, "Reconciliation captured payment");
                }
                Ok(_) => {}
                Err(e) => warn!(payment_id = %payment.id, error = %e, "Reconciliation failed"),
            }
        }

        Ok(count)
    }

    /// Charge PENDING payments whose orchestrator crashed between the
    /// commit and the async charge scheduling.
    pub async fn reconcile_stale_pending(
        &self,
        older_than_secs: i64,
        batch_size: i64,
    ) -> Result<usize, PaymentError> {
        let stale = self
            .payments
            .find_stale_pending(older_than_secs, batch_size)
            .await?;
        let count = stale.len();

        for payment in stale {
            match self.charge(payment.id).await {
                Ok(status) => {
                    info!(payment_id = %payment.id, status = %status, "Stale payment reconciled");
                }
                Err(e) => warn!(payment_id = %payment.id, error = %e, "Stale reconcile failed"),
            }
        }

        Ok(count)
    }
}

/// Build the bus envelope for a payment's current state.
fn payment_event(payment: &PaymentEntity) -> PaymentEvent {
    PaymentEvent {
        payment_id: payment.id,
        trip_id: payment.trip_id.clone(),
        rider_id: payment.rider_id.clone(),
        tenant_id: payment.tenant_id.clone(),
        amount: payment.amount,
        currency: payment.currency.trim().to_string(),
        status: payment
            .status
            .parse()
            .unwrap_or(domain::models::PaymentStatus::Pending),
        psp_reference: payment.psp_reference.clone(),
        failure_reason: payment.failure_reason.clone(),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn entity(status: &str) -> PaymentEntity {
        PaymentEntity {
            id: Uuid::new_v4(),
            trip_id: "trip_x".to_string(),
            rider_id: "usr_101".to_string(),
            tenant_id: "default".to_string(),
            amount: Decimal::new(2093, 2),
            currency: "USD".to_string(),
            payment_method: "CARD".to_string(),
            psp_reference: None,
            status: status.to_string(),
            failure_reason: None,
            retry_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_payment_event_reflects_entity() {
        let mut e = entity("FAILED");
        e.failure_reason = Some("psp unavailable".to_string());
        let event = payment_event(&e);
        assert_eq!(event.status, domain::models::PaymentStatus::Failed);
        assert_eq!(event.failure_reason.as_deref(), Some("psp unavailable"));
        assert_eq!(event.amount, Decimal::new(2093, 2));
    }

    #[test]
    fn test_payment_event_trims_char_currency() {
        // CHAR(3) columns read back padded; the envelope must not be.
        let mut e = entity("PENDING");
        e.currency = "USD".to_string();
        assert_eq!(payment_event(&e).currency, "USD");
    }
}
