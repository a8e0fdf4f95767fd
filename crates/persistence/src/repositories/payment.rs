//! Payment repository for database operations.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::PaymentEntity;
use crate::metrics::QueryTimer;

const PAYMENT_COLUMNS: &str = r#"
    id, trip_id, rider_id, tenant_id, amount, currency, payment_method,
    psp_reference, status, failure_reason, retry_count, created_at, updated_at
"#;

/// Input data for inserting a payment row.
#[derive(Debug, Clone)]
pub struct PaymentInput {
    pub trip_id: String,
    pub rider_id: String,
    pub tenant_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
}

/// Repository for payment database operations.
#[derive(Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a PENDING payment inside the orchestrator transaction.
    ///
    /// Idempotent on trip id via the unique index: `None` means a payment
    /// already exists for the trip and nothing was written.
    pub async fn insert_pending_tx(
        &self,
        conn: &mut PgConnection,
        input: &PaymentInput,
    ) -> Result<Option<PaymentEntity>, sqlx::Error> {
        sqlx::query_as::<_, PaymentEntity>(&format!(
            r#"
            INSERT INTO payments (trip_id, rider_id, tenant_id, amount, currency, payment_method)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (trip_id) DO NOTHING
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(&input.trip_id)
        .bind(&input.rider_id)
        .bind(&input.tenant_id)
        .bind(input.amount)
        .bind(&input.currency)
        .bind(&input.payment_method)
        .fetch_optional(conn)
        .await
    }

    /// Find payment by trip id.
    pub async fn find_by_trip_id(
        &self,
        trip_id: &str,
    ) -> Result<Option<PaymentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_payment_by_trip_id");

        let result = sqlx::query_as::<_, PaymentEntity>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE trip_id = $1"
        ))
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Find payment by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PaymentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_payment_by_id");

        let result = sqlx::query_as::<_, PaymentEntity>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Mark a payment CAPTURED with the provider's reference.
    pub async fn mark_captured_tx(
        &self,
        conn: &mut PgConnection,
        payment_id: Uuid,
        psp_reference: &str,
    ) -> Result<Option<PaymentEntity>, sqlx::Error> {
        sqlx::query_as::<_, PaymentEntity>(&format!(
            r#"
            UPDATE payments
            SET status = 'CAPTURED',
                psp_reference = $2,
                failure_reason = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(psp_reference)
        .fetch_optional(conn)
        .await
    }

    /// Mark a payment FAILED, recording the reason and counting the retry.
    pub async fn mark_failed_tx(
        &self,
        conn: &mut PgConnection,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<Option<PaymentEntity>, sqlx::Error> {
        sqlx::query_as::<_, PaymentEntity>(&format!(
            r#"
            UPDATE payments
            SET status = 'FAILED',
                failure_reason = $2,
                retry_count = retry_count + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(reason)
        .fetch_optional(conn)
        .await
    }

    /// FAILED payments still eligible for reconciliation.
    pub async fn find_failed_for_retry(
        &self,
        max_retries: i32,
        limit: i64,
    ) -> Result<Vec<PaymentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_failed_payments");

        let result = sqlx::query_as::<_, PaymentEntity>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE status = 'FAILED' AND retry_count < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#
        ))
        .bind(max_retries)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;

        timer.record();
        result
    }

    /// PENDING payments older than the staleness threshold: the
    /// orchestrator crashed between commit and charge scheduling.
    pub async fn find_stale_pending(
        &self,
        older_than_secs: i64,
        limit: i64,
    ) -> Result<Vec<PaymentEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_stale_pending_payments");

        let result = sqlx::query_as::<_, PaymentEntity>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE status = 'PENDING'
              AND created_at < NOW() - make_interval(secs => $1::double precision)
            ORDER BY created_at ASC
            LIMIT $2
            "#
        ))
        .bind(older_than_secs)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;

        timer.record();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_input_creation() {
        let input = PaymentInput {
            trip_id: "trip_x".to_string(),
            rider_id: "usr_101".to_string(),
            tenant_id: "default".to_string(),
            amount: Decimal::new(2093, 2),
            currency: "USD".to_string(),
            payment_method: "CARD".to_string(),
        };
        assert_eq!(input.amount.to_string(), "20.93");
        assert_eq!(input.currency.len(), 3);
    }

    #[test]
    fn test_payment_columns_cover_entity() {
        for column in [
            "trip_id",
            "psp_reference",
            "failure_reason",
            "retry_count",
        ] {
            assert!(PAYMENT_COLUMNS.contains(column));
        }
    }
}
