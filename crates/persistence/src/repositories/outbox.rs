//! Payment outbox repository for database operations.
//!
//! The relay's polling batch is FIFO on creation time so that events for
//! the same payment publish in creation order; `FOR UPDATE SKIP LOCKED`
//! keeps concurrent relay instances off each other's rows.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::OutboxEntity;
use crate::metrics::QueryTimer;

const OUTBOX_COLUMNS: &str =
    "id, payment_id, tenant_id, event_type, payload, status, created_at, published_at, retry_count";

/// Repository for payment outbox database operations.
#[derive(Clone)]
pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    /// Creates a new OutboxRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a PENDING outbox row inside the caller's transaction.
    pub async fn insert_tx(
        &self,
        conn: &mut PgConnection,
        payment_id: Uuid,
        tenant_id: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<OutboxEntity, sqlx::Error> {
        sqlx::query_as::<_, OutboxEntity>(&format!(
            r#"
            INSERT INTO payment_outbox (payment_id, tenant_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING {OUTBOX_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(tenant_id)
        .bind(event_type)
        .bind(payload)
        .fetch_one(conn)
        .await
    }

    /// Lock the next PENDING batch for this relay cycle, oldest first.
    pub async fn lock_pending_batch_tx(
        &self,
        conn: &mut PgConnection,
        limit: i64,
    ) -> Result<Vec<OutboxEntity>, sqlx::Error> {
        sqlx::query_as::<_, OutboxEntity>(&format!(
            r#"
            SELECT {OUTBOX_COLUMNS} FROM payment_outbox
            WHERE status = 'PENDING'
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .bind(limit)
        .fetch_all(conn)
        .await
    }

    /// Mark a row PUBLISHED with the publication instant.
    pub async fn mark_published_tx(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE payment_outbox
            SET status = 'PUBLISHED', published_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Count a publish failure; rows that exhaust their retries go FAILED
    /// (terminal, ops intervention only). Returns the resulting status.
    pub async fn record_failure_tx(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        max_retries: i32,
    ) -> Result<String, sqlx::Error> {
        let (status,): (String,) = sqlx::query_as(
            r#"
            UPDATE payment_outbox
            SET retry_count = retry_count + 1,
                status = CASE WHEN retry_count + 1 >= $2 THEN 'FAILED' ELSE status END
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(id)
        .bind(max_retries)
        .fetch_one(conn)
        .await?;
        Ok(status)
    }

    /// All outbox rows for a payment, in creation order.
    pub async fn find_by_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Vec<OutboxEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_outbox_by_payment");

        let result = sqlx::query_as::<_, OutboxEntity>(&format!(
            r#"
            SELECT {OUTBOX_COLUMNS} FROM payment_outbox
            WHERE payment_id = $1
            ORDER BY created_at ASC
            "#
        ))
        .bind(payment_id)
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
    fn test_outbox_columns_cover_entity() {
        for column in [
            "payment_id",
            "event_type",
            "payload",
            "published_at",
            "retry_count",
        ] {
            assert!(OUTBOX_COLUMNS.contains(column));
        }
    }
}
