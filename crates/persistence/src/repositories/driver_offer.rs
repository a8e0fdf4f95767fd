//! Driver offer repository for database operations.
//!
//! Offers are append-only: the only mutation is recording the response,
//! exactly once, guarded by `response IS NULL`.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::DriverOfferEntity;
use crate::metrics::QueryTimer;
use domain::models::offer::OfferResponse;

const OFFER_COLUMNS: &str =
    "id, ride_id, driver_id, attempt_number, offered_at, responded_at, ttl_seconds, response";

/// Repository for driver offer database operations.
#[derive(Clone)]
pub struct DriverOfferRepository {
    pool: PgPool,
}

impl DriverOfferRepository {
    /// Creates a new DriverOfferRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an offer inside the dispatch transaction.
    pub async fn insert_tx(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
        driver_id: &str,
        attempt_number: i32,
        ttl_seconds: i32,
    ) -> Result<DriverOfferEntity, sqlx::Error> {
        sqlx::query_as::<_, DriverOfferEntity>(&format!(
            r#"
            INSERT INTO driver_offers (ride_id, driver_id, attempt_number, ttl_seconds)
            VALUES ($1, $2, $3, $4)
            RETURNING {OFFER_COLUMNS}
            "#
        ))
        .bind(ride_id)
        .bind(driver_id)
        .bind(attempt_number)
        .bind(ttl_seconds)
        .fetch_one(conn)
        .await
    }

    /// The open offer a driver holds for a ride, if any.
    pub async fn find_open(
        &self,
        ride_id: Uuid,
        driver_id: &str,
    ) -> Result<Option<DriverOfferEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_open_offer");

        let result = sqlx::query_as::<_, DriverOfferEntity>(&format!(
            r#"
            SELECT {OFFER_COLUMNS} FROM driver_offers
            WHERE ride_id = $1 AND driver_id = $2 AND response IS NULL
            "#
        ))
        .bind(ride_id)
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Record a response on an open offer. Returns false when the offer
    /// was already closed (double responses lose here).
    pub async fn respond(
        &self,
        offer_id: Uuid,
        response: OfferResponse,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("respond_offer");

        let result = sqlx::query(
            r#"
            UPDATE driver_offers
            SET response = $2, responded_at = NOW()
            WHERE id = $1 AND response IS NULL
            "#,
        )
        .bind(offer_id)
        .bind(response.as_str())
        .execute(&self.pool)
        .await?;

        timer.record();
        Ok(result.rows_affected() == 1)
    }

    /// Every driver ever offered this ride, inside the dispatch
    /// transaction. Seeds the tried-set so re-dispatch never repeats a
    /// driver, even across process restarts.
    pub async fn tried_driver_ids_tx(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT driver_id FROM driver_offers WHERE ride_id = $1")
                .bind(ride_id)
                .fetch_all(conn)
                .await?;

        Ok(rows.into_iter().map(|(driver_id,)| driver_id).collect())
    }

    /// Open offers whose TTL has elapsed, for rides still DISPATCHING.
    pub async fn find_expired_open(
        &self,
        limit: i64,
    ) -> Result<Vec<DriverOfferEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_expired_open_offers");

        let result = sqlx::query_as::<_, DriverOfferEntity>(
            r#"
            SELECT o.id, o.ride_id, o.driver_id, o.attempt_number, o.offered_at,
                   o.responded_at, o.ttl_seconds, o.response
            FROM driver_offers o
            JOIN rides r ON r.id = o.ride_id
            WHERE r.status = 'DISPATCHING'
              AND o.response IS NULL
              AND o.offered_at + make_interval(secs => o.ttl_seconds::double precision) <= NOW()
            ORDER BY o.offered_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await;

        timer.record();
        result
    }

    /// All offers for a ride, oldest first.
    pub async fn find_by_ride(&self, ride_id: Uuid) -> Result<Vec<DriverOfferEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_offers_by_ride");

        let result = sqlx::query_as::<_, DriverOfferEntity>(&format!(
            r#"
            SELECT {OFFER_COLUMNS} FROM driver_offers
            WHERE ride_id = $1
            ORDER BY attempt_number ASC
            "#
        ))
        .bind(ride_id)
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
    fn test_offer_columns_cover_entity() {
        for column in [
            "ride_id",
            "driver_id",
            "attempt_number",
            "offered_at",
            "responded_at",
            "ttl_seconds",
            "response",
        ] {
            assert!(OFFER_COLUMNS.contains(column));
        }
    }

    #[test]
    fn test_response_bindings_are_storage_strings() {
        assert_eq!(OfferResponse::Accepted.as_str(), "ACCEPTED");
        assert_eq!(OfferResponse::Declined.as_str(), "DECLINED");
        assert_eq!(OfferResponse::Timeout.as_str(), "TIMEOUT");
    }
}
