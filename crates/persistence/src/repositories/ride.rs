//! Ride repository for database operations.
//!
//! Every mutating update increments the version column and guards its
//! WHERE clause with the pre-read version; zero rows affected means the
//! caller lost the race.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::entities::RideEntity;
use crate::metrics::QueryTimer;
use domain::models::ride::RideStatus;

const RIDE_COLUMNS: &str = r#"
    id, rider_id, tenant_id, region_id,
    pickup_latitude, pickup_longitude, destination_latitude, destination_longitude,
    required_tier, payment_method, status, idempotency_key, request_hash,
    assigned_driver_id, attempt_count, version, created_at, updated_at
"#;

/// Input data for inserting a ride row.
///
/// Every creation carries an idempotency key; the gateway rejects
/// requests without one before they reach the engine.
#[derive(Debug, Clone)]
pub struct RideInput {
    pub rider_id: String,
    pub tenant_id: String,
    pub region_id: String,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub destination_latitude: f64,
    pub destination_longitude: f64,
    pub required_tier: String,
    pub payment_method: String,
    pub idempotency_key: String,
    pub request_hash: String,
}

/// Repository for ride database operations.
#[derive(Clone)]
pub struct RideRepository {
    pool: PgPool,
}

impl RideRepository {
    /// Creates a new RideRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create a ride at PENDING, idempotent on (tenant, idempotency key).
    ///
    /// Uses INSERT ... ON CONFLICT DO NOTHING against the partial unique
    /// index, then fetches the row. Returns (entity, was_created).
    pub async fn create(&self, input: RideInput) -> Result<(RideEntity, bool), sqlx::Error> {
        let timer = QueryTimer::new("create_ride");

        let insert_result = sqlx::query(
            r#"
            INSERT INTO rides (
                rider_id, tenant_id, region_id,
                pickup_latitude, pickup_longitude,
                destination_latitude, destination_longitude,
                required_tier, payment_method, status,
                idempotency_key, request_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'PENDING', $10, $11)
            ON CONFLICT (tenant_id, idempotency_key) WHERE idempotency_key IS NOT NULL
            DO NOTHING
            "#,
        )
        .bind(&input.rider_id)
        .bind(&input.tenant_id)
        .bind(&input.region_id)
        .bind(input.pickup_latitude)
        .bind(input.pickup_longitude)
        .bind(input.destination_latitude)
        .bind(input.destination_longitude)
        .bind(&input.required_tier)
        .bind(&input.payment_method)
        .bind(&input.idempotency_key)
        .bind(&input.request_hash)
        .execute(&self.pool)
        .await?;

        let was_created = insert_result.rows_affected() > 0;

        let entity = self
            .find_by_idempotency_key(&input.tenant_id, &input.idempotency_key)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        timer.record();
        Ok((entity, was_created))
    }

    /// Find ride by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RideEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_ride_by_id");

        let result = sqlx::query_as::<_, RideEntity>(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Re-read a ride inside an open transaction.
    pub async fn find_by_id_tx(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<RideEntity>, sqlx::Error> {
        sqlx::query_as::<_, RideEntity>(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Find ride by tenant and idempotency key.
    pub async fn find_by_idempotency_key(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<Option<RideEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_ride_by_idempotency_key");

        let result = sqlx::query_as::<_, RideEntity>(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides WHERE tenant_id = $1 AND idempotency_key = $2"
        ))
        .bind(tenant_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Move a ride to DISPATCHING and count the attempt, version-guarded.
    pub async fn begin_dispatch_tx(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
        version: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE rides
            SET status = 'DISPATCHING',
                attempt_count = attempt_count + 1,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(ride_id)
        .bind(version)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Terminal transition to NO_DRIVER_FOUND, version-guarded.
    pub async fn mark_no_driver_found_tx(
        &self,
        conn: &mut PgConnection,
        ride_id: Uuid,
        version: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE rides
            SET status = 'NO_DRIVER_FOUND',
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(ride_id)
        .bind(version)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Accept a ride for a driver.
    ///
    /// The WHERE clause pins both the pre-read version and the
    /// DISPATCHING status; `None` means another driver won the race.
    pub async fn accept(
        &self,
        ride_id: Uuid,
        driver_id: &str,
        version: i64,
    ) -> Result<Option<RideEntity>, sqlx::Error> {
        let timer = QueryTimer::new("accept_ride");

        let result = sqlx::query_as::<_, RideEntity>(&format!(
            r#"
            UPDATE rides
            SET status = 'ACCEPTED',
                assigned_driver_id = $2,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $3 AND status = 'DISPATCHING'
            RETURNING {RIDE_COLUMNS}
            "#
        ))
        .bind(ride_id)
        .bind(driver_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }

    /// Version-guarded status transition from an expected current status.
    pub async fn transition(
        &self,
        ride_id: Uuid,
        from: RideStatus,
        to: RideStatus,
        version: i64,
    ) -> Result<Option<RideEntity>, sqlx::Error> {
        let timer = QueryTimer::new("transition_ride");

        let result = sqlx::query_as::<_, RideEntity>(&format!(
            r#"
            UPDATE rides
            SET status = $4,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2 AND status = $3
            RETURNING {RIDE_COLUMNS}
            "#
        ))
        .bind(ride_id)
        .bind(version)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ride_input_creation() {
        let input = RideInput {
            rider_id: "usr_101".to_string(),
            tenant_id: "default".to_string(),
            region_id: "ap-south-1".to_string(),
            pickup_latitude: 12.9716,
            pickup_longitude: 77.5946,
            destination_latitude: 12.9352,
            destination_longitude: 77.6245,
            required_tier: "ECONOMY".to_string(),
            payment_method: "CARD".to_string(),
            idempotency_key: "ik-1".to_string(),
            request_hash: shared::crypto::sha256_hex("body"),
        };
        assert_eq!(input.idempotency_key, "ik-1");
        assert_eq!(input.request_hash.len(), 64);
    }

    #[test]
    fn test_ride_columns_cover_entity() {
        for column in [
            "idempotency_key",
            "request_hash",
            "assigned_driver_id",
            "attempt_count",
            "version",
        ] {
            assert!(RIDE_COLUMNS.contains(column));
        }
    }
}
