//! Geo cell repository for database operations.

use sqlx::PgPool;

use crate::entities::GeoCellEntity;
use crate::metrics::QueryTimer;
use domain::models::surge::GeoCellSnapshot;

/// Repository for geo cell audit rows.
#[derive(Clone)]
pub struct GeoCellRepository {
    pool: PgPool,
}

impl GeoCellRepository {
    /// Creates a new GeoCellRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Overwrite the audit row for a cell with the latest computation.
    pub async fn upsert(&self, snapshot: &GeoCellSnapshot) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("upsert_geo_cell");

        sqlx::query(
            r#"
            INSERT INTO geo_cells (
                cell_id, region_id, tenant_id,
                active_drivers, pending_rides, surge_multiplier, computed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, cell_id) DO UPDATE
            SET region_id = EXCLUDED.region_id,
                active_drivers = EXCLUDED.active_drivers,
                pending_rides = EXCLUDED.pending_rides,
                surge_multiplier = EXCLUDED.surge_multiplier,
                computed_at = EXCLUDED.computed_at
            "#,
        )
        .bind(&snapshot.cell_id)
        .bind(&snapshot.region_id)
        .bind(&snapshot.tenant_id)
        .bind(snapshot.active_drivers)
        .bind(snapshot.pending_rides)
        .bind(snapshot.surge_multiplier)
        .bind(snapshot.computed_at)
        .execute(&self.pool)
        .await?;

        timer.record();
        Ok(())
    }

    /// Latest audit row for a cell.
    pub async fn find(
        &self,
        tenant_id: &str,
        cell_id: &str,
    ) -> Result<Option<GeoCellEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_geo_cell");

        let result = sqlx::query_as::<_, GeoCellEntity>(
            r#"
            SELECT cell_id, region_id, tenant_id,
                   active_drivers, pending_rides, surge_multiplier, computed_at
            FROM geo_cells
            WHERE tenant_id = $1 AND cell_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(cell_id)
        .fetch_optional(&self.pool)
        .await;

        timer.record();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_snapshot_binds() {
        let snapshot = GeoCellSnapshot {
            cell_id: "8860145181bffff".to_string(),
            region_id: "ap-south-1".to_string(),
            tenant_id: "default".to_string(),
            active_drivers: 10,
            pending_rides: 25,
            surge_multiplier: 1.75,
            computed_at: Utc::now(),
        };
        assert!(snapshot.surge_multiplier >= 1.0 && snapshot.surge_multiplier <= 3.0);
    }
}
