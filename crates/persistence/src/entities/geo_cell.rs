//! Geo cell entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use domain::models::surge::GeoCellSnapshot;

/// Database row mapping for the geo_cells table.
#[derive(Debug, Clone, FromRow)]
pub struct GeoCellEntity {
    pub cell_id: String,
    pub region_id: String,
    pub tenant_id: String,
    pub active_drivers: i32,
    pub pending_rides: i32,
    pub surge_multiplier: f64,
    pub computed_at: DateTime<Utc>,
}

impl GeoCellEntity {
    /// Convert to domain model.
    pub fn into_domain(self) -> GeoCellSnapshot {
        GeoCellSnapshot {
            cell_id: self.cell_id,
            region_id: self.region_id,
            tenant_id: self.tenant_id,
            active_drivers: self.active_drivers,
            pending_rides: self.pending_rides,
            surge_multiplier: self.surge_multiplier,
            computed_at: self.computed_at,
        }
    }
}

impl From<GeoCellEntity> for GeoCellSnapshot {
    fn from(entity: GeoCellEntity) -> Self {
        entity.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_to_domain() {
        let e = GeoCellEntity {
            cell_id: "8860145181bffff".to_string(),
            region_id: "ap-south-1".to_string(),
            tenant_id: "default".to_string(),
            active_drivers: 12,
            pending_rides: 30,
            surge_multiplier: 2.25,
            computed_at: Utc::now(),
        };
        let snapshot: GeoCellSnapshot = e.into();
        assert_eq!(snapshot.cell_id, "8860145181bffff");
        assert_eq!(snapshot.surge_multiplier, 2.25);
    }
}
