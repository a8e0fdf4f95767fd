//! Ride entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::payment::PaymentMethod;
use domain::models::ride::{Ride, RideStatus, VehicleTier};

/// Database row mapping for the rides table.
#[derive(Debug, Clone, FromRow)]
pub struct RideEntity {
    pub id: Uuid,
    pub rider_id: String,
    pub tenant_id: String,
    pub region_id: String,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub destination_latitude: f64,
    pub destination_longitude: f64,
    pub required_tier: String,
    pub payment_method: String,
    pub status: String,
    pub idempotency_key: Option<String>,
    pub request_hash: Option<String>,
    pub assigned_driver_id: Option<String>,
    pub attempt_count: i32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RideEntity {
    /// Convert to domain model.
    pub fn into_domain(self) -> Ride {
        let required_tier = self
            .required_tier
            .parse::<VehicleTier>()
            .unwrap_or(VehicleTier::Economy);
        let payment_method = self
            .payment_method
            .parse::<PaymentMethod>()
            .unwrap_or(PaymentMethod::Cash);
        let status = self.status.parse::<RideStatus>().unwrap_or(RideStatus::Pending);

        Ride {
            id: self.id,
            rider_id: self.rider_id,
            tenant_id: self.tenant_id,
            region_id: self.region_id,
            pickup_latitude: self.pickup_latitude,
            pickup_longitude: self.pickup_longitude,
            destination_latitude: self.destination_latitude,
            destination_longitude: self.destination_longitude,
            required_tier,
            payment_method,
            status,
            idempotency_key: self.idempotency_key,
            request_hash: self.request_hash,
            assigned_driver_id: self.assigned_driver_id,
            attempt_count: self.attempt_count,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl From<RideEntity> for Ride {
    fn from(entity: RideEntity) -> Self {
        entity.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> RideEntity {
        RideEntity {
            id: Uuid::new_v4(),
            rider_id: "usr_101".to_string(),
            tenant_id: "default".to_string(),
            region_id: "ap-south-1".to_string(),
            pickup_latitude: 12.9716,
            pickup_longitude: 77.5946,
            destination_latitude: 12.9352,
            destination_longitude: 77.6245,
            required_tier: "ECONOMY".to_string(),
            payment_method: "CARD".to_string(),
            status: "DISPATCHING".to_string(),
            idempotency_key: Some("ik-1".to_string()),
            request_hash: None,
            assigned_driver_id: None,
            attempt_count: 1,
            version: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_entity_to_domain() {
        let e = entity();
        let ride: Ride = e.clone().into();
        assert_eq!(ride.id, e.id);
        assert_eq!(ride.status, RideStatus::Dispatching);
        assert_eq!(ride.required_tier, VehicleTier::Economy);
        assert_eq!(ride.payment_method, PaymentMethod::Card);
        assert_eq!(ride.version, 2);
    }

    #[test]
    fn test_unknown_status_defaults_to_pending() {
        let mut e = entity();
        e.status = "GARBLED".to_string();
        assert_eq!(e.into_domain().status, RideStatus::Pending);
    }
}
