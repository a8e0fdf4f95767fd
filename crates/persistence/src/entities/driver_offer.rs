//! Driver offer entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::offer::{DriverOffer, OfferResponse};

/// Database row mapping for the driver_offers table.
#[derive(Debug, Clone, FromRow)]
pub struct DriverOfferEntity {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub driver_id: String,
    pub attempt_number: i32,
    pub offered_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub ttl_seconds: i32,
    pub response: Option<String>,
}

impl DriverOfferEntity {
    /// Convert to domain model.
    pub fn into_domain(self) -> DriverOffer {
        let response = self
            .response
            .as_deref()
            .and_then(|r| r.parse::<OfferResponse>().ok());

        DriverOffer {
            id: self.id,
            ride_id: self.ride_id,
            driver_id: self.driver_id,
            attempt_number: self.attempt_number,
            offered_at: self.offered_at,
            responded_at: self.responded_at,
            ttl_seconds: self.ttl_seconds,
            response,
        }
    }
}

impl From<DriverOfferEntity> for DriverOffer {
    fn from(entity: DriverOfferEntity) -> Self {
        entity.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_offer_to_domain() {
        let e = DriverOfferEntity {
            id: Uuid::new_v4(),
            ride_id: Uuid::new_v4(),
            driver_id: "drv_001".to_string(),
            attempt_number: 1,
            offered_at: Utc::now(),
            responded_at: None,
            ttl_seconds: 15,
            response: None,
        };
        let offer: DriverOffer = e.into();
        assert!(offer.is_open());
        assert_eq!(offer.ttl_seconds, 15);
    }

    #[test]
    fn test_responded_offer_to_domain() {
        let e = DriverOfferEntity {
            id: Uuid::new_v4(),
            ride_id: Uuid::new_v4(),
            driver_id: "drv_001".to_string(),
            attempt_number: 2,
            offered_at: Utc::now(),
            responded_at: Some(Utc::now()),
            ttl_seconds: 15,
            response: Some("TIMEOUT".to_string()),
        };
        let offer: DriverOffer = e.into();
        assert_eq!(offer.response, Some(OfferResponse::Timeout));
        assert!(!offer.is_open());
    }
}
