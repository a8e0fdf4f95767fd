//! Event bus topics and envelope payloads.
//!
//! Every emitter keys its events by the owning entity id (ride id, payment
//! id, cell id) so that per-entity ordering survives horizontal scale.
//! Envelopes are camelCase JSON with ISO-8601 UTC timestamps.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::PaymentMethod;
use super::ride::RideStatus;

/// Bus topic names. The outbox stores the topic as its event type.
pub mod topics {
    pub const RIDE_REQUESTED: &str = "ride.requested";
    pub const DRIVER_OFFER_SENT: &str = "driver.offer.sent";
    pub const RIDE_ACCEPTED: &str = "ride.accepted";
    pub const RIDE_DECLINED: &str = "ride.declined";
    pub const RIDE_CANCELLED: &str = "ride.cancelled";
    pub const RIDE_NO_DRIVER_FOUND: &str = "ride.no_driver_found";
    pub const RIDE_DRIVER_ARRIVED: &str = "ride.driver_arrived";
    pub const RIDE_IN_PROGRESS: &str = "ride.in_progress";

    pub const TRIP_STARTED: &str = "trip.started";
    pub const TRIP_ENDED: &str = "trip.ended";
    pub const TRIP_PAUSED: &str = "trip.paused";

    pub const PAYMENT_INITIATED: &str = "payment.initiated";
    pub const PAYMENT_CAPTURED: &str = "payment.captured";
    pub const PAYMENT_FAILED: &str = "payment.failed";

    pub const SUPPLY_DEMAND_SNAPSHOT: &str = "supply.demand.snapshot";
    pub const DRIVER_LOCATION_UPDATED: &str = "driver.location.updated";
}

/// Envelope for ride lifecycle events (keyed by ride id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideEvent {
    pub ride_id: Uuid,
    pub rider_id: String,
    pub tenant_id: String,
    pub region_id: String,
    pub status: RideStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Envelope for `driver.offer.sent` (keyed by ride id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferSentEvent {
    pub ride_id: Uuid,
    pub driver_id: String,
    pub tenant_id: String,
    pub region_id: String,
    pub attempt_number: i32,
    pub ttl_seconds: i32,
    pub timestamp: DateTime<Utc>,
}

/// Envelope consumed from `trip.ended` (keyed by trip id).
///
/// Produced by the external Trip Service; the payment orchestrator reacts
/// only when `status` is `ENDED` and `fare_amount` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripEndedEvent {
    pub trip_id: String,
    pub rider_id: String,
    pub tenant_id: String,
    pub region_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fare_amount: Option<Decimal>,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub timestamp: DateTime<Utc>,
}

impl TripEndedEvent {
    /// Whether this event should trigger payment orchestration.
    pub fn is_chargeable(&self) -> bool {
        self.status == "ENDED" && self.fare_amount.is_some()
    }
}

/// Envelope for payment lifecycle events (keyed by payment id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub payment_id: Uuid,
    pub trip_id: String,
    pub rider_id: String,
    pub tenant_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: super::payment::PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psp_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Envelope for `supply.demand.snapshot` (keyed by cell id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplyDemandSnapshot {
    pub cell_id: String,
    pub region_id: String,
    pub tenant_id: String,
    pub active_drivers: i32,
    pub pending_rides: i32,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::PaymentStatus;

    #[test]
    fn test_ride_event_serialization() {
        let event = RideEvent {
            ride_id: Uuid::new_v4(),
            rider_id: "usr_101".to_string(),
            tenant_id: "default".to_string(),
            region_id: "ap-south-1".to_string(),
            status: RideStatus::Pending,
            driver_id: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"rideId\""));
        assert!(json.contains("\"status\":\"PENDING\""));
        assert!(!json.contains("driverId"));
    }

    #[test]
    fn test_offer_sent_event_fields() {
        let event = OfferSentEvent {
            ride_id: Uuid::new_v4(),
            driver_id: "drv_001".to_string(),
            tenant_id: "default".to_string(),
            region_id: "ap-south-1".to_string(),
            attempt_number: 1,
            ttl_seconds: 15,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"attemptNumber\":1"));
        assert!(json.contains("\"ttlSeconds\":15"));
    }

    #[test]
    fn test_trip_ended_chargeable() {
        let mut event = TripEndedEvent {
            trip_id: "trip_x".to_string(),
            rider_id: "usr_101".to_string(),
            tenant_id: "default".to_string(),
            region_id: "ap-south-1".to_string(),
            status: "ENDED".to_string(),
            fare_amount: Some(Decimal::new(2093, 2)),
            currency: "USD".to_string(),
            payment_method: PaymentMethod::Card,
            timestamp: Utc::now(),
        };
        assert!(event.is_chargeable());

        event.fare_amount = None;
        assert!(!event.is_chargeable());

        event.fare_amount = Some(Decimal::new(2093, 2));
        event.status = "PAUSED".to_string();
        assert!(!event.is_chargeable());
    }

    #[test]
    fn test_payment_event_round_trip() {
        let event = PaymentEvent {
            payment_id: Uuid::new_v4(),
            trip_id: "trip_x".to_string(),
            rider_id: "usr_101".to_string(),
            tenant_id: "default".to_string(),
            amount: Decimal::new(2093, 2),
            currency: "USD".to_string(),
            status: PaymentStatus::Captured,
            psp_reference: Some("psp_ref_1".to_string()),
            failure_reason: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: PaymentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, PaymentStatus::Captured);
        assert_eq!(back.psp_reference.as_deref(), Some("psp_ref_1"));
    }

    #[test]
    fn test_topics_are_dotted() {
        assert_eq!(topics::RIDE_REQUESTED, "ride.requested");
        assert_eq!(topics::DRIVER_OFFER_SENT, "driver.offer.sent");
        assert_eq!(topics::PAYMENT_INITIATED, "payment.initiated");
        assert_eq!(topics::SUPPLY_DEMAND_SNAPSHOT, "supply.demand.snapshot");
    }
}
