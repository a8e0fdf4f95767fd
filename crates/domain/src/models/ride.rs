//! Ride domain model and lifecycle state machine.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::{Validate, ValidationError};

// ============================================================================
// Ride Status Enum
// ============================================================================

/// Status of a ride in its dispatch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Pending,
    Dispatching,
    Accepted,
    DriverArrived,
    InProgress,
    Completed,
    Cancelled,
    NoDriverFound,
}

impl RideStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "PENDING",
            RideStatus::Dispatching => "DISPATCHING",
            RideStatus::Accepted => "ACCEPTED",
            RideStatus::DriverArrived => "DRIVER_ARRIVED",
            RideStatus::InProgress => "IN_PROGRESS",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Cancelled => "CANCELLED",
            RideStatus::NoDriverFound => "NO_DRIVER_FOUND",
        }
    }

    /// Terminal states are absorbing: no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RideStatus::Completed | RideStatus::Cancelled | RideStatus::NoDriverFound
        )
    }

    /// States in which `assigned_driver_id` must be non-null.
    pub fn has_assigned_driver(&self) -> bool {
        matches!(
            self,
            RideStatus::Accepted
                | RideStatus::DriverArrived
                | RideStatus::InProgress
                | RideStatus::Completed
        )
    }

    /// Check if transition to target state is valid.
    ///
    /// COMPLETED is entered by the external trip lifecycle, not by the
    /// dispatch engine; it is still part of the transition table so that
    /// observed status sequences can be checked against it.
    pub fn can_transition_to(&self, target: RideStatus) -> bool {
        match (self, target) {
            (RideStatus::Pending, RideStatus::Dispatching) => true,
            (RideStatus::Pending, RideStatus::NoDriverFound) => true,
            (RideStatus::Pending, RideStatus::Cancelled) => true,
            (RideStatus::Dispatching, RideStatus::Accepted) => true,
            (RideStatus::Dispatching, RideStatus::NoDriverFound) => true,
            (RideStatus::Dispatching, RideStatus::Cancelled) => true,
            (RideStatus::Accepted, RideStatus::DriverArrived) => true,
            (RideStatus::Accepted, RideStatus::Cancelled) => true,
            (RideStatus::DriverArrived, RideStatus::InProgress) => true,
            (RideStatus::DriverArrived, RideStatus::Cancelled) => true,
            (RideStatus::InProgress, RideStatus::Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RideStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RideStatus::Pending),
            "DISPATCHING" => Ok(RideStatus::Dispatching),
            "ACCEPTED" => Ok(RideStatus::Accepted),
            "DRIVER_ARRIVED" => Ok(RideStatus::DriverArrived),
            "IN_PROGRESS" => Ok(RideStatus::InProgress),
            "COMPLETED" => Ok(RideStatus::Completed),
            "CANCELLED" => Ok(RideStatus::Cancelled),
            "NO_DRIVER_FOUND" => Ok(RideStatus::NoDriverFound),
            _ => Err(format!("Invalid ride status: {}", s)),
        }
    }
}

// ============================================================================
// Vehicle Tier Enum
// ============================================================================

/// Vehicle tier requested by the rider or offered by a driver.
///
/// Tiers are ordered: a driver can serve any request whose tier rank is
/// at or below the driver's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleTier {
    Economy,
    Comfort,
    Premium,
}

impl VehicleTier {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleTier::Economy => "ECONOMY",
            VehicleTier::Comfort => "COMFORT",
            VehicleTier::Premium => "PREMIUM",
        }
    }

    /// Ordering rank used for tier compatibility checks.
    pub fn rank(&self) -> u8 {
        match self {
            VehicleTier::Economy => 1,
            VehicleTier::Comfort => 2,
            VehicleTier::Premium => 3,
        }
    }

    /// Whether a driver of this tier can serve a request of `required`.
    pub fn satisfies(&self, required: VehicleTier) -> bool {
        self.rank() >= required.rank()
    }
}

impl fmt::Display for VehicleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VehicleTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ECONOMY" => Ok(VehicleTier::Economy),
            "COMFORT" => Ok(VehicleTier::Comfort),
            "PREMIUM" => Ok(VehicleTier::Premium),
            _ => Err(format!(
                "Invalid vehicle tier: {}. Must be one of: ECONOMY, COMFORT, PREMIUM",
                s
            )),
        }
    }
}

// ============================================================================
// Core Model
// ============================================================================

/// Represents a ride (dispatch request) in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: String,
    pub tenant_id: String,
    pub region_id: String,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub destination_latitude: f64,
    pub destination_longitude: f64,
    pub required_tier: VehicleTier,
    pub payment_method: super::payment::PaymentMethod,
    pub status: RideStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_driver_id: Option<String>,
    pub attempt_count: i32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

lazy_static! {
    /// Region ids look like `ap-south-1`.
    static ref REGION_ID_RE: Regex = Regex::new(r"^[a-z]{2}-[a-z]+-\d$").unwrap();
}

/// Validates a region identifier.
pub fn validate_region_id(region: &str) -> Result<(), ValidationError> {
    if REGION_ID_RE.is_match(region) {
        Ok(())
    } else {
        let mut err = ValidationError::new("region_id");
        err.message = Some("Region id must look like ap-south-1".into());
        Err(err)
    }
}

/// Request payload for creating a ride.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRideRequest {
    #[validate(length(min = 1, max = 64, message = "riderId must be 1-64 characters"))]
    pub rider_id: String,

    #[validate(custom(function = "crate::models::ride::validate_region_id"))]
    pub region_id: String,

    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub pickup_latitude: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub pickup_longitude: f64,

    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub destination_latitude: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub destination_longitude: f64,

    pub required_tier: VehicleTier,

    pub payment_method: super::payment::PaymentMethod,
}

/// Summary of a ride returned by the dispatch endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideSummary {
    pub ride_id: Uuid,
    pub status: RideStatus,
    pub required_tier: VehicleTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_driver_id: Option<String>,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Ride> for RideSummary {
    fn from(ride: &Ride) -> Self {
        Self {
            ride_id: ride.id,
            status: ride.status,
            required_tier: ride.required_tier,
            assigned_driver_id: ride.assigned_driver_id.clone(),
            attempt_count: ride.attempt_count,
            created_at: ride.created_at,
            updated_at: ride.updated_at,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::PaymentMethod;

    fn request() -> CreateRideRequest {
        CreateRideRequest {
            rider_id: "usr_101".to_string(),
            region_id: "ap-south-1".to_string(),
            pickup_latitude: 12.9716,
            pickup_longitude: 77.5946,
            destination_latitude: 12.9352,
            destination_longitude: 77.6245,
            required_tier: VehicleTier::Economy,
            payment_method: PaymentMethod::Card,
        }
    }

    #[test]
    fn test_ride_status_round_trip() {
        for status in [
            RideStatus::Pending,
            RideStatus::Dispatching,
            RideStatus::Accepted,
            RideStatus::DriverArrived,
            RideStatus::InProgress,
            RideStatus::Completed,
            RideStatus::Cancelled,
            RideStatus::NoDriverFound,
        ] {
            assert_eq!(status.as_str().parse::<RideStatus>().unwrap(), status);
        }
        assert!("invalid".parse::<RideStatus>().is_err());
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        let all = [
            RideStatus::Pending,
            RideStatus::Dispatching,
            RideStatus::Accepted,
            RideStatus::DriverArrived,
            RideStatus::InProgress,
            RideStatus::Completed,
            RideStatus::Cancelled,
            RideStatus::NoDriverFound,
        ];
        for terminal in [
            RideStatus::Completed,
            RideStatus::Cancelled,
            RideStatus::NoDriverFound,
        ] {
            assert!(terminal.is_terminal());
            for target in all {
                assert!(
                    !terminal.can_transition_to(target),
                    "{} must not leave terminal state",
                    terminal
                );
            }
        }
    }

    #[test]
    fn test_happy_path_is_valid() {
        let path = [
            RideStatus::Pending,
            RideStatus::Dispatching,
            RideStatus::Accepted,
            RideStatus::DriverArrived,
            RideStatus::InProgress,
            RideStatus::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
        }
    }

    #[test]
    fn test_no_skips() {
        assert!(!RideStatus::Pending.can_transition_to(RideStatus::Accepted));
        assert!(!RideStatus::Dispatching.can_transition_to(RideStatus::InProgress));
        assert!(!RideStatus::Accepted.can_transition_to(RideStatus::InProgress));
        assert!(!RideStatus::InProgress.can_transition_to(RideStatus::Cancelled));
    }

    #[test]
    fn test_assigned_driver_states() {
        assert!(RideStatus::Accepted.has_assigned_driver());
        assert!(RideStatus::DriverArrived.has_assigned_driver());
        assert!(RideStatus::InProgress.has_assigned_driver());
        assert!(RideStatus::Completed.has_assigned_driver());
        assert!(!RideStatus::Pending.has_assigned_driver());
        assert!(!RideStatus::Dispatching.has_assigned_driver());
        assert!(!RideStatus::NoDriverFound.has_assigned_driver());
    }

    #[test]
    fn test_tier_ranking() {
        assert!(VehicleTier::Premium.satisfies(VehicleTier::Economy));
        assert!(VehicleTier::Comfort.satisfies(VehicleTier::Economy));
        assert!(VehicleTier::Economy.satisfies(VehicleTier::Economy));
        assert!(!VehicleTier::Economy.satisfies(VehicleTier::Comfort));
        assert!(!VehicleTier::Comfort.satisfies(VehicleTier::Premium));
    }

    #[test]
    fn test_tier_serde() {
        let json = serde_json::to_string(&VehicleTier::Economy).unwrap();
        assert_eq!(json, "\"ECONOMY\"");
        let parsed: VehicleTier = serde_json::from_str("\"PREMIUM\"").unwrap();
        assert_eq!(parsed, VehicleTier::Premium);
    }

    #[test]
    fn test_create_ride_request_valid() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_create_ride_request_bad_region() {
        let mut req = request();
        req.region_id = "AP-SOUTH".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_ride_request_bad_latitude() {
        let mut req = request();
        req.pickup_latitude = 91.0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_ride_request_camel_case() {
        let json = r#"{
            "riderId": "usr_101",
            "regionId": "ap-south-1",
            "pickupLatitude": 12.9716,
            "pickupLongitude": 77.5946,
            "destinationLatitude": 12.9352,
            "destinationLongitude": 77.6245,
            "requiredTier": "ECONOMY",
            "paymentMethod": "CARD"
        }"#;
        let req: CreateRideRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.rider_id, "usr_101");
        assert_eq!(req.required_tier, VehicleTier::Economy);
    }

    #[test]
    fn test_ride_summary_from_ride() {
        let ride = Ride {
            id: Uuid::new_v4(),
            rider_id: "usr_101".to_string(),
            tenant_id: "default".to_string(),
            region_id: "ap-south-1".to_string(),
            pickup_latitude: 12.9716,
            pickup_longitude: 77.5946,
            destination_latitude: 12.9352,
            destination_longitude: 77.6245,
            required_tier: VehicleTier::Economy,
            payment_method: PaymentMethod::Card,
            status: RideStatus::Dispatching,
            idempotency_key: Some("ik-1".to_string()),
            request_hash: None,
            assigned_driver_id: None,
            attempt_count: 1,
            version: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let summary = RideSummary::from(&ride);
        assert_eq!(summary.ride_id, ride.id);
        assert_eq!(summary.status, RideStatus::Dispatching);
        assert!(summary.assigned_driver_id.is_none());
    }
}
