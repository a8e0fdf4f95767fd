//! Ephemeral driver metadata held in the KV/geo store.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ride::VehicleTier;

/// Default rating assumed when a driver's metadata omits it.
pub const DEFAULT_RATING: f64 = 4.0;

/// Default decline rate assumed when a driver's metadata omits it.
pub const DEFAULT_DECLINE_RATE: f64 = 0.1;

/// Availability status of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Idle,
    Dispatching,
    OnTrip,
    Offline,
}

impl DriverStatus {
    /// Returns the string representation for KV storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Idle => "IDLE",
            DriverStatus::Dispatching => "DISPATCHING",
            DriverStatus::OnTrip => "ON_TRIP",
            DriverStatus::Offline => "OFFLINE",
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DriverStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(DriverStatus::Idle),
            "DISPATCHING" => Ok(DriverStatus::Dispatching),
            "ON_TRIP" => Ok(DriverStatus::OnTrip),
            "OFFLINE" => Ok(DriverStatus::Offline),
            _ => Err(format!("Invalid driver status: {}", s)),
        }
    }
}

/// Driver metadata stored alongside the geo index entry.
///
/// Entries auto-expire 30 seconds after the last location update; a missing
/// entry means the driver is no longer live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverMetadata {
    pub status: DriverStatus,
    pub tier: VehicleTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_rate: Option<f64>,
    pub region_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub last_seen_ms: i64,
}

impl DriverMetadata {
    /// Rating with the documented default applied.
    pub fn rating_or_default(&self) -> f64 {
        self.rating.unwrap_or(DEFAULT_RATING)
    }

    /// Decline rate with the documented default applied.
    pub fn decline_rate_or_default(&self) -> f64 {
        self.decline_rate.unwrap_or(DEFAULT_DECLINE_RATE)
    }
}
