//! Driver offer domain model.
//!
//! Offers are an append-only audit of dispatch attempts: a row is inserted
//! when the offer is sent and mutated exactly once to record the response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Response recorded on a driver offer. `None` while the offer is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferResponse {
    Accepted,
    Declined,
    Timeout,
}

impl OfferResponse {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferResponse::Accepted => "ACCEPTED",
            OfferResponse::Declined => "DECLINED",
            OfferResponse::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for OfferResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OfferResponse {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCEPTED" => Ok(OfferResponse::Accepted),
            "DECLINED" => Ok(OfferResponse::Declined),
            "TIMEOUT" => Ok(OfferResponse::Timeout),
            _ => Err(format!("Invalid offer response: {}", s)),
        }
    }
}

/// A time-bounded invitation sent to a single driver for a single ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverOffer {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub driver_id: String,
    pub attempt_number: i32,
    pub offered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    pub ttl_seconds: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<OfferResponse>,
}

impl DriverOffer {
    /// An offer is open while no response has been recorded.
    pub fn is_open(&self) -> bool {
        self.response.is_none()
    }

    /// Whether the offer's TTL has elapsed relative to `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.offered_at).num_seconds() >= self.ttl_seconds as i64
    }
}
