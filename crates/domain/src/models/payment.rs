//! Payment domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Payment Status Enum
// ============================================================================

/// Status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Captured,
    Failed,
}

impl PaymentStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "CAPTURED" => Ok(PaymentStatus::Captured),
            "FAILED" => Ok(PaymentStatus::Failed),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

// ============================================================================
// Payment Method Enum
// ============================================================================

/// Payment method attached to a ride or payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Wallet,
    Upi,
    Cash,
}

impl PaymentMethod {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::Wallet => "WALLET",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::Cash => "CASH",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD" => Ok(PaymentMethod::Card),
            "WALLET" => Ok(PaymentMethod::Wallet),
            "UPI" => Ok(PaymentMethod::Upi),
            "CASH" => Ok(PaymentMethod::Cash),
            _ => Err(format!("Invalid payment method: {}", s)),
        }
    }
}

// ============================================================================
// Core Model
// ============================================================================

/// A payment for a completed trip. At most one payment exists per trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub trip_id: String,
    pub rider_id: String,
    pub tenant_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psp_reference: Option<String>,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_round_trip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Captured,
            PaymentStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("REFUNDED".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn test_payment_method_round_trip() {
        for method in [
            PaymentMethod::Card,
            PaymentMethod::Wallet,
            PaymentMethod::Upi,
            PaymentMethod::Cash,
        ] {
            assert_eq!(method.as_str().parse::<PaymentMethod>().unwrap(), method);
        }
    }

    #[test]
    fn test_amount_scale_two() {
        let amount = Decimal::new(2093, 2);
        assert_eq!(amount.scale(), 2);
        assert_eq!(amount.to_string(), "20.93");
    }

    #[test]
    fn test_payment_serde_round_trip() {
        let payment = Payment {
            id: Uuid::new_v4(),
            trip_id: "trip_x".to_string(),
            rider_id: "usr_101".to_string(),
            tenant_id: "default".to_string(),
            amount: Decimal::new(2093, 2),
            currency: "USD".to_string(),
            payment_method: PaymentMethod::Card,
            psp_reference: None,
            status: PaymentStatus::Pending,
            failure_reason: None,
            retry_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&payment).unwrap();
        assert!(json.contains("\"tripId\":\"trip_x\""));
        assert!(json.contains("\"amount\":\"20.93\""));
        assert!(!json.contains("pspReference"));
        let back: Payment = serde_json::from_str(&json).unwrap();
        assert_eq!(back.amount, payment.amount);
        assert_eq!(back.status, PaymentStatus::Pending);
    }
}
