//! Payment entity (database row mapping).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::payment::{Payment, PaymentMethod, PaymentStatus};

/// Database row mapping for the payments table.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub trip_id: String,
    pub rider_id: String,
    pub tenant_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub psp_reference: Option<String>,
    pub status: String,
    pub failure_reason: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentEntity {
    /// Convert to domain model.
    pub fn into_domain(self) -> Payment {
        let payment_method = self
            .payment_method
            .parse::<PaymentMethod>()
            .unwrap_or(PaymentMethod::Cash);
        let status = self
            .status
            .parse::<PaymentStatus>()
            .unwrap_or(PaymentStatus::Pending);

        Payment {
            id: self.id,
            trip_id: self.trip_id,
            rider_id: self.rider_id,
            tenant_id: self.tenant_id,
            amount: self.amount,
            currency: self.currency,
            payment_method,
            psp_reference: self.psp_reference,
            status,
            failure_reason: self.failure_reason,
            retry_count: self.retry_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl From<PaymentEntity> for Payment {
    fn from(entity: PaymentEntity) -> Self {
        entity.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_to_domain() {
        let e = PaymentEntity {
            id: Uuid::new_v4(),
            trip_id: "trip_x".to_string(),
            rider_id: "usr_101".to_string(),
            tenant_id: "default".to_string(),
            amount: Decimal::new(2093, 2),
            currency: "USD".to_string(),
            payment_method: "CARD".to_string(),
            psp_reference: None,
            status: "FAILED".to_string(),
            failure_reason: Some("psp unavailable".to_string()),
            retry_count: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let payment: Payment = e.into();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.amount, Decimal::new(2093, 2));
        assert_eq!(payment.retry_count, 2);
    }
}
