//! Outbox entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::outbox::{OutboxEntry, OutboxStatus};

/// Database row mapping for the payment_outbox table.
#[derive(Debug, Clone, FromRow)]
pub struct OutboxEntity {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub tenant_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
}

impl OutboxEntity {
    /// Convert to domain model.
    pub fn into_domain(self) -> OutboxEntry {
        let status = self
            .status
            .parse::<OutboxStatus>()
            .unwrap_or(OutboxStatus::Pending);

        OutboxEntry {
            id: self.id,
            payment_id: self.payment_id,
            tenant_id: self.tenant_id,
            event_type: self.event_type,
            payload: self.payload,
            status,
            created_at: self.created_at,
            published_at: self.published_at,
            retry_count: self.retry_count,
        }
    }
}

impl From<OutboxEntity> for OutboxEntry {
    fn from(entity: OutboxEntity) -> Self {
        entity.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_to_domain() {
        let e = OutboxEntity {
            id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            tenant_id: "default".to_string(),
            event_type: "payment.initiated".to_string(),
            payload: json!({"paymentId": "x"}),
            status: "PENDING".to_string(),
            created_at: Utc::now(),
            published_at: None,
            retry_count: 0,
        };
        let entry: OutboxEntry = e.into();
        assert_eq!(entry.status, OutboxStatus::Pending);
        assert_eq!(entry.event_type, "payment.initiated");
        assert!(entry.published_at.is_none());
    }
}
