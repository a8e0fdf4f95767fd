//! Transactional outbox entry model.
//!
//! An outbox row is inserted in the same database transaction as the
//! business row it announces, and is published to the event bus by the
//! outbox relay afterwards. This avoids the dual-write problem: either
//! both rows commit or neither does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Status of an outbox entry.
///
/// Valid transitions: PENDING → PUBLISHED (terminal) or PENDING → FAILED
/// (terminal, after retry exhaustion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

impl OutboxStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Published => "PUBLISHED",
            OutboxStatus::Failed => "FAILED",
        }
    }

    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: OutboxStatus) -> bool {
        matches!(
            (self, target),
            (OutboxStatus::Pending, OutboxStatus::Published)
                | (OutboxStatus::Pending, OutboxStatus::Failed)
        )
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "PUBLISHED" => Ok(OutboxStatus::Published),
            "FAILED" => Ok(OutboxStatus::Failed),
            _ => Err(format!("Invalid outbox status: {}", s)),
        }
    }
}

/// An event awaiting publication, written transactionally with its payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub tenant_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Published,
            OutboxStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<OutboxStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_published_and_failed_are_terminal() {
        for terminal in [OutboxStatus::Published, OutboxStatus::Failed] {
            for target in [
                OutboxStatus::Pending,
                OutboxStatus::Published,
                OutboxStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_pending_transitions() {
        assert!(OutboxStatus::Pending.can_transition_to(OutboxStatus::Published));
        assert!(OutboxStatus::Pending.can_transition_to(OutboxStatus::Failed));
        assert!(!OutboxStatus::Pending.can_transition_to(OutboxStatus::Pending));
    }
}
