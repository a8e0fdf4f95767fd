//! Surge pricing models: geo-cell snapshots and window entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit row for the most recent surge computation of a cell.
///
/// Overwritten on every recompute; history is carried by the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoCellSnapshot {
    pub cell_id: String,
    pub region_id: String,
    pub tenant_id: String,
    pub active_drivers: i32,
    pub pending_rides: i32,
    pub surge_multiplier: f64,
    pub computed_at: DateTime<Utc>,
}

/// One supply/demand observation inside a cell's rolling window.
///
/// Serialized into the KV sorted set as `"{drivers}:{rides}"` with the
/// event time in milliseconds as the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    pub drivers: i32,
    pub rides: i32,
}

impl WindowEntry {
    /// Encode for sorted-set storage.
    pub fn encode(&self) -> String {
        format!("{}:{}", self.drivers, self.rides)
    }

    /// Decode a sorted-set member; `None` for malformed values.
    pub fn decode(raw: &str) -> Option<Self> {
        let (drivers, rides) = raw.split_once(':')?;
        Some(Self {
            drivers: drivers.parse().ok()?,
            rides: rides.parse().ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_entry_round_trip() {
        let entry = WindowEntry {
            drivers: 10,
            rides: 25,
        };
        assert_eq!(entry.encode(), "10:25");
        assert_eq!(WindowEntry::decode("10:25"), Some(entry));
    }

    #[test]
    fn test_window_entry_decode_rejects_garbage() {
        assert_eq!(WindowEntry::decode(""), None);
        assert_eq!(WindowEntry::decode("10"), None);
        assert_eq!(WindowEntry::decode("a:b"), None);
        assert_eq!(WindowEntry::decode("10:"), None);
    }

    #[test]
    fn test_snapshot_serde() {
        let snapshot = GeoCellSnapshot {
            cell_id: "8860145181bffff".to_string(),
            region_id: "ap-south-1".to_string(),
            tenant_id: "default".to_string(),
            active_drivers: 10,
            pending_rides: 25,
            surge_multiplier: 1.75,
            computed_at: Utc::now(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"cellId\""));
        assert!(json.contains("\"surgeMultiplier\":1.75"));
    }
}
