//! Surge calculator.
//!
//! Consumes supply/demand snapshots (one per cell per cadence), maintains
//! the 5-minute rolling window in the KV store, caches the clamped
//! multiplier for the snapshot cadence, and persists an audit row per
//! cell. Reads resolve flag → cache → audit row → neutral.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use domain::models::events::SupplyDemandSnapshot;
use domain::models::surge::{GeoCellSnapshot, WindowEntry};
use domain::services::surge::{instant_multiplier, windowed_multiplier};
use persistence::flags::{FeatureFlag, FeatureFlagStore};
use persistence::kv::KvStore;
use persistence::repositories::GeoCellRepository;

use crate::config::SurgeConfig;

/// Grace added to the window TTL so an idle cell's set outlives its window.
const WINDOW_TTL_GRACE_SECS: u64 = 60;

fn window_key(cell_id: &str) -> String {
    format!("surge:window:{}", cell_id)
}

fn cache_key(cell_id: &str) -> String {
    format!("surge:cell:{}", cell_id)
}

/// Resolve a coordinate to its surge cell (H3 resolution 8, ~0.74 km²).
pub fn cell_for(lat: f64, lng: f64) -> Result<String, h3o::error::InvalidLatLng> {
    let coord = h3o::LatLng::new(lat, lng)?;
    Ok(coord.to_cell(h3o::Resolution::Eight).to_string())
}

/// Append a snapshot to a cell's window, trim it, and return the surviving
/// entries oldest-first.
fn update_window(
    kv: &KvStore,
    cell_id: &str,
    event_time_ms: i64,
    entry: WindowEntry,
    window_ms: i64,
    ttl: Duration,
) -> Vec<WindowEntry> {
    let key = window_key(cell_id);
    kv.zset_add(&key, event_time_ms, entry.encode());
    kv.zset_expire(&key, ttl);
    kv.zset_remove_below(&key, Utc::now().timestamp_millis() - window_ms);

    kv.zset_range_asc(&key)
        .into_iter()
        .filter_map(|(_, raw)| WindowEntry::decode(&raw))
        .collect()
}

/// Sliding-window, recency-weighted surge multiplier per geo cell.
pub struct SurgeCalculator {
    kv: Arc<KvStore>,
    cells: GeoCellRepository,
    flags: FeatureFlagStore,
    config: SurgeConfig,
}

impl SurgeCalculator {
    pub fn new(
        kv: Arc<KvStore>,
        cells: GeoCellRepository,
        flags: FeatureFlagStore,
        config: SurgeConfig,
    ) -> Self {
        Self {
            kv,
            cells,
            flags,
            config,
        }
    }

    /// Process one supply/demand snapshot and return the new multiplier.
    pub async fn on_snapshot(&self, event: &SupplyDemandSnapshot) -> Result<f64, sqlx::Error> {
        let window_ms = self.config.window_secs * 1000;
        let ttl = Duration::from_secs(self.config.window_secs as u64 + WINDOW_TTL_GRACE_SECS);

        let entries = update_window(
            &self.kv,
            &event.cell_id,
            event.timestamp.timestamp_millis(),
            WindowEntry {
                drivers: event.active_drivers,
                rides: event.pending_rides,
            },
            window_ms,
            ttl,
        );

        let multiplier = if entries.is_empty() {
            instant_multiplier(event.active_drivers, event.pending_rides)
        } else {
            windowed_multiplier(&entries)
        };

        self.kv.set_string(
            &cache_key(&event.cell_id),
            multiplier.to_string(),
            Some(Duration::from_secs(self.config.cache_ttl_secs)),
        );

        self.cells
            .upsert(&GeoCellSnapshot {
                cell_id: event.cell_id.clone(),
                region_id: event.region_id.clone(),
                tenant_id: event.tenant_id.clone(),
                active_drivers: event.active_drivers,
                pending_rides: event.pending_rides,
                surge_multiplier: multiplier,
                computed_at: Utc::now(),
            })
            .await?;

        info!(
            cell_id = %event.cell_id,
            multiplier = multiplier,
            window_len = entries.len(),
            "Surge recomputed"
        );
        Ok(multiplier)
    }

    /// Current multiplier for a cell.
    ///
    /// Kill switch returns the neutral multiplier unconditionally; then
    /// cache, then the audit row, then neutral.
    pub async fn get(&self, tenant_id: &str, cell_id: &str) -> Result<f64, sqlx::Error> {
        if !self
            .flags
            .is_enabled(tenant_id, FeatureFlag::SurgePricingEnabled, true)
        {
            return Ok(1.0);
        }

        if let Some(cached) = self.kv.get_string(&cache_key(cell_id)) {
            if let Ok(multiplier) = cached.parse::<f64>() {
                debug!(cell_id = cell_id, multiplier = multiplier, "Surge cache hit");
                return Ok(multiplier);
            }
        }

        if let Some(cell) = self.cells.find(tenant_id, cell_id).await? {
            return Ok(cell.surge_multiplier);
        }

        Ok(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW_MS: i64 = 300_000;
    const TTL: Duration = Duration::from_secs(360);

    fn push(kv: &KvStore, cell: &str, offset_ms: i64, drivers: i32, rides: i32) -> Vec<WindowEntry> {
        update_window(
            kv,
            cell,
            Utc::now().timestamp_millis() + offset_ms,
            WindowEntry { drivers, rides },
            WINDOW_MS,
            TTL,
        )
    }

    #[test]
    fn test_update_window_accumulates_in_order() {
        let kv = KvStore::new();
        push(&kv, "cell", -2000, 10, 10);
        push(&kv, "cell", -1000, 10, 20);
        let entries = push(&kv, "cell", 0, 10, 30);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].rides, 10);
        assert_eq!(entries[2].rides, 30);
    }

    #[test]
    fn test_update_window_evicts_old_entries() {
        let kv = KvStore::new();
        push(&kv, "cell", -WINDOW_MS - 5000, 10, 999);
        let entries = push(&kv, "cell", 0, 10, 10);

        assert_eq!(entries.len(), 1, "entry older than the window is gone");
        assert_eq!(entries[0].rides, 10);
    }

    #[test]
    fn test_update_window_isolates_cells() {
        let kv = KvStore::new();
        push(&kv, "cell_a", 0, 10, 10);
        let entries = push(&kv, "cell_b", 0, 1, 100);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rides, 100);
    }

    #[test]
    fn test_balanced_window_yields_neutral_multiplier() {
        let kv = KvStore::new();
        push(&kv, "cell", -2000, 10, 10);
        push(&kv, "cell", -1000, 10, 10);
        let entries = push(&kv, "cell", 0, 10, 10);
        assert_eq!(windowed_multiplier(&entries), 1.0);
    }

    #[test]
    fn test_extreme_demand_clamps() {
        let kv = KvStore::new();
        push(&kv, "cell", -2000, 10, 10);
        push(&kv, "cell", -1000, 10, 10);
        let entries = push(&kv, "cell", 0, 1, 1000);
        assert_eq!(windowed_multiplier(&entries), 3.0);
    }

    #[test]
    fn test_cell_for_resolution_eight() {
        let cell = cell_for(12.9716, 77.5946).unwrap();
        let parsed: h3o::CellIndex = cell.parse().unwrap();
        assert_eq!(parsed.resolution(), h3o::Resolution::Eight);

        // Nearby points share a cell at this resolution.
        let nearby = cell_for(12.9717, 77.5947).unwrap();
        assert_eq!(cell, nearby);
    }

    #[test]
    fn test_cell_for_rejects_bad_coordinates() {
        assert!(cell_for(200.0, 0.0).is_err());
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(window_key("abc"), "surge:window:abc");
        assert_eq!(cache_key("abc"), "surge:cell:abc");
    }
}
