//! Region-scoped geo index for driver lookup.
//!
//! Two co-located structures per region: a geo set `drivers:{region}` for
//! radius queries, and a per-driver metadata map `driver:{id}`. Both carry
//! a 30 second TTL refreshed by every location update, so a driver that
//! stops reporting disappears from dispatch within one TTL. A region change
//! is a plain upsert into the new region; the old region's entry ages out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::models::{DriverMetadata, DriverStatus};

use crate::kv::KvStore;

/// TTL for driver presence (geo membership and metadata).
pub const DRIVER_TTL: Duration = Duration::from_secs(30);

fn region_key(region: &str) -> String {
    format!("drivers:{}", region)
}

fn driver_key(driver_id: &str) -> String {
    format!("driver:{}", driver_id)
}

/// Region-scoped nearest-neighbor driver index.
#[derive(Clone)]
pub struct GeoIndex {
    kv: Arc<KvStore>,
}

impl GeoIndex {
    /// Create a geo index over the shared KV store.
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    /// Idempotent last-write-wins upsert; resets the driver's TTL.
    pub fn upsert(&self, driver_id: &str, region: &str, lat: f64, lng: f64, meta: &DriverMetadata) {
        self.kv
            .geo_add(&region_key(region), driver_id, lat, lng, Some(DRIVER_TTL));

        let mut fields = HashMap::new();
        fields.insert("status".to_string(), meta.status.as_str().to_string());
        fields.insert("tier".to_string(), meta.tier.as_str().to_string());
        if let Some(rating) = meta.rating {
            fields.insert("rating".to_string(), rating.to_string());
        }
        if let Some(decline_rate) = meta.decline_rate {
            fields.insert("decline_rate".to_string(), decline_rate.to_string());
        }
        fields.insert("region".to_string(), region.to_string());
        fields.insert("lat".to_string(), lat.to_string());
        fields.insert("lng".to_string(), lng.to_string());
        fields.insert("last_seen_ms".to_string(), meta.last_seen_ms.to_string());

        self.kv
            .map_put(&driver_key(driver_id), fields, Some(DRIVER_TTL));
    }

    /// Drivers within `radius_km` of the origin, ascending by distance,
    /// capped at `limit`. Never returns drivers from another region.
    pub fn radius(
        &self,
        region: &str,
        lat: f64,
        lng: f64,
        radius_km: f64,
        limit: usize,
    ) -> Vec<(String, f64)> {
        self.kv
            .geo_radius(&region_key(region), lat, lng, radius_km, limit)
    }

    /// Driver metadata, or `None` when expired or never seen.
    pub fn get_metadata(&self, driver_id: &str) -> Option<DriverMetadata> {
        let map = self.kv.map_get(&driver_key(driver_id))?;
        Some(DriverMetadata {
            status: map.get("status")?.parse().ok()?,
            tier: map.get("tier")?.parse().ok()?,
            rating: map.get("rating").and_then(|r| r.parse().ok()),
            decline_rate: map.get("decline_rate").and_then(|r| r.parse().ok()),
            region_id: map.get("region").cloned().unwrap_or_default(),
            latitude: map.get("lat").and_then(|v| v.parse().ok()).unwrap_or(0.0),
            longitude: map.get("lng").and_then(|v| v.parse().ok()).unwrap_or(0.0),
            last_seen_ms: map
                .get("last_seen_ms")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        })
    }

    /// Partial status update; leaves the TTL intact.
    ///
    /// Returns false when the driver's metadata has already expired.
    pub fn set_status(&self, driver_id: &str, status: DriverStatus) -> bool {
        self.kv
            .map_set_field(&driver_key(driver_id), "status", status.as_str())
    }
}
