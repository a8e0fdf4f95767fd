//! In-process KV store shared by the geo index, distributed mutex,
//! feature flags and surge window state.
//!
//! One store instance is shared across all workers of a deployment; region
//! and tenant isolation is enforced purely by key namespacing, mirroring
//! the production key patterns (`drivers:{region}`, `lock:ride:{id}`,
//! `surge:window:{cell}`, `feature-flags:{tenant}`).
//!
//! Expiry is lazy: expired values are dropped when their key is next
//! touched. Locks are single-writer: a key can be acquired once per lease
//! and released only with the token handed out at acquisition.

use geo::{HaversineDistance, Point};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Debug, Clone)]
struct GeoMember {
    latitude: f64,
    longitude: f64,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, Expiring<String>>,
    maps: HashMap<String, Expiring<HashMap<String, String>>>,
    zsets: HashMap<String, Expiring<BTreeMap<i64, Vec<String>>>>,
    geo_sets: HashMap<String, HashMap<String, GeoMember>>,
    locks: HashMap<String, Expiring<u64>>,
    next_token: u64,
}

/// Shared in-process KV store.
#[derive(Default)]
pub struct KvStore {
    inner: Mutex<Inner>,
}

impl KvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("kv store lock poisoned")
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    /// Set a string value, replacing any prior value and TTL.
    pub fn set_string(&self, key: &str, value: impl Into<String>, ttl: Option<Duration>) {
        self.lock()
            .strings
            .insert(key.to_string(), Expiring::new(value.into(), ttl));
    }

    /// Get a string value; expired entries read as absent.
    pub fn get_string(&self, key: &str) -> Option<String> {
        let mut inner = self.lock();
        match inner.strings.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                inner.strings.remove(key);
                None
            }
            None => None,
        }
    }

    /// Remove a string key.
    pub fn remove_string(&self, key: &str) {
        self.lock().strings.remove(key);
    }

    // ------------------------------------------------------------------
    // Maps
    // ------------------------------------------------------------------

    /// Replace a map wholesale and reset its TTL.
    pub fn map_put(&self, key: &str, fields: HashMap<String, String>, ttl: Option<Duration>) {
        self.lock()
            .maps
            .insert(key.to_string(), Expiring::new(fields, ttl));
    }

    /// Read a whole map; expired maps read as absent.
    pub fn map_get(&self, key: &str) -> Option<HashMap<String, String>> {
        let mut inner = self.lock();
        match inner.maps.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                inner.maps.remove(key);
                None
            }
            None => None,
        }
    }

    /// Update one field of an existing map without touching its TTL.
    ///
    /// Returns false if the map is missing or expired.
    pub fn map_set_field(&self, key: &str, field: &str, value: impl Into<String>) -> bool {
        let mut inner = self.lock();
        match inner.maps.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.value.insert(field.to_string(), value.into());
                true
            }
            Some(_) => {
                inner.maps.remove(key);
                false
            }
            None => false,
        }
    }

    /// Insert map fields only where the field is not already present.
    /// Creates the map (without TTL) when missing entirely.
    pub fn map_set_missing_fields(&self, key: &str, fields: HashMap<String, String>) {
        let mut inner = self.lock();
        let entry = inner
            .maps
            .entry(key.to_string())
            .or_insert_with(|| Expiring::new(HashMap::new(), None));
        if entry.is_expired() {
            *entry = Expiring::new(HashMap::new(), None);
        }
        for (field, value) in fields {
            entry.value.entry(field).or_insert(value);
        }
    }

    // ------------------------------------------------------------------
    // Sorted sets (score-ordered, used for surge windows)
    // ------------------------------------------------------------------

    /// Add a member with the given score.
    pub fn zset_add(&self, key: &str, score: i64, member: impl Into<String>) {
        let mut inner = self.lock();
        let entry = inner
            .zsets
            .entry(key.to_string())
            .or_insert_with(|| Expiring::new(BTreeMap::new(), None));
        if entry.is_expired() {
            *entry = Expiring::new(BTreeMap::new(), None);
        }
        entry.value.entry(score).or_default().push(member.into());
    }

    /// Reset the TTL of a sorted set, if it exists.
    pub fn zset_expire(&self, key: &str, ttl: Duration) {
        if let Some(entry) = self.lock().zsets.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
    }

    /// Remove all members with score strictly below `min_score`.
    pub fn zset_remove_below(&self, key: &str, min_score: i64) {
        if let Some(entry) = self.lock().zsets.get_mut(key) {
            entry.value = entry.value.split_off(&min_score);
        }
    }

    /// All members in ascending score order.
    pub fn zset_range_asc(&self, key: &str) -> Vec<(i64, String)> {
        let mut inner = self.lock();
        match inner.zsets.get(key) {
            Some(entry) if !entry.is_expired() => entry
                .value
                .iter()
                .flat_map(|(score, members)| members.iter().map(move |m| (*score, m.clone())))
                .collect(),
            Some(_) => {
                inner.zsets.remove(key);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Geo sets
    // ------------------------------------------------------------------

    /// Add or move a member in a geo set, with an optional per-member TTL.
    pub fn geo_add(
        &self,
        key: &str,
        member: impl Into<String>,
        latitude: f64,
        longitude: f64,
        ttl: Option<Duration>,
    ) {
        self.lock().geo_sets.entry(key.to_string()).or_default().insert(
            member.into(),
            GeoMember {
                latitude,
                longitude,
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
    }

    /// Members within `radius_km` of the origin, ascending by distance,
    /// capped at `limit`. Expired members are dropped on the way.
    pub fn geo_radius(
        &self,
        key: &str,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        limit: usize,
    ) -> Vec<(String, f64)> {
        let mut inner = self.lock();
        let Some(set) = inner.geo_sets.get_mut(key) else {
            return Vec::new();
        };

        set.retain(|_, m| !m.expires_at.is_some_and(|at| Instant::now() >= at));

        let origin = Point::new(longitude, latitude);
        let mut hits: Vec<(String, f64)> = set
            .iter()
            .filter_map(|(member, m)| {
                let distance_km =
                    origin.haversine_distance(&Point::new(m.longitude, m.latitude)) / 1000.0;
                (distance_km <= radius_km).then(|| (member.clone(), distance_km))
            })
            .collect();

        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }

    // ------------------------------------------------------------------
    // Locks (single-writer, leased)
    // ------------------------------------------------------------------

    /// Try to take the lock once. Returns a release token, or `None` if
    /// another holder's lease is still live.
    pub fn try_lock(&self, key: &str, lease: Duration) -> Option<u64> {
        let mut inner = self.lock();
        if let Some(entry) = inner.locks.get(key) {
            if !entry.is_expired() {
                return None;
            }
        }
        inner.next_token += 1;
        let token = inner.next_token;
        inner
            .locks
            .insert(key.to_string(), Expiring::new(token, Some(lease)));
        Some(token)
    }

    /// Release a lock if the token still owns it.
    pub fn unlock(&self, key: &str, token: u64) -> bool {
        let mut inner = self.lock();
        match inner.locks.get(key) {
            Some(entry) if !entry.is_expired() && entry.value == token => {
                inner.locks.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Whether a live (unexpired) lock exists on this key.
    pub fn is_locked(&self, key: &str) -> bool {
        let mut inner = self.lock();
        match inner.locks.get(key) {
            Some(entry) if !entry.is_expired() => true,
            Some(_) => {
                inner.locks.remove(key);
                false
            }
            None => false,
        }
    }
}
