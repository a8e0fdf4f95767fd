//! Dispatch engine: ride lifecycle and the matching loop.
//!
//! Concurrency defenses, each independent:
//! 1. the per-ride dispatch lock serializes *offering*;
//! 2. the ride row's version column serializes *accepting*;
//! 3. the idempotency key de-duplicates *creation*.
//!
//! The dispatch loop's database steps run in one transaction. The per-ride
//! mutex is taken before it and held through the post-commit work (driver
//! marking, TTL sentinel, offer event); event emission happens after
//! commit.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use domain::models::events::{OfferSentEvent, RideEvent};
use domain::models::offer::OfferResponse;
use domain::models::ride::{CreateRideRequest, RideStatus, RideSummary, VehicleTier};
use domain::models::{topics, DriverMetadata, DriverStatus};
use domain::services::event_bus::EventBus;
use domain::services::scoring::{rank_candidates, Candidate, ScoringWeights};
use persistence::entities::RideEntity;
use persistence::flags::{FeatureFlag, FeatureFlagStore};
use persistence::geo::GeoIndex;
use persistence::kv::KvStore;
use persistence::locks::{offer_sentinel_key, ride_lock_key, DistributedMutex};
use persistence::repositories::{DriverOfferRepository, RideInput, RideRepository};

use crate::config::DispatchConfig;

/// Hot-path idempotency cache TTL; the ride row stays authoritative.
const IDEMPOTENCY_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

fn idempotency_cache_key(tenant_id: &str, key: &str) -> String {
    format!("idempotency:dispatch:{}:{}", tenant_id, key)
}

/// Errors surfaced by dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch is disabled for this tenant")]
    KillSwitch,

    #[error("idempotency key replayed with a different request body")]
    IdempotencyHashMismatch,

    #[error("ride not found")]
    RideNotFound,

    #[error("ride was already accepted by another driver")]
    AlreadyAccepted,

    #[error("driver is not assigned to this ride")]
    UnauthorizedDriver,

    #[error("ride cannot be cancelled while in progress")]
    CannotCancel,

    #[error("invalid ride state: {0}")]
    InvalidState(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of one pass of the dispatch loop's transactional body.
enum DispatchOutcome {
    /// Another worker owns the attempt or the ride moved on.
    Skipped,
    /// Attempts exhausted or no candidate survived filtering.
    NoDriverFound(RideEntity),
    /// An offer row was written for the top candidate.
    OfferSent {
        ride: RideEntity,
        driver_id: String,
        attempt_number: i32,
    },
}

/// Stateful matcher driving rides through their lifecycle.
pub struct DispatchEngine {
    pool: PgPool,
    rides: RideRepository,
    offers: DriverOfferRepository,
    geo: GeoIndex,
    mutex: DistributedMutex,
    flags: FeatureFlagStore,
    kv: Arc<KvStore>,
    bus: Arc<dyn EventBus>,
    config: DispatchConfig,
}

impl DispatchEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        geo: GeoIndex,
        mutex: DistributedMutex,
        flags: FeatureFlagStore,
        kv: Arc<KvStore>,
        bus: Arc<dyn EventBus>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            rides: RideRepository::new(pool.clone()),
            offers: DriverOfferRepository::new(pool.clone()),
            pool,
            geo,
            mutex,
            flags,
            kv,
            bus,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Create a ride and run the first dispatch attempt.
    ///
    /// Replays of the same idempotency key return the stored ride
    /// unchanged; a replay with a different body hash is rejected.
    pub async fn create_ride(
        &self,
        tenant_id: &str,
        request: &CreateRideRequest,
        idempotency_key: &str,
        request_hash: &str,
    ) -> Result<(RideSummary, bool), DispatchError> {
        if self
            .flags
            .is_enabled(tenant_id, FeatureFlag::DispatchKillSwitch, false)
        {
            return Err(DispatchError::KillSwitch);
        }

        // Hot-path replay detection; the unique index on the ride row is
        // the source of truth when the cache has expired.
        let cache_key = idempotency_cache_key(tenant_id, idempotency_key);
        if let Some(cached) = self.kv.get_string(&cache_key) {
            if let Some((ride_id, stored_hash)) = cached.split_once(' ') {
                if stored_hash != request_hash {
                    return Err(DispatchError::IdempotencyHashMismatch);
                }
                if let Ok(ride_id) = ride_id.parse::<Uuid>() {
                    if let Some(ride) = self.rides.find_by_id(ride_id).await? {
                        info!(ride_id = %ride.id, "Ride creation replayed (cache hit)");
                        return Ok((RideSummary::from(&ride.into_domain()), false));
                    }
                }
            }
        }

        let input = RideInput {
            rider_id: request.rider_id.clone(),
            tenant_id: tenant_id.to_string(),
            region_id: request.region_id.clone(),
            pickup_latitude: request.pickup_latitude,
            pickup_longitude: request.pickup_longitude,
            destination_latitude: request.destination_latitude,
            destination_longitude: request.destination_longitude,
            required_tier: request.required_tier.as_str().to_string(),
            payment_method: request.payment_method.as_str().to_string(),
            idempotency_key: idempotency_key.to_string(),
            request_hash: request_hash.to_string(),
        };

        let (ride, was_created) = self.rides.create(input).await?;

        if !was_created {
            if ride.request_hash.as_deref() != Some(request_hash) {
                return Err(DispatchError::IdempotencyHashMismatch);
            }
            info!(ride_id = %ride.id, "Ride creation replayed (idempotent)");
            return Ok((RideSummary::from(&ride.into_domain()), false));
        }

        self.kv.set_string(
            &cache_key,
            format!("{} {}", ride.id, request_hash),
            Some(IDEMPOTENCY_CACHE_TTL),
        );

        self.emit_ride_event(topics::RIDE_REQUESTED, &ride, None).await;

        self.run_dispatch_loop(ride.id, HashSet::new()).await?;

        let current = self
            .rides
            .find_by_id(ride.id)
            .await?
            .ok_or(DispatchError::RideNotFound)?;
        Ok((RideSummary::from(&current.into_domain()), true))
    }

    /// Fetch a ride summary.
    pub async fn get_ride(&self, ride_id: Uuid) -> Result<RideSummary, DispatchError> {
        let ride = self
            .rides
            .find_by_id(ride_id)
            .await?
            .ok_or(DispatchError::RideNotFound)?;
        Ok(RideSummary::from(&ride.into_domain()))
    }

    /// Driver accepts their open offer. The version guard makes the loser
    /// of a double-accept race fail cleanly.
    pub async fn accept(
        &self,
        ride_id: Uuid,
        driver_id: &str,
    ) -> Result<RideSummary, DispatchError> {
        let ride = self
            .rides
            .find_by_id(ride_id)
            .await?
            .ok_or(DispatchError::RideNotFound)?;

        let status = ride.status.parse::<RideStatus>().unwrap_or(RideStatus::Pending);
        match status {
            RideStatus::Dispatching => {}
            RideStatus::Accepted => return Err(DispatchError::AlreadyAccepted),
            other => {
                return Err(DispatchError::InvalidState(format!(
                    "cannot accept a ride in {}",
                    other
                )))
            }
        }

        let accepted = self
            .rides
            .accept(ride_id, driver_id, ride.version)
            .await?
            .ok_or(DispatchError::AlreadyAccepted)?;

        if let Some(offer) = self.offers.find_open(ride_id, driver_id).await? {
            self.offers.respond(offer.id, OfferResponse::Accepted).await?;
        }
        self.geo.set_status(driver_id, DriverStatus::OnTrip);

        self.emit_ride_event(topics::RIDE_ACCEPTED, &accepted, Some(driver_id))
            .await;
        info!(ride_id = %ride_id, driver_id = driver_id, "Ride accepted");

        Ok(RideSummary::from(&accepted.into_domain()))
    }

    /// Driver declines their open offer; the ride re-dispatches without
    /// that driver.
    pub async fn decline(
        &self,
        ride_id: Uuid,
        driver_id: &str,
    ) -> Result<RideSummary, DispatchError> {
        let ride = self
            .rides
            .find_by_id(ride_id)
            .await?
            .ok_or(DispatchError::RideNotFound)?;

        let offer = self
            .offers
            .find_open(ride_id, driver_id)
            .await?
            .ok_or_else(|| {
                DispatchError::InvalidState("driver has no open offer for this ride".to_string())
            })?;
        self.offers.respond(offer.id, OfferResponse::Declined).await?;
        self.geo.set_status(driver_id, DriverStatus::Idle);

        self.emit_ride_event(topics::RIDE_DECLINED, &ride, Some(driver_id))
            .await;
        info!(ride_id = %ride_id, driver_id = driver_id, "Offer declined");

        let tried = HashSet::from([driver_id.to_string()]);
        self.run_dispatch_loop(ride_id, tried).await?;

        let current = self
            .rides
            .find_by_id(ride_id)
            .await?
            .ok_or(DispatchError::RideNotFound)?;
        Ok(RideSummary::from(&current.into_domain()))
    }

    /// Assigned driver reports arrival at the pickup point.
    pub async fn driver_arrived(
        &self,
        ride_id: Uuid,
        driver_id: &str,
    ) -> Result<RideSummary, DispatchError> {
        self.assigned_driver_transition(
            ride_id,
            driver_id,
            RideStatus::Accepted,
            RideStatus::DriverArrived,
            topics::RIDE_DRIVER_ARRIVED,
        )
        .await
    }

    /// Assigned driver starts the trip.
    pub async fn start(
        &self,
        ride_id: Uuid,
        driver_id: &str,
    ) -> Result<RideSummary, DispatchError> {
        self.assigned_driver_transition(
            ride_id,
            driver_id,
            RideStatus::DriverArrived,
            RideStatus::InProgress,
            topics::RIDE_IN_PROGRESS,
        )
        .await
    }

    /// Cancel a ride. Rides in progress cannot be cancelled.
    pub async fn cancel(
        &self,
        ride_id: Uuid,
        requester_id: &str,
    ) -> Result<RideSummary, DispatchError> {
        let ride = self
            .rides
            .find_by_id(ride_id)
            .await?
            .ok_or(DispatchError::RideNotFound)?;

        let status = ride.status.parse::<RideStatus>().unwrap_or(RideStatus::Pending);
        if status == RideStatus::InProgress {
            return Err(DispatchError::CannotCancel);
        }
        if status.is_terminal() {
            return Err(DispatchError::InvalidState(format!(
                "ride is already {}",
                status
            )));
        }

        let cancelled = self
            .rides
            .transition(ride_id, status, RideStatus::Cancelled, ride.version)
            .await?
            .ok_or_else(|| {
                DispatchError::InvalidState("ride changed concurrently, retry".to_string())
            })?;

        info!(ride_id = %ride_id, requester_id = requester_id, "Ride cancelled");
        self.emit_ride_event(topics::RIDE_CANCELLED, &cancelled, None)
            .await;

        Ok(RideSummary::from(&cancelled.into_domain()))
    }

    /// Close an expired offer as TIMEOUT and re-dispatch. Called by the
    /// offer timeout sweep; a timed-out offer is normal flow, not an error.
    pub async fn handle_offer_timeout(
        &self,
        offer_id: Uuid,
        ride_id: Uuid,
        driver_id: &str,
    ) -> Result<(), DispatchError> {
        if !self.offers.respond(offer_id, OfferResponse::Timeout).await? {
            // Lost to a concurrent accept/decline; nothing to do.
            return Ok(());
        }
        info!(ride_id = %ride_id, driver_id = driver_id, "Offer timed out");

        let tried = HashSet::from([driver_id.to_string()]);
        self.run_dispatch_loop(ride_id, tried).await
    }

    // ------------------------------------------------------------------
    // Dispatch loop
    // ------------------------------------------------------------------

    /// One dispatch attempt under the per-ride lock.
    pub async fn run_dispatch_loop(
        &self,
        ride_id: Uuid,
        tried: HashSet<String>,
    ) -> Result<(), DispatchError> {
        let lock_name = ride_lock_key(&ride_id);
        let guard = match self
            .mutex
            .try_acquire(
                &lock_name,
                Duration::from_millis(self.config.lock_wait_ms),
                Duration::from_millis(self.config.lock_lease_ms),
            )
            .await
        {
            Some(guard) => guard,
            None => {
                info!(ride_id = %ride_id, "Dispatch lock held elsewhere, skipping attempt");
                return Ok(());
            }
        };

        let outcome = match self.dispatch_once(ride_id, tried).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.mutex.release(guard);
                return Err(e);
            }
        };

        // The driver-status update, TTL sentinel and offer event still
        // belong to this dispatch attempt; the lock is held until they
        // are done and released last.
        match outcome {
            DispatchOutcome::Skipped => {}
            DispatchOutcome::NoDriverFound(ride) => {
                warn!(ride_id = %ride_id, "No driver found");
                metrics::counter!("ride_hailing_rides_unmatched_total").increment(1);
                self.emit_ride_event(topics::RIDE_NO_DRIVER_FOUND, &ride, None)
                    .await;
            }
            DispatchOutcome::OfferSent {
                ride,
                driver_id,
                attempt_number,
            } => {
                self.geo.set_status(&driver_id, DriverStatus::Dispatching);
                self.mutex.acquire_sentinel(
                    &offer_sentinel_key(&ride_id, &driver_id),
                    Duration::from_secs(self.config.offer_ttl_secs),
                );

                let event = OfferSentEvent {
                    ride_id,
                    driver_id: driver_id.clone(),
                    tenant_id: ride.tenant_id.clone(),
                    region_id: ride.region_id.clone(),
                    attempt_number,
                    ttl_seconds: self.config.offer_ttl_secs as i32,
                    timestamp: Utc::now(),
                };
                self.publish(topics::DRIVER_OFFER_SENT, &ride_id.to_string(), &event)
                    .await;
                metrics::counter!("ride_hailing_offers_sent_total").increment(1);
                info!(
                    ride_id = %ride_id,
                    driver_id = %driver_id,
                    attempt = attempt_number,
                    "Offer sent"
                );
            }
        }

        self.mutex.release(guard);
        Ok(())
    }

    /// The transactional body: re-read, filter, score, write the offer.
    async fn dispatch_once(
        &self,
        ride_id: Uuid,
        tried: HashSet<String>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut tx = self.pool.begin().await?;

        let Some(ride) = self.rides.find_by_id_tx(&mut *tx, ride_id).await? else {
            tx.rollback().await?;
            return Ok(DispatchOutcome::Skipped);
        };

        let status = ride.status.parse::<RideStatus>().unwrap_or(RideStatus::Pending);
        if !matches!(status, RideStatus::Pending | RideStatus::Dispatching) {
            tx.rollback().await?;
            return Ok(DispatchOutcome::Skipped);
        }

        if ride.attempt_count >= self.config.max_attempts {
            self.rides
                .mark_no_driver_found_tx(&mut *tx, ride_id, ride.version)
                .await?;
            tx.commit().await?;
            let mut ride = ride;
            ride.status = RideStatus::NoDriverFound.as_str().to_string();
            return Ok(DispatchOutcome::NoDriverFound(ride));
        }

        // Union the caller's tried-set with every driver already offered
        // this ride, so restarts cannot repeat a driver.
        let mut tried = tried;
        for driver_id in self.offers.tried_driver_ids_tx(&mut *tx, ride_id).await? {
            tried.insert(driver_id);
        }

        let required_tier = ride
            .required_tier
            .parse::<VehicleTier>()
            .unwrap_or(VehicleTier::Economy);

        let hits = self.geo.radius(
            &ride.region_id,
            ride.pickup_latitude,
            ride.pickup_longitude,
            self.config.search_radius_km,
            self.config.candidate_limit,
        );
        let candidates = build_candidates(
            hits,
            |driver_id| self.geo.get_metadata(driver_id),
            required_tier,
            &tried,
        );

        if candidates.is_empty() {
            self.rides
                .mark_no_driver_found_tx(&mut *tx, ride_id, ride.version)
                .await?;
            tx.commit().await?;
            let mut ride = ride;
            ride.status = RideStatus::NoDriverFound.as_str().to_string();
            return Ok(DispatchOutcome::NoDriverFound(ride));
        }

        let weights = ScoringWeights::for_flag(self.flags.is_enabled(
            &ride.tenant_id,
            FeatureFlag::NewScoringAlgo,
            false,
        ));
        let ranked = rank_candidates(candidates, weights);
        let top = &ranked[0].candidate;

        if !self
            .rides
            .begin_dispatch_tx(&mut *tx, ride_id, ride.version)
            .await?
        {
            // The row moved under us despite the lock; let the next
            // attempt re-read.
            tx.rollback().await?;
            return Ok(DispatchOutcome::Skipped);
        }

        let attempt_number = ride.attempt_count + 1;
        self.offers
            .insert_tx(
                &mut *tx,
                ride_id,
                &top.driver_id,
                attempt_number,
                self.config.offer_ttl_secs as i32,
            )
            .await?;

        tx.commit().await?;

        Ok(DispatchOutcome::OfferSent {
            driver_id: top.driver_id.clone(),
            attempt_number,
            ride,
        })
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn assigned_driver_transition(
        &self,
        ride_id: Uuid,
        driver_id: &str,
        from: RideStatus,
        to: RideStatus,
        topic: &'static str,
    ) -> Result<RideSummary, DispatchError> {
        let ride = self
            .rides
            .find_by_id(ride_id)
            .await?
            .ok_or(DispatchError::RideNotFound)?;

        let status = ride.status.parse::<RideStatus>().unwrap_or(RideStatus::Pending);
        if status != from {
            return Err(DispatchError::InvalidState(format!(
                "expected {} but ride is {}",
                from, status
            )));
        }
        if ride.assigned_driver_id.as_deref() != Some(driver_id) {
            return Err(DispatchError::UnauthorizedDriver);
        }

        let updated = self
            .rides
            .transition(ride_id, from, to, ride.version)
            .await?
            .ok_or_else(|| {
                DispatchError::InvalidState("ride changed concurrently, retry".to_string())
            })?;

        self.emit_ride_event(topic, &updated, Some(driver_id)).await;
        Ok(RideSummary::from(&updated.into_domain()))
    }

    async fn emit_ride_event(&self, topic: &'static str, ride: &RideEntity, driver_id: Option<&str>) {
        let event = RideEvent {
            ride_id: ride.id,
            rider_id: ride.rider_id.clone(),
            tenant_id: ride.tenant_id.clone(),
            region_id: ride.region_id.clone(),
            status: ride.status.parse().unwrap_or(RideStatus::Pending),
            driver_id: driver_id.map(str::to_string),
            timestamp: Utc::now(),
        };
        self.publish(topic, &ride.id.to_string(), &event).await;
    }

    /// Publish with at-least-once semantics: failures are logged, never
    /// surfaced to the caller. Consumers are idempotent on entity id.
    async fn publish<T: serde::Serialize>(&self, topic: &str, key: &str, event: &T) {
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic = topic, error = %e, "Event serialization failed");
                return;
            }
        };
        if let Err(e) = self.bus.publish(topic, key, payload).await {
            warn!(topic = topic, key = key, error = %e, "Event publish failed");
        }
    }
}

/// Apply the availability, tier and tried-set filters to geo hits.
///
/// `hits` arrive in ascending distance order and that order is preserved,
/// which downstream scoring relies on for tie-breaks.
fn build_candidates(
    hits: Vec<(String, f64)>,
    metadata: impl Fn(&str) -> Option<DriverMetadata>,
    required_tier: VehicleTier,
    tried: &HashSet<String>,
) -> Vec<Candidate> {
    hits.into_iter()
        .filter_map(|(driver_id, distance_km)| {
            if tried.contains(&driver_id) {
                return None;
            }
            let meta = metadata(&driver_id)?;
            if meta.status != DriverStatus::Idle {
                return None;
            }
            if !meta.tier.satisfies(required_tier) {
                return None;
            }
            Some(Candidate {
                driver_id,
                distance_km,
                tier: meta.tier,
                rating: meta.rating_or_default(),
                decline_rate: meta.decline_rate_or_default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(status: DriverStatus, tier: VehicleTier) -> DriverMetadata {
        DriverMetadata {
            status,
            tier,
            rating: Some(4.5),
            decline_rate: Some(0.1),
            region_id: "ap-south-1".to_string(),
            latitude: 12.9716,
            longitude: 77.5946,
            last_seen_ms: 0,
        }
    }

    #[test]
    fn test_build_candidates_filters_busy_drivers() {
        let hits = vec![("drv_idle".to_string(), 0.5), ("drv_busy".to_string(), 0.7)];
        let candidates = build_candidates(
            hits,
            |id| {
                Some(meta(
                    if id == "drv_idle" {
                        DriverStatus::Idle
                    } else {
                        DriverStatus::OnTrip
                    },
                    VehicleTier::Economy,
                ))
            },
            VehicleTier::Economy,
            &HashSet::new(),
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].driver_id, "drv_idle");
    }

    #[test]
    fn test_build_candidates_filters_incompatible_tier() {
        let hits = vec![
            ("drv_economy".to_string(), 0.5),
            ("drv_premium".to_string(), 0.7),
        ];
        let candidates = build_candidates(
            hits,
            |id| {
                Some(meta(
                    DriverStatus::Idle,
                    if id == "drv_premium" {
                        VehicleTier::Premium
                    } else {
                        VehicleTier::Economy
                    },
                ))
            },
            VehicleTier::Comfort,
            &HashSet::new(),
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].driver_id, "drv_premium");
    }

    #[test]
    fn test_build_candidates_excludes_tried() {
        let hits = vec![("drv_a".to_string(), 0.5), ("drv_b".to_string(), 2.0)];
        let tried = HashSet::from(["drv_a".to_string()]);
        let candidates = build_candidates(
            hits,
            |_| Some(meta(DriverStatus::Idle, VehicleTier::Economy)),
            VehicleTier::Economy,
            &tried,
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].driver_id, "drv_b");
    }

    #[test]
    fn test_build_candidates_drops_expired_metadata() {
        let hits = vec![("drv_gone".to_string(), 0.5)];
        let candidates = build_candidates(
            hits,
            |_| None,
            VehicleTier::Economy,
            &HashSet::new(),
        );
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_build_candidates_preserves_distance_order() {
        let hits = vec![
            ("drv_near".to_string(), 0.3),
            ("drv_mid".to_string(), 1.0),
            ("drv_far".to_string(), 4.0),
        ];
        let candidates = build_candidates(
            hits,
            |_| Some(meta(DriverStatus::Idle, VehicleTier::Economy)),
            VehicleTier::Economy,
            &HashSet::new(),
        );
        let ids: Vec<&str> = candidates.iter().map(|c| c.driver_id.as_str()).collect();
        assert_eq!(ids, vec!["drv_near", "drv_mid", "drv_far"]);
    }

    #[test]
    fn test_build_candidates_applies_metadata_defaults() {
        let hits = vec![("drv".to_string(), 0.5)];
        let candidates = build_candidates(
            hits,
            |_| {
                let mut m = meta(DriverStatus::Idle, VehicleTier::Economy);
                m.rating = None;
                m.decline_rate = None;
                Some(m)
            },
            VehicleTier::Economy,
            &HashSet::new(),
        );
        assert_eq!(candidates[0].rating, 4.0);
        assert_eq!(candidates[0].decline_rate, 0.1);
    }
}
