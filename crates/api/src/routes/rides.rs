//! Ride dispatch endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use domain::models::ride::{CreateRideRequest, RideSummary};
use shared::crypto::sha256_hex;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{RequiredIdempotencyKey, Tenant};

/// Driver identity passed by driver-facing transitions.
#[derive(Debug, Deserialize)]
pub struct DriverQuery {
    #[serde(rename = "driverId")]
    pub driver_id: String,
}

/// Requester identity passed by cancellation.
#[derive(Debug, Deserialize)]
pub struct RequesterQuery {
    #[serde(rename = "requesterId")]
    pub requester_id: String,
}

/// Create a ride and dispatch it.
///
/// POST /rides
///
/// Requires an `Idempotency-Key` header. Replays with the same key and
/// body return the stored ride with 200; a different body gets 409.
pub async fn create_ride(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    RequiredIdempotencyKey(key): RequiredIdempotencyKey,
    Json(request): Json<CreateRideRequest>,
) -> Result<(StatusCode, Json<RideSummary>), ApiError> {
    request.validate()?;

    // Canonical body hash: the parsed request re-serialized with stable
    // field order, so formatting differences do not defeat replays.
    let canonical = serde_json::to_string(&request)
        .map_err(|e| ApiError::Internal(format!("canonicalization failed: {}", e)))?;
    let request_hash = sha256_hex(&canonical);

    let (summary, was_created) = state
        .dispatch
        .create_ride(&tenant_id, &request, &key.0, &request_hash)
        .await?;

    let status = if was_created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(summary)))
}

/// Fetch a ride summary.
///
/// GET /rides/{id}
pub async fn get_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<RideSummary>, ApiError> {
    let summary = state.dispatch.get_ride(ride_id).await?;
    Ok(Json(summary))
}

/// Driver accepts the open offer.
///
/// POST /rides/{id}/accept?driverId=...
///
/// Returns 400 `RIDE_ALREADY_ACCEPTED` to the loser of a double-accept.
pub async fn accept(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
    Query(query): Query<DriverQuery>,
) -> Result<Json<RideSummary>, ApiError> {
    let summary = state.dispatch.accept(ride_id, &query.driver_id).await?;
    Ok(Json(summary))
}

/// Driver declines the open offer; the ride re-dispatches.
///
/// POST /rides/{id}/decline?driverId=...
pub async fn decline(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
    Query(query): Query<DriverQuery>,
) -> Result<Json<RideSummary>, ApiError> {
    let summary = state.dispatch.decline(ride_id, &query.driver_id).await?;
    Ok(Json(summary))
}

/// Assigned driver reports arrival.
///
/// POST /rides/{id}/driver-arrived?driverId=...
pub async fn driver_arrived(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
    Query(query): Query<DriverQuery>,
) -> Result<Json<RideSummary>, ApiError> {
    let summary = state
        .dispatch
        .driver_arrived(ride_id, &query.driver_id)
        .await?;
    Ok(Json(summary))
}

/// Assigned driver starts the trip.
///
/// POST /rides/{id}/start?driverId=...
pub async fn start(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
    Query(query): Query<DriverQuery>,
) -> Result<Json<RideSummary>, ApiError> {
    let summary = state.dispatch.start(ride_id, &query.driver_id).await?;
    Ok(Json(summary))
}

/// Cancel a ride (rider or support). In-progress rides cannot be
/// cancelled.
///
/// POST /rides/{id}/cancel?requesterId=...
pub async fn cancel(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
    Query(query): Query<RequesterQuery>,
) -> Result<Json<RideSummary>, ApiError> {
    let summary = state.dispatch.cancel(ride_id, &query.requester_id).await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::ride::VehicleTier;

    #[test]
    fn test_driver_query_parsing() {
        let query: DriverQuery = serde_json::from_str(r#"{"driverId":"drv_001"}"#).unwrap();
        assert_eq!(query.driver_id, "drv_001");
    }

    #[test]
    fn test_canonical_hash_is_format_insensitive() {
        let compact = r#"{"riderId":"usr_101","regionId":"ap-south-1","pickupLatitude":12.9716,"pickupLongitude":77.5946,"destinationLatitude":12.9352,"destinationLongitude":77.6245,"requiredTier":"ECONOMY","paymentMethod":"CARD"}"#;
        let spaced = r#"{
            "riderId": "usr_101",
            "regionId": "ap-south-1",
            "pickupLatitude": 12.9716,
            "pickupLongitude": 77.5946,
            "destinationLatitude": 12.9352,
            "destinationLongitude": 77.6245,
            "requiredTier": "ECONOMY",
            "paymentMethod": "CARD"
        }"#;

        let a: CreateRideRequest = serde_json::from_str(compact).unwrap();
        let b: CreateRideRequest = serde_json::from_str(spaced).unwrap();
        assert_eq!(
            sha256_hex(&serde_json::to_string(&a).unwrap()),
            sha256_hex(&serde_json::to_string(&b).unwrap())
        );
    }

    #[test]
    fn test_canonical_hash_detects_body_change() {
        let base = CreateRideRequest {
            rider_id: "usr_101".to_string(),
            region_id: "ap-south-1".to_string(),
            pickup_latitude: 12.9716,
            pickup_longitude: 77.5946,
            destination_latitude: 12.9352,
            destination_longitude: 77.6245,
            required_tier: VehicleTier::Economy,
            payment_method: domain::models::PaymentMethod::Card,
        };
        let mut changed = base.clone();
        changed.required_tier = VehicleTier::Premium;

        assert_ne!(
            sha256_hex(&serde_json::to_string(&base).unwrap()),
            sha256_hex(&serde_json::to_string(&changed).unwrap())
        );
    }
}
