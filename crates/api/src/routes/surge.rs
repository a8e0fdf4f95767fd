//! Surge endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Tenant;
use crate::services::surge::cell_for;

/// Coordinate lookup parameters.
#[derive(Debug, Deserialize)]
pub struct CoordinateQuery {
    pub lat: f64,
    pub lng: f64,
}

/// Surge lookup response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurgeResponse {
    pub geo_cell: String,
    pub surge_multiplier: f64,
}

/// Current multiplier for a cell.
///
/// GET /surge/{cellId}
pub async fn get_by_cell(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path(cell_id): Path<String>,
) -> Result<Json<SurgeResponse>, ApiError> {
    let surge_multiplier = state.surge.get(&tenant_id, &cell_id).await?;
    Ok(Json(SurgeResponse {
        geo_cell: cell_id,
        surge_multiplier,
    }))
}

/// Current multiplier for the cell containing a coordinate.
///
/// GET /surge?lat=...&lng=...
pub async fn get_by_coordinates(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Query(query): Query<CoordinateQuery>,
) -> Result<Json<SurgeResponse>, ApiError> {
    let cell_id = cell_for(query.lat, query.lng)
        .map_err(|_| ApiError::Validation("invalid coordinates".to_string()))?;

    let surge_multiplier = state.surge.get(&tenant_id, &cell_id).await?;
    Ok(Json(SurgeResponse {
        geo_cell: cell_id,
        surge_multiplier,
    }))
}
