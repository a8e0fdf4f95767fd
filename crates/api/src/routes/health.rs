//! Health check endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::app::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub region: String,
    pub database: DatabaseHealth,
    pub psp_circuit_state: String,
}

/// Database health status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealth {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// Full health check endpoint.
///
/// GET /health
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let start = std::time::Instant::now();
    let db_connected = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    let latency_ms = db_connected.then(|| start.elapsed().as_millis() as u64);

    let response = HealthResponse {
        status: if db_connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        region: state.config.region.region_id.clone(),
        database: DatabaseHealth {
            connected: db_connected,
            latency_ms,
        },
        psp_circuit_state: state.breaker.state().as_str().to_string(),
    };

    if db_connected {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.4.0".to_string(),
            region: "ap-south-1".to_string(),
            database: DatabaseHealth {
                connected: true,
                latency_ms: Some(2),
            },
            psp_circuit_state: "CLOSED".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"pspCircuitState\":\"CLOSED\""));
        assert!(json.contains("\"latencyMs\":2"));
    }
}
