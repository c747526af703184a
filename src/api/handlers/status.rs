//! Status and health check handlers.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::api::ApiState;
use crate::store::RetryPolicy;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,

    /// Crate version.
    pub version: String,

    /// Seconds since the server started.
    pub uptime_secs: u64,

    /// Blocks still waiting for normalization.
    pub pending_blocks: usize,
}

/// Health check endpoint.
///
/// GET /api/v1/status
pub async fn health(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<HealthResponse>, (StatusCode, String)> {
    let pending_blocks = state
        .store
        .lock()
        .await
        .count_eligible(RetryPolicy::Forever)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        pending_blocks,
    }))
}
