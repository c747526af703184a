//! Digital asset manager handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{debug, error};
use uuid::Uuid;

use crate::api::ApiState;
use crate::block::BlockView;

/// List an article's blocks in display (rank) order.
///
/// GET /dam/:article_id
pub async fn list_blocks(
    State(state): State<Arc<ApiState>>,
    Path(article_id): Path<Uuid>,
) -> Result<Json<Vec<BlockView>>, (StatusCode, String)> {
    let blocks = state
        .store
        .lock()
        .await
        .article_blocks(&article_id)
        .map_err(|e| {
            error!(article_id = %article_id, error = %e, "Failed to list article blocks");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    debug!(article_id = %article_id, blocks = blocks.len(), "Listed article blocks");

    Ok(Json(blocks.iter().map(|block| block.view()).collect()))
}
