//! Read-only REST API.
//!
//! Provides HTTP endpoints for:
//! - Service status and the normalization backlog
//! - Digital asset manager listing of an article's blocks, in rank order

pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{routing::get, Router};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::store::BlockStore;

/// Shared state for API handlers.
pub struct ApiState {
    /// Block store. The API only reads; the lock serializes access to the
    /// underlying connection.
    pub store: Mutex<Box<dyn BlockStore>>,

    /// Server start time, for uptime reporting.
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(store: Box<dyn BlockStore>) -> Self {
        Self {
            store: Mutex::new(store),
            started_at: Instant::now(),
        }
    }
}

/// Build the API router with all routes.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/status", get(handlers::status::health))
        .route("/dam/:article_id", get(handlers::dam::list_blocks))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_request(())
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let status = response.status();
                        if !status.is_success() {
                            tracing::warn!(
                                status = %status,
                                latency_ms = latency.as_millis(),
                                "request failed"
                            );
                        }
                    },
                ),
        )
        .with_state(state)
}

/// Start the API server.
pub async fn serve(state: Arc<ApiState>, bind_addr: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    tracing::info!(bind = %bind_addr, "mediaproc API listening");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::block::NewBlock;
    use crate::rank;
    use crate::store::{ChangeSet, SqliteStore};

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn seeded_state(article: Uuid) -> Arc<ApiState> {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let new_block = |origin: &str| NewBlock {
            article_id: article,
            origin: Some(origin.to_string()),
            ..Default::default()
        };

        let first = store.insert(new_block("https://origin/first.jpg")).unwrap();
        let mut second = store.insert(new_block("https://origin/second.jpg")).unwrap();
        store
            .insert(NewBlock {
                article_id: Uuid::new_v4(),
                ..Default::default()
            })
            .unwrap();

        // Move the second block to the front and mark it normalized.
        second.rank = rank::before(&first.rank).unwrap();
        second.mark_normalized("https://i.ibb.co/x/second.webp", 800, 600, Utc::now());
        let mut changes = ChangeSet::new();
        changes.stage(second);
        store.commit(changes).unwrap();

        Arc::new(ApiState::new(Box::new(store)))
    }

    #[tokio::test]
    async fn test_status() {
        let state = seeded_state(Uuid::new_v4());
        let (status, json) = get_json(router(state), "/api/v1/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["pending_blocks"], 1);
    }

    #[tokio::test]
    async fn test_status_counts_whole_backlog() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let article = Uuid::new_v4();
        for i in 0..25 {
            store
                .insert(NewBlock {
                    article_id: article,
                    origin: Some(format!("https://origin/{i}.jpg")),
                    ..Default::default()
                })
                .unwrap();
        }
        let state = Arc::new(ApiState::new(Box::new(store)));

        let (status, json) = get_json(router(state), "/api/v1/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["pending_blocks"], 25);
    }

    #[tokio::test]
    async fn test_dam_lists_blocks_in_rank_order() {
        let article = Uuid::new_v4();
        let state = seeded_state(article);
        let (status, json) = get_json(router(state), &format!("/dam/{article}")).await;

        assert_eq!(status, StatusCode::OK);
        let blocks = json.as_array().unwrap();
        assert_eq!(blocks.len(), 2);

        assert_eq!(blocks[0]["origin"], "https://origin/second.jpg");
        assert_eq!(blocks[0]["status"], "done");
        assert_eq!(blocks[0]["sourceUrl"], "https://i.ibb.co/x/second.webp");
        assert_eq!(blocks[0]["width"], 800);

        assert_eq!(blocks[1]["origin"], "https://origin/first.jpg");
        assert_eq!(blocks[1]["status"], "pending");
        assert_eq!(blocks[1]["width"], 0);
    }

    #[tokio::test]
    async fn test_dam_unknown_article_is_empty() {
        let state = seeded_state(Uuid::new_v4());
        let (status, json) = get_json(router(state), &format!("/dam/{}", Uuid::new_v4())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_dam_rejects_malformed_article_id() {
        let state = seeded_state(Uuid::new_v4());
        let (status, _) = get_json(router(state), "/dam/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
