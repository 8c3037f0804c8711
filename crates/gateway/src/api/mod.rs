//! HTTP API surface.

pub mod openai_compat;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/chat/completions", post(openai_compat::chat_completions))
        .layer(TraceLayer::new_for_http());

    if state.config.server.cors_allow_all {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    let active = trellis_events::active_nodes(state.kv.as_ref())
        .await
        .unwrap_or_default();
    Json(serde_json::json!({
        "status": "ok",
        "node_id": state.node_id,
        "active_nodes": active,
    }))
}
