//! Liveness endpoint for uptime checks.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::config::RelayMode;

/// Build the liveness router.
pub fn health_routes(mode: RelayMode) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .with_state(mode)
}

async fn index() -> &'static str {
    "relay bot is running"
}

async fn health(State(mode): State<RelayMode>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "relay-bot",
        "mode": mode.to_string(),
    }))
}
