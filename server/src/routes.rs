use axum::{routing, Router};

use crate::presence;
use crate::push::{handler as push_handler, names};
use crate::signaling;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes.
pub fn build_router(state: AppState) -> Router {
    // Bidirectional socket (character id via query param)
    let ws_routes = Router::new().route("/ws", routing::get(ws_handler::ws_upgrade));

    // Server-push stream
    let push_routes = Router::new().route("/events", routing::get(push_handler::open_push_stream));

    let api_routes = Router::new()
        .route("/api/rtc/signal", routing::post(signaling::submit_signal))
        .route(
            "/api/characters/{character_id}/name",
            routing::put(names::rename_character),
        )
        .route(
            "/api/presence/{character_id}",
            routing::get(presence::get_presence),
        );

    let health = Router::new().route("/health", routing::get(health_check));

    Router::new()
        .merge(ws_routes)
        .merge(push_routes)
        .merge(api_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
