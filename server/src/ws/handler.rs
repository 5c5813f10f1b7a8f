use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for the socket handshake. The character identifier is
/// opaque to the relay and is not authenticated here.
#[derive(Debug, Deserialize)]
pub struct WsConnectQuery {
    #[serde(rename = "characterId")]
    pub character_id: Option<String>,
}

/// GET /ws?characterId=...
/// Rejects the handshake before upgrading when the identifier is missing.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let character_id = match params.character_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => {
            tracing::warn!("Socket handshake rejected: missing characterId");
            return (StatusCode::BAD_REQUEST, "characterId is required").into_response();
        }
    };

    tracing::info!(character_id = %character_id, "Socket handshake accepted");
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, character_id))
}
