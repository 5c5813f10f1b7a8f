//! Presence broadcasting.
//!
//! Presence is derived from the registry: a character is online while it
//! holds a registered socket. Transitions are persisted through the store and
//! pushed to every connected friend.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use relay_protocol::{PushEvent, ServerFrame};
use serde::Serialize;

use crate::notify::{notify, Route};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub character_id: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

// --- Functions called from the socket lifecycle ---

/// Persist a presence transition and tell each connected friend about it.
///
/// Failures are logged and swallowed; the lifecycle transition that triggered
/// the broadcast always completes. Returns the number of friends notified.
pub async fn announce(state: &AppState, character_id: &str, is_online: bool) -> usize {
    if let Err(e) = state.store.set_online(character_id, is_online).await {
        tracing::warn!(
            character_id = %character_id,
            error = %e,
            "Failed to persist presence"
        );
    }

    let friends = match state.store.friend_roster(character_id).await {
        Ok(friends) => friends,
        Err(e) => {
            tracing::warn!(
                character_id = %character_id,
                error = %e,
                "Friend roster lookup failed, presence not broadcast"
            );
            return 0;
        }
    };

    let frame = ServerFrame::CharacterStatus {
        character_id: character_id.to_string(),
        is_online,
    };
    let notified = friends
        .iter()
        .filter(|friend| {
            let event = PushEvent::CharacterStatus {
                character_id: character_id.to_string(),
                is_online,
            };
            notify(state, friend, &frame, event) != Route::Unreachable
        })
        .count();

    tracing::debug!(
        character_id = %character_id,
        is_online,
        notified,
        "Presence broadcast"
    );
    notified
}

/// Current presence of one character.
pub async fn presence_of(state: &AppState, character_id: &str) -> Option<PresenceRecord> {
    let character = match state.store.character(character_id).await {
        Ok(character) => character?,
        Err(e) => {
            tracing::warn!(character_id = %character_id, error = %e, "Character lookup failed");
            return None;
        }
    };

    let is_online = state.registry.is_online(character_id);
    let last_seen = state
        .registry
        .lookup(character_id)
        .map(|conn| conn.last_heartbeat())
        .or(character.last_seen);

    Some(PresenceRecord {
        character_id: character.id,
        is_online,
        last_seen,
    })
}

// --- REST endpoint handlers ---

/// GET /api/presence/{character_id}
pub async fn get_presence(
    State(state): State<AppState>,
    Path(character_id): Path<String>,
) -> Result<Json<PresenceRecord>, StatusCode> {
    presence_of(&state, &character_id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
