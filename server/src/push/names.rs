use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use relay_protocol::PushEvent;
use serde::Deserialize;

use crate::state::AppState;

/// Maximum character name length (chars).
const MAX_NAME_LENGTH: usize = 32;

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

/// PUT /api/characters/{character_id}/name
/// Persists the new name and pushes `name_update` to the character and its
/// friends' open push streams.
pub async fn rename_character(
    State(state): State<AppState>,
    Path(character_id): Path<String>,
    Json(body): Json<RenameRequest>,
) -> Result<StatusCode, StatusCode> {
    let name = body.name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(StatusCode::BAD_REQUEST);
    }

    let renamed = state
        .store
        .rename_character(&character_id, &name)
        .await
        .map_err(|e| {
            tracing::warn!(character_id = %character_id, error = %e, "Rename failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    if !renamed {
        return Err(StatusCode::NOT_FOUND);
    }

    let friends = state
        .store
        .friend_roster(&character_id)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(character_id = %character_id, error = %e, "Friend roster lookup failed");
            Vec::new()
        });

    let event = PushEvent::NameUpdate {
        character_id: character_id.clone(),
        name,
    };
    let delivered = std::iter::once(&character_id)
        .chain(friends.iter())
        .filter(|target| state.push.send(target, event.clone()))
        .count();

    tracing::info!(character_id = %character_id, delivered, "Character renamed");
    Ok(StatusCode::OK)
}
