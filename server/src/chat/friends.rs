use relay_protocol::{PushEvent, ServerFrame};

use crate::notify::notify;
use crate::state::AppState;
use crate::ws::Connection;

/// Persist a friend request, acknowledge the sender and notify the target.
pub async fn send_friend_request(state: &AppState, connection: &Connection, to_character_id: &str) {
    let from_id = connection.character_id();

    if from_id == to_character_id {
        tracing::debug!(character_id = %from_id, "Friend request to self dropped");
        return;
    }

    let sender = match state.store.character(from_id).await {
        Ok(sender) => sender,
        Err(e) => {
            tracing::warn!(character_id = %from_id, error = %e, "Sender lookup failed");
            return;
        }
    };
    match state.store.character(to_character_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::debug!(
                character_id = %from_id,
                target = %to_character_id,
                "Friend request for unknown character dropped"
            );
            return;
        }
        Err(e) => {
            tracing::warn!(target = %to_character_id, error = %e, "Target lookup failed");
            return;
        }
    }

    if let Err(e) = state.store.create_friend_request(from_id, to_character_id).await {
        tracing::warn!(character_id = %from_id, error = %e, "Failed to persist friend request");
        return;
    }

    connection.send(&ServerFrame::FriendRequestSent {
        to_character_id: to_character_id.to_string(),
    });

    let from_name = sender
        .map(|c| c.name)
        .unwrap_or_else(|| "Unknown".to_string());
    let route = notify(
        state,
        to_character_id,
        &ServerFrame::FriendRequest {
            from_character_id: from_id.to_string(),
            from_name: from_name.clone(),
        },
        PushEvent::FriendRequest {
            from_character_id: from_id.to_string(),
            from_name,
        },
    );
    tracing::debug!(
        character_id = %from_id,
        target = %to_character_id,
        route = ?route,
        "Friend request sent"
    );
}
