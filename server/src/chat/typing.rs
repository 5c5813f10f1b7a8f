use chrono::Utc;
use relay_protocol::ServerFrame;

use crate::state::AppState;
use crate::ws::broadcast::broadcast_to_channel;
use crate::ws::Connection;

/// Re-broadcast a typing indicator to the other members of a joined channel.
/// Indicators are never persisted; a connection outside the channel is ignored.
pub fn broadcast_typing(state: &AppState, connection: &Connection, channel_id: &str) -> usize {
    if !connection.is_member(channel_id) {
        tracing::debug!(
            character_id = %connection.character_id(),
            channel_id = %channel_id,
            "Typing indicator for unjoined channel dropped"
        );
        return 0;
    }

    broadcast_to_channel(
        &state.registry,
        channel_id,
        &ServerFrame::Typing {
            character_id: connection.character_id().to_string(),
            channel_id: channel_id.to_string(),
            timestamp: Utc::now(),
        },
        Some(connection.character_id()),
    )
}
