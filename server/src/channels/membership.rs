//! Per-connection channel membership.
//!
//! Membership lives on the connection, not the character: a reconnecting
//! client starts with no channels and must join again.

use relay_protocol::{ChannelKind, ServerFrame};

use crate::state::AppState;
use crate::ws::broadcast::broadcast_to_channel;
use crate::ws::Connection;

/// Join a channel.
///
/// Alliance channels require the joiner to be a current member of the
/// channel's alliance. A rejected join is dropped without any reply.
/// Returns whether the connection is a member afterwards.
pub async fn join(state: &AppState, connection: &Connection, channel_id: &str) -> bool {
    let character_id = connection.character_id();

    let channel = match state.store.channel(channel_id).await {
        Ok(Some(channel)) => channel,
        Ok(None) => {
            tracing::warn!(
                character_id = %character_id,
                channel_id = %channel_id,
                "Join for unknown channel dropped"
            );
            return false;
        }
        Err(e) => {
            tracing::warn!(
                character_id = %character_id,
                channel_id = %channel_id,
                error = %e,
                "Channel lookup failed during join"
            );
            return false;
        }
    };

    if channel.kind == ChannelKind::Alliance {
        let Some(alliance_id) = channel.alliance_id.as_deref() else {
            tracing::warn!(channel_id = %channel_id, "Alliance channel without alliance id");
            return false;
        };
        match state.store.is_alliance_member(alliance_id, character_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(
                    character_id = %character_id,
                    channel_id = %channel_id,
                    "Alliance channel join rejected"
                );
                return false;
            }
            Err(e) => {
                tracing::warn!(
                    character_id = %character_id,
                    channel_id = %channel_id,
                    error = %e,
                    "Alliance membership lookup failed during join"
                );
                return false;
            }
        }
    }

    let newly_joined = connection.join_channel(channel_id);
    connection.send(&ServerFrame::ChannelJoined {
        channel_id: channel_id.to_string(),
    });

    if newly_joined {
        broadcast_to_channel(
            &state.registry,
            channel_id,
            &ServerFrame::CharacterJoined {
                channel_id: channel_id.to_string(),
                character_id: character_id.to_string(),
            },
            Some(character_id),
        );
    }

    tracing::debug!(
        character_id = %character_id,
        channel_id = %channel_id,
        "Channel joined"
    );
    true
}

/// Leave a channel. Idempotent: leaving a channel that was never joined
/// still acknowledges but notifies nobody.
pub fn leave(state: &AppState, connection: &Connection, channel_id: &str) {
    let character_id = connection.character_id();
    let was_member = connection.leave_channel(channel_id);

    connection.send(&ServerFrame::ChannelLeft {
        channel_id: channel_id.to_string(),
    });

    if was_member {
        broadcast_to_channel(
            &state.registry,
            channel_id,
            &ServerFrame::CharacterLeft {
                channel_id: channel_id.to_string(),
                character_id: character_id.to_string(),
            },
            Some(character_id),
        );
    }
}
