//! Chat message fan-out.
//!
//! One inbound send is persisted once and delivered at most once to each
//! recipient's socket. Offline recipients are skipped; there is no retry.

use relay_protocol::{ChannelKind, ChatMessage, ServerFrame};

use crate::db::models::NewMessage;
use crate::state::AppState;
use crate::ws::broadcast::encode;
use crate::ws::Connection;

/// Maximum message content length (chars).
pub const MAX_CONTENT_LENGTH: usize = 2000;

/// Result of a successful fan-out.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: ChatMessage,
    /// Characters whose queue accepted the message.
    pub recipients: Vec<String>,
}

/// Persist a chat message and deliver it to the channel's audience.
///
/// Returns `None` when the send was dropped: unknown channel, personal
/// channel, invalid content, failed alliance authorization or a persistence
/// failure. None of these are reported to the sender.
pub async fn send_message(
    state: &AppState,
    sender_id: &str,
    channel_id: &str,
    content: &str,
    client_token: Option<String>,
) -> Option<Delivery> {
    let channel = match state.store.channel(channel_id).await {
        Ok(Some(channel)) => channel,
        Ok(None) => {
            tracing::warn!(
                sender_id = %sender_id,
                channel_id = %channel_id,
                "Message for unknown channel dropped"
            );
            return None;
        }
        Err(e) => {
            tracing::warn!(channel_id = %channel_id, error = %e, "Channel lookup failed");
            return None;
        }
    };

    let content = content.trim();
    if content.is_empty() || content.chars().count() > MAX_CONTENT_LENGTH {
        tracing::debug!(
            sender_id = %sender_id,
            channel_id = %channel_id,
            "Message with empty or oversized content dropped"
        );
        return None;
    }

    let alliance_id = match channel.kind {
        ChannelKind::World => None,
        ChannelKind::Personal => {
            tracing::warn!(
                sender_id = %sender_id,
                channel_id = %channel_id,
                "Personal channel messages are not relayed"
            );
            return None;
        }
        ChannelKind::Alliance => {
            let alliance_id = channel.alliance_id.clone()?;
            // Re-checked on every send; a join does not grant lasting access.
            match state.store.is_alliance_member(&alliance_id, sender_id).await {
                Ok(true) => Some(alliance_id),
                Ok(false) => {
                    tracing::debug!(
                        sender_id = %sender_id,
                        channel_id = %channel_id,
                        "Alliance message from non-member dropped"
                    );
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Alliance membership lookup failed");
                    return None;
                }
            }
        }
    };

    let sender_name = match state.store.display_name(sender_id).await {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!(sender_id = %sender_id, error = %e, "Sender lookup failed");
            return None;
        }
    };

    // Nothing awaits between persisting and delivery
    let roster = match &alliance_id {
        None => None,
        Some(alliance_id) => match state.store.alliance_roster(alliance_id).await {
            Ok(roster) => Some(roster),
            Err(e) => {
                tracing::warn!(alliance_id = %alliance_id, error = %e, "Roster lookup failed");
                return None;
            }
        },
    };

    let message = match state
        .store
        .create_message(NewMessage {
            channel_id: channel.id.clone(),
            sender_id: sender_id.to_string(),
            sender_name,
            content: content.to_string(),
            alliance_id,
            client_token,
        })
        .await
    {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(channel_id = %channel_id, error = %e, "Failed to persist message");
            return None;
        }
    };

    let audience: Vec<Connection> = match &roster {
        None => state.registry.connections(),
        Some(roster) => state
            .registry
            .connections()
            .into_iter()
            .filter(|conn| roster.contains(conn.character_id()))
            .collect(),
    };

    let frame = encode(&ServerFrame::Message(message.clone()))?;
    let recipients: Vec<String> = audience
        .iter()
        .filter(|conn| conn.deliver(frame.clone()))
        .map(|conn| conn.character_id().to_string())
        .collect();

    tracing::debug!(
        message_id = %message.id,
        channel_id = %channel_id,
        recipients = recipients.len(),
        "Message fanned out"
    );

    Some(Delivery {
        message,
        recipients,
    })
}
