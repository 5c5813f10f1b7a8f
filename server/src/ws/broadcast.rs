use axum::extract::ws::Message;
use relay_protocol::ServerFrame;

use super::{Connection, PresenceRegistry};

/// Serialize a frame once so it can be cloned into many queues.
pub fn encode(frame: &ServerFrame) -> Option<Message> {
    match frame.to_text() {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server frame");
            None
        }
    }
}

/// Deliver a frame to each connection. Returns how many queues accepted it.
pub fn deliver_to<'a>(
    connections: impl IntoIterator<Item = &'a Connection>,
    frame: &ServerFrame,
) -> usize {
    let Some(msg) = encode(frame) else {
        return 0;
    };
    connections
        .into_iter()
        .filter(|conn| conn.deliver(msg.clone()))
        .count()
}

/// Deliver a frame to every connection that joined `channel_id`, optionally
/// skipping one character (usually the originator).
pub fn broadcast_to_channel(
    registry: &PresenceRegistry,
    channel_id: &str,
    frame: &ServerFrame,
    except: Option<&str>,
) -> usize {
    let members: Vec<Connection> = registry
        .connections()
        .into_iter()
        .filter(|conn| conn.is_member(channel_id))
        .filter(|conn| except != Some(conn.character_id()))
        .collect();
    deliver_to(&members, frame)
}
