use relay_protocol::{ClientFrame, ServerFrame};

use crate::channels::membership;
use crate::chat::{fanout, friends, typing};
use crate::state::AppState;
use crate::ws::Connection;

/// Handle an incoming text frame.
/// Malformed frames are answered with an `error` frame; the connection stays open.
pub async fn handle_text_message(text: &str, connection: &Connection, state: &AppState) {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(
                character_id = %connection.character_id(),
                error = %e,
                "Failed to parse inbound frame"
            );
            send_error(connection, "Invalid message format");
            return;
        }
    };

    dispatch_frame(frame, connection, state).await;
}

/// Dispatch a decoded frame to the appropriate handler.
async fn dispatch_frame(frame: ClientFrame, connection: &Connection, state: &AppState) {
    match frame {
        ClientFrame::JoinChannel { channel_id } => {
            membership::join(state, connection, &channel_id).await;
        }
        ClientFrame::LeaveChannel { channel_id } => {
            membership::leave(state, connection, &channel_id);
        }
        ClientFrame::Message {
            channel_id,
            content,
            client_token,
        } => {
            fanout::send_message(
                state,
                connection.character_id(),
                &channel_id,
                &content,
                client_token,
            )
            .await;
        }
        ClientFrame::FriendRequest { to_character_id } => {
            friends::send_friend_request(state, connection, &to_character_id).await;
        }
        ClientFrame::Typing { channel_id } => {
            typing::broadcast_typing(state, connection, &channel_id);
        }
        ClientFrame::Heartbeat => {
            // Liveness was already recorded by the reader loop.
        }
    }
}

/// Send an error frame to a single connection.
pub fn send_error(connection: &Connection, message: &str) {
    connection.send(&ServerFrame::Error {
        message: message.to_string(),
    });
}
