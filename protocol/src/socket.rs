//! Frames exchanged over the bidirectional socket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ChatMessage;
use crate::ProtocolError;

/// Client-to-server frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    JoinChannel {
        channel_id: String,
    },
    LeaveChannel {
        channel_id: String,
    },
    Message {
        channel_id: String,
        content: String,
        /// Idempotency token generated by the sender and echoed back on the
        /// persisted message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_token: Option<String>,
    },
    FriendRequest {
        to_character_id: String,
    },
    Typing {
        channel_id: String,
    },
    Heartbeat,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_text(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Server-to-client frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    Connected {
        character_id: String,
    },
    Message(ChatMessage),
    ChannelJoined {
        channel_id: String,
    },
    ChannelLeft {
        channel_id: String,
    },
    CharacterJoined {
        channel_id: String,
        character_id: String,
    },
    CharacterLeft {
        channel_id: String,
        character_id: String,
    },
    FriendRequest {
        from_character_id: String,
        from_name: String,
    },
    FriendRequestSent {
        to_character_id: String,
    },
    CharacterStatus {
        character_id: String,
        is_online: bool,
    },
    Typing {
        character_id: String,
        channel_id: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl ServerFrame {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_text(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_inbound_frames() {
        let frame = ClientFrame::parse(r#"{"type":"join_channel","channelId":"c1"}"#).unwrap();
        assert_eq!(frame, ClientFrame::JoinChannel { channel_id: "c1".into() });

        let frame = ClientFrame::parse(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Heartbeat);

        let frame =
            ClientFrame::parse(r#"{"type":"message","channelId":"c1","content":"hi"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Message {
                channel_id: "c1".into(),
                content: "hi".into(),
                client_token: None,
            }
        );
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(ClientFrame::parse(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientFrame::parse("not json").is_err());
    }

    #[test]
    fn message_frame_is_flattened() {
        let created_at = "2026-01-02T03:04:05Z".parse().unwrap();
        let frame = ServerFrame::Message(ChatMessage {
            id: "m1".into(),
            channel_id: "c1".into(),
            sender_id: "A".into(),
            sender_name: "Alice".into(),
            content: "hello".into(),
            created_at,
            alliance_id: None,
            client_token: Some("tok".into()),
        });
        let value: serde_json::Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["id"], "m1");
        assert_eq!(value["channelId"], "c1");
        assert_eq!(value["clientToken"], "tok");
        assert_eq!(value["createdAt"], "2026-01-02T03:04:05Z");
    }

    #[test]
    fn status_frame_uses_camel_case() {
        let frame = ServerFrame::CharacterStatus {
            character_id: "A".into(),
            is_online: false,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({"type": "character_status", "characterId": "A", "isOnline": false})
        );
    }
}
