//! Events carried by the server-push stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{ChannelInfo, ChatMessage};
use crate::ProtocolError;

/// A push-stream event. On the wire the variant name is the SSE event name
/// and the variant body is the JSON data line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum PushEvent {
    Connected {
        character_id: String,
    },
    InitialChannels {
        channels: Vec<ChannelInfo>,
    },
    InitialMessages {
        channel_id: String,
        messages: Vec<ChatMessage>,
    },
    Message(ChatMessage),
    NameUpdate {
        character_id: String,
        name: String,
    },
    FriendRequest {
        from_character_id: String,
        from_name: String,
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
    RtcOffer(Value),
    RtcAnswer(Value),
    RtcIceCandidate(Value),
}

impl PushEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::InitialChannels { .. } => "initial_channels",
            Self::InitialMessages { .. } => "initial_messages",
            Self::Message(_) => "message",
            Self::NameUpdate { .. } => "name_update",
            Self::FriendRequest { .. } => "friend_request",
            Self::CharacterStatus { .. } => "character_status",
            Self::Typing { .. } => "typing",
            Self::RtcOffer(_) => "rtc_offer",
            Self::RtcAnswer(_) => "rtc_answer",
            Self::RtcIceCandidate(_) => "rtc_ice_candidate",
        }
    }

    /// JSON body for the SSE `data:` line.
    pub fn data(&self) -> Result<String, ProtocolError> {
        let mut tagged = serde_json::to_value(self)?;
        let data = tagged
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Ok(data.to_string())
    }

    /// Rebuild an event from an SSE event name and its data payload.
    pub fn from_parts(event: &str, data: &str) -> Result<Self, ProtocolError> {
        let data: Value = serde_json::from_str(data)?;
        let tagged = serde_json::json!({ "event": event, "data": data });
        Ok(serde_json::from_value(tagged)?)
    }
}
