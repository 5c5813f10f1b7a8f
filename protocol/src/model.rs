use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Routing scope of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Broadcast to every live connection.
    World,
    /// Restricted to the current members of one alliance.
    Alliance,
    /// Direct conversations. Never fanned out by the relay.
    #[serde(alias = "direct")]
    Personal,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::World => "world",
            Self::Alliance => "alliance",
            Self::Personal => "personal",
        }
    }
}

impl FromStr for ChannelKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "world" => Ok(Self::World),
            "alliance" => Ok(Self::Alliance),
            "personal" | "direct" => Ok(Self::Personal),
            other => Err(ProtocolError::UnknownChannelKind(other.to_string())),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alliance_id: Option<String>,
}

/// A persisted chat message as delivered to recipients.
///
/// The same message may be observed on both transports. Consumers dedupe by
/// `id`; `client_token` is only echoed to let the sender reconcile its
/// pending placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alliance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
}
